mod access;
mod config;
mod crawl;
mod db;
mod error;
mod geo;
mod model;
mod parser;
mod pipeline;
mod scoring;
mod store;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::access::dedup::DedupSet;
use crate::access::session::ChromeBrowser;
use crate::config::Settings;
use crate::crawl::{CrawlContext, CrawlStats};
use crate::geo::geocoder::{Geocoder, NoGeocoder, NominatimGeocoder};
use crate::model::ScoringCriteria;
use crate::pipeline::{Pipeline, PipelineOptions, PipelineStats};
use crate::scoring::ConfidenceScorer;
use crate::store::{ArtifactStore, FsStore};

#[derive(Parser)]
#[command(name = "naf_scout", about = "Find and score likely NAF alumni from public profiles")]
struct Cli {
    /// Settings file (default: naf_scout.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Register profile URLs to crawl (one per line, optional tab + referrer)
    Queue {
        file: PathBuf,
    },
    /// Register documents already present in the pages directory
    Import,
    /// Acquire pending targets with a headless browser
    Crawl {
        /// Max targets to crawl (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract, geocode and score captured documents
    Enrich {
        #[arg(long, default_value = "100")]
        batch_size: usize,
        /// Max documents to examine (default: all)
        #[arg(long)]
        limit: Option<usize>,
        /// Update candidates that were already scored
        #[arg(long)]
        rescore: bool,
    },
    /// Crawl + enrich in one go
    Run {
        /// Max targets to crawl
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Score a JSON criteria document (file or stdin) and print the breakdown
    Score {
        file: Option<PathBuf>,
    },
    /// Show crawl and scoring statistics
    Stats,
    /// Candidates ranked by confidence
    Overview {
        #[arg(long)]
        min_confidence: Option<f64>,
        /// Only definite alumni
        #[arg(long)]
        definite: bool,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = config::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Init => {
            let conn = open_db(&settings)?;
            drop(conn);
            println!("Schema ready at {}", settings.database.display());
            Ok(())
        }
        Commands::Queue { file } => {
            let conn = open_db(&settings)?;
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let (targets, rejected) = crawl::parse_targets(&text);
            for line in &rejected {
                warn!("Not a profile URL: {}", line);
            }
            let inserted = db::insert_targets(&conn, &targets)?;
            println!(
                "Queued {} new targets ({} valid, {} rejected)",
                inserted,
                targets.len(),
                rejected.len()
            );
            Ok(())
        }
        Commands::Import => {
            let conn = open_db(&settings)?;
            let store = FsStore::open(&settings.pages_dir)?;
            let captured_at = chrono::Utc::now().to_rfc3339();
            let inserted = db::import_stored(&conn, &store, &captured_at)?;
            println!(
                "Imported {} documents from {}",
                inserted,
                store.root().display()
            );
            Ok(())
        }
        Commands::Crawl { limit } => {
            let conn = open_db(&settings)?;
            if let Some(stats) = crawl(&conn, &settings, limit).await? {
                println!(
                    "Done: {} targets ({} acquired, {} skipped, {} failed).",
                    stats.total, stats.acquired, stats.skipped, stats.failed
                );
            }
            Ok(())
        }
        Commands::Enrich {
            batch_size,
            limit,
            rescore,
        } => {
            let conn = open_db(&settings)?;
            let opts = PipelineOptions {
                batch_size,
                limit,
                rescore,
            };
            let stats = enrich(&conn, &settings, &opts).await?;
            print_pipeline(&stats);
            Ok(())
        }
        Commands::Run { limit } => {
            let conn = open_db(&settings)?;

            // Phase 1: Crawl
            let t_crawl = Instant::now();
            if let Some(stats) = crawl(&conn, &settings, limit).await? {
                println!(
                    "Crawled {} targets ({} acquired, {} failed) in {:.1}s",
                    stats.total,
                    stats.acquired,
                    stats.failed,
                    t_crawl.elapsed().as_secs_f64()
                );
            }

            // Phase 2: Enrich
            let t_enrich = Instant::now();
            let stats = enrich(&conn, &settings, &PipelineOptions::default()).await?;
            println!("Enriched in {:.1}s", t_enrich.elapsed().as_secs_f64());
            print_pipeline(&stats);
            Ok(())
        }
        Commands::Score { file } => {
            let text = match &file {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let criteria: ScoringCriteria =
                serde_json::from_str(&text).context("Invalid scoring criteria")?;
            let scoring = &settings.scoring;
            let scorer = ConfidenceScorer::new(
                scoring.weights,
                &scoring.academy_locations,
                &scoring.partner_companies,
            );
            let breakdown = scorer.score(&criteria);
            println!("{}", serde_json::to_string_pretty(&breakdown)?);
            Ok(())
        }
        Commands::Overview {
            min_confidence,
            definite,
            limit,
        } => {
            let conn = open_db(&settings)?;
            let rows = db::fetch_overview(&conn, min_confidence, definite, limit)?;
            if rows.is_empty() {
                println!("No candidates found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<24} | {:>5} | {:<3} | {:<24} | {:<18} | {:<20}",
                "#", "Name", "Conf", "Def", "High school", "Location", "Current job"
            );
            println!("{}", "-".repeat(112));

            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<24} | {:>5.2} | {:<3} | {:<24} | {:<18} | {:<20}",
                    i + 1,
                    truncate(&r.full_name, 24),
                    r.confidence,
                    if r.is_definite_alumni { "yes" } else { "" },
                    truncate(&r.high_school, 24),
                    truncate(&r.location, 18),
                    truncate(&r.current_job, 20)
                );
            }

            // Program signals (separate section to avoid clutter)
            let with_signal: Vec<_> = rows.iter().filter(|r| !r.signal.is_empty()).collect();
            if !with_signal.is_empty() {
                println!("\n--- Program signals ---");
                for r in &with_signal {
                    println!("  {}: {}", truncate(&r.profile_url, 48), r.signal);
                }
            }

            println!("\n{} candidates", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Targets:    {}", s.targets);
            println!("Acquired:   {}", s.acquired);
            println!("Pending:    {}", s.pending);
            println!("Failed:     {}", s.failed);
            println!("Documents:  {}", s.raw_pages);
            println!("Candidates: {}", s.candidates);
            println!("Definite:   {}", s.definite);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_db(settings: &Settings) -> anyhow::Result<Connection> {
    let conn = db::connect(&settings.database)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

async fn crawl(
    conn: &Connection,
    settings: &Settings,
    limit: Option<usize>,
) -> anyhow::Result<Option<CrawlStats>> {
    let targets = db::fetch_pending_targets(conn, limit)?;
    if targets.is_empty() {
        println!("No pending targets. Run 'queue' first or all targets are acquired.");
        return Ok(None);
    }

    let store: Arc<dyn ArtifactStore> = Arc::new(FsStore::open(&settings.pages_dir)?);
    let dedup = DedupSet::with_acquired(db::fetch_known_urls(conn)?);
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after in-flight targets");
                cancel.cancel();
            }
        });
    }

    let workers = settings.access.workers.clamp(1, targets.len());
    println!(
        "Crawling {} targets with {} browser pages (streaming to DB)...",
        targets.len(),
        workers
    );

    let browser = ChromeBrowser::launch(&settings.access).await?;
    let mut sessions = Vec::with_capacity(workers);
    for _ in 0..workers {
        match browser.new_session().await {
            Ok(session) => sessions.push(session),
            Err(e) => {
                browser.shutdown().await;
                return Err(e);
            }
        }
    }

    let ctx = CrawlContext {
        dedup,
        store,
        settings: settings.access.clone(),
        cancel,
    };
    let result = crawl::crawl_targets(conn, targets, sessions, &ctx).await;
    browser.shutdown().await;
    info!("{} profile URLs known after crawl", ctx.dedup.len());
    result.map(Some)
}

async fn enrich(
    conn: &Connection,
    settings: &Settings,
    opts: &PipelineOptions,
) -> anyhow::Result<PipelineStats> {
    let store = FsStore::open(&settings.pages_dir)?;
    let geocoder: Box<dyn Geocoder> = if settings.geocoder.enabled {
        Box::new(NominatimGeocoder::new(&settings.geocoder)?)
    } else {
        Box::new(NoGeocoder)
    };
    let extract = settings.extraction.options();
    let scoring = &settings.scoring;

    let pipeline = Pipeline {
        conn,
        store: &store,
        geocoder: &*geocoder,
        scorer: ConfidenceScorer::new(
            scoring.weights,
            &scoring.academy_locations,
            &scoring.partner_companies,
        ),
        extract: &extract,
    };
    pipeline.run(opts).await
}

fn print_pipeline(stats: &PipelineStats) {
    println!(
        "Scored {} candidates ({} definite alumni), skipped {} already scored, {} malformed.",
        stats.processed, stats.definite, stats.skipped, stats.malformed
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
