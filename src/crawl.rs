use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::access::dedup::DedupSet;
use crate::access::session::BrowserSession;
use crate::access::{AccessController, Acquisition};
use crate::config::AccessSettings;
use crate::db::{self, AttemptRow, NewTarget, TargetRow};
use crate::error::AccessError;
use crate::parser::{canonical_profile_url, profile_id};
use crate::store::ArtifactStore;

/// Parses a queue file: one profile URL per line, optionally followed by a tab and
/// the referrer to use for retries. Blank lines and `#` comments are ignored.
/// Returns the targets and the lines that were not profile URLs.
pub fn parse_targets(text: &str) -> (Vec<NewTarget>, Vec<String>) {
    let mut targets = Vec::new();
    let mut rejected = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (url, referrer) = match line.split_once('\t') {
            Some((url, referrer)) => (url.trim(), Some(referrer.trim())),
            None => (line, None),
        };
        match (canonical_profile_url(url), profile_id(url)) {
            (Some(url), Some(id)) => targets.push(NewTarget {
                url,
                profile_id: id,
                referrer: referrer.filter(|r| !r.is_empty()).map(str::to_string),
            }),
            _ => rejected.push(line.to_string()),
        }
    }
    (targets, rejected)
}

pub struct CrawlStats {
    pub total: usize,
    pub acquired: usize,
    pub skipped: usize,
    pub failed: usize,
}

struct Outcome {
    target: TargetRow,
    result: Result<Acquisition, AccessError>,
}

/// Shared state handed to every worker.
pub struct CrawlContext {
    pub dedup: Arc<DedupSet>,
    pub store: Arc<dyn ArtifactStore>,
    pub settings: AccessSettings,
    pub cancel: CancellationToken,
}

/// Acquires `targets` with one worker per browser session, saving each result as it
/// arrives. Documents go to the artifact store; outcomes go to the database.
pub async fn crawl_targets<S: BrowserSession + 'static>(
    conn: &Connection,
    targets: Vec<TargetRow>,
    sessions: Vec<S>,
    ctx: &CrawlContext,
) -> Result<CrawlStats> {
    let total = targets.len();
    let queue = Arc::new(Mutex::new(VecDeque::from(targets)));

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<Outcome>(sessions.len().max(1) * 2);

    for (worker, session) in sessions.into_iter().enumerate() {
        let queue = Arc::clone(&queue);
        let tx = tx.clone();
        let cancel = ctx.cancel.clone();
        let mut controller = AccessController::new(
            session,
            Arc::clone(&ctx.dedup),
            Arc::clone(&ctx.store),
            ctx.settings.clone(),
        )
        .with_cancel(ctx.cancel.clone());

        tokio::spawn(async move {
            let mut first = true;
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let Some(target) = queue.lock().await.pop_front() else {
                    break;
                };
                if !first {
                    controller.pace().await;
                }
                first = false;

                let result = controller
                    .acquire(&target.url, target.referrer.as_deref())
                    .await;
                let fatal = matches!(&result, Err(e) if e.is_fatal());
                if fatal {
                    error!("Worker {} stopping: browser session failed", worker);
                }
                if tx.send(Outcome { target, result }).await.is_err() || fatal {
                    break;
                }
            }
        });
    }

    // rx closes once every worker has finished
    drop(tx);

    let mut acquired = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    let mut update_stmt = conn.prepare(db::UPDATE_TARGET_SQL)?;
    let mut raw_stmt = conn.prepare(db::INSERT_RAW_SQL)?;

    while let Some(Outcome { target, result }) = rx.recv().await {
        let key = profile_id(&target.url);
        let row = match result {
            Ok(Acquisition::Fetched { document, attempts }) => {
                let Some(key) = key else {
                    continue;
                };
                ctx.store.put(&key, &document.html)?;
                acquired += 1;
                AttemptRow {
                    target_id: target.id,
                    url: target.url,
                    profile_id: Some(key),
                    attempts,
                    acquired: true,
                    final_url: document.final_url,
                    captured_at: Some(document.captured_at.to_rfc3339()),
                    error: None,
                }
            }
            Ok(Acquisition::AlreadyAcquired) => {
                skipped += 1;
                AttemptRow {
                    target_id: target.id,
                    url: target.url,
                    profile_id: key,
                    attempts: 0,
                    acquired: true,
                    final_url: None,
                    captured_at: None,
                    error: None,
                }
            }
            Ok(Acquisition::ClaimedElsewhere) => {
                skipped += 1;
                pb.inc(1);
                continue;
            }
            Err(e) => {
                warn!("Failed {}: {}", target.url, e);
                failed += 1;
                let attempts = match &e {
                    AccessError::AuthwallExceeded { attempts, .. } => *attempts,
                    _ => 0,
                };
                AttemptRow {
                    target_id: target.id,
                    url: target.url,
                    profile_id: key,
                    attempts,
                    acquired: false,
                    final_url: None,
                    captured_at: None,
                    error: Some(e.to_string()),
                }
            }
        };
        db::save_attempt(&mut update_stmt, &mut raw_stmt, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Crawled {} targets ({} acquired, {} skipped, {} failed)",
        total, acquired, skipped, failed
    );

    Ok(CrawlStats {
        total,
        acquired,
        skipped,
        failed,
    })
}
