use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db::{self, CandidateRow, RawPageRow};
use crate::geo::geocoder::{self, Geocoder};
use crate::model::{Coordinates, RawDocument, ScoringCriteria};
use crate::parser::{self, ExtractOptions};
use crate::scoring::ConfidenceScorer;
use crate::store::ArtifactStore;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: usize,
    /// Stop after examining this many raw documents.
    pub limit: Option<usize>,
    /// Re-score candidates that already exist instead of skipping them.
    pub rescore: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            batch_size: 100,
            limit: None,
            rescore: false,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub processed: usize,
    pub skipped: usize,
    pub malformed: usize,
    pub definite: usize,
}

/// Raw documents → profiles → coordinates → scores → candidate rows.
pub struct Pipeline<'a> {
    pub conn: &'a Connection,
    pub store: &'a dyn ArtifactStore,
    pub geocoder: &'a dyn Geocoder,
    pub scorer: ConfidenceScorer<'a>,
    pub extract: &'a ExtractOptions,
}

impl Pipeline<'_> {
    pub async fn run(&self, opts: &PipelineOptions) -> Result<PipelineStats> {
        let mut stats = PipelineStats::default();
        let mut geocache: HashMap<String, Coordinates> = HashMap::new();
        let mut after_id = 0i64;
        let mut seen = 0usize;
        let batch_size = opts.batch_size.max(1);

        let total = db::get_stats(self.conn)?.raw_pages;
        let pb = ProgressBar::new(opts.limit.map_or(total, |n| n.min(total)) as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
                .progress_chars("#>-"),
        );

        loop {
            let want = match opts.limit {
                Some(limit) if seen >= limit => break,
                Some(limit) => batch_size.min(limit - seen),
                None => batch_size,
            };
            let batch = db::fetch_raw_batch(self.conn, after_id, want)?;
            let Some(last) = batch.last() else {
                break;
            };
            after_id = last.id;
            seen += batch.len();

            let (rows, resolved) =
                self.process_batch(&batch, opts.rescore, &mut geocache, &mut stats).await?;
            db::upsert_candidates(self.conn, &rows)?;
            db::set_resolved_urls(self.conn, &resolved)?;
            pb.inc(batch.len() as u64);
        }

        pb.finish_and_clear();
        info!(
            "Enriched {} profiles ({} skipped, {} malformed, {} definite alumni)",
            stats.processed, stats.skipped, stats.malformed, stats.definite
        );
        Ok(stats)
    }

    async fn process_batch(
        &self,
        batch: &[RawPageRow],
        rescore: bool,
        geocache: &mut HashMap<String, Coordinates>,
        stats: &mut PipelineStats,
    ) -> Result<(Vec<CandidateRow>, Vec<(i64, String)>)> {
        let mut docs = Vec::with_capacity(batch.len());
        for row in batch {
            // Once extracted, a document is keyed by the URL it declares.
            let key = match &row.resolved_url {
                Some(url) => url.clone(),
                None => parser::canonical_profile_url(&row.profile_url)
                    .unwrap_or_else(|| row.profile_url.clone()),
            };
            if !rescore && db::candidate_exists(self.conn, &key)? {
                stats.skipped += 1;
                continue;
            }
            match self.store.get(&row.profile_id)? {
                Some(html) => docs.push((row.id, raw_document(row, html))),
                None => {
                    warn!("No stored document for {}", row.profile_id);
                    stats.malformed += 1;
                }
            }
        }

        // Parsed documents never leave the worker thread that built them.
        let opts = self.extract;
        let extracted: Vec<_> = docs
            .par_iter()
            .map(|(id, doc)| (*id, parser::extract_checked(doc, opts)))
            .collect();

        let mut rows = Vec::with_capacity(extracted.len());
        let mut resolved = Vec::with_capacity(extracted.len());
        for (raw_id, result) in extracted {
            let profile = match result {
                Ok(p) => p,
                Err(e) => {
                    warn!("Skipping: {}", e);
                    stats.malformed += 1;
                    continue;
                }
            };

            let coords = match profile.location.query_text() {
                Some(text) => match geocache.get(&text) {
                    Some(c) => *c,
                    None => {
                        let c = geocoder::resolve(self.geocoder, Some(&text)).await;
                        geocache.insert(text, c);
                        c
                    }
                },
                None => Coordinates::UNRESOLVED,
            };

            let criteria = ScoringCriteria::from_profile(&profile, coords);
            let breakdown = self.scorer.score(&criteria);
            debug!(
                "{:?}: confidence {:.2} (definite: {})",
                profile.profile_id, breakdown.confidence, breakdown.is_definite_alumni
            );

            match CandidateRow::build(&profile, coords, &breakdown) {
                Some(row) => {
                    resolved.push((raw_id, row.profile_url.clone()));
                    stats.processed += 1;
                    if breakdown.is_definite_alumni {
                        stats.definite += 1;
                    }
                    rows.push(row);
                }
                None => stats.malformed += 1,
            }
        }
        Ok((rows, resolved))
    }
}

fn raw_document(row: &RawPageRow, html: String) -> RawDocument {
    let mut doc = RawDocument::new(row.profile_url.clone(), html);
    doc.final_url = row.final_url.clone();
    if let Ok(ts) = DateTime::parse_from_rfc3339(&row.captured_at) {
        doc.captured_at = ts.with_timezone(&Utc);
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{default_academy_locations, default_partner_companies, WeightTable};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MiamiGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for MiamiGeocoder {
        async fn geocode(&self, _text: &str) -> anyhow::Result<Option<Coordinates>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Coordinates { lat: 25.77, lon: -80.2 }))
        }
    }

    struct DownGeocoder;

    #[async_trait]
    impl Geocoder for DownGeocoder {
        async fn geocode(&self, _text: &str) -> anyhow::Result<Option<Coordinates>> {
            anyhow::bail!("503 from provider")
        }
    }

    const PLAIN: &str = r#"<html><head><meta property="og:url" content="https://www.linkedin.com/in/sam-lee"></head>
        <body><h1>Sam Lee</h1>
        <div class="top-card-layout__first-subline"><span>Miami, FL</span></div>
        <section data-section="educationsDetails"><ul>
          <li class="education__list-item"><h3>Coral Gables High School</h3></li>
        </ul></section></body></html>"#;

    fn setup() -> (Connection, MemoryStore) {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let store = MemoryStore::default();

        let public = std::fs::read_to_string("tests/fixtures/profile_public.html").unwrap();
        store.put("maria-lopez-4b2a1", &public).unwrap();
        store.put("sam-lee", PLAIN).unwrap();
        store.put("empty", "   ").unwrap();
        store.put("twin", PLAIN).unwrap();

        let rows: Vec<_> = ["maria-lopez-4b2a1", "sam-lee", "empty", "ghost", "twin"]
            .iter()
            .map(|id| {
                (
                    format!("https://www.linkedin.com/in/{}", id),
                    id.to_string(),
                    "2024-05-01T12:00:00+00:00".to_string(),
                )
            })
            .collect();
        db::insert_imported(&conn, &rows).unwrap();
        (conn, store)
    }

    fn count(conn: &Connection) -> usize {
        conn.query_row("SELECT COUNT(*) FROM candidates", [], |r| r.get(0)).unwrap()
    }

    #[tokio::test]
    async fn enriches_skips_and_upserts() {
        let (conn, store) = setup();
        let academies = default_academy_locations();
        let partners = default_partner_companies();
        let geocoder = MiamiGeocoder { calls: AtomicUsize::new(0) };
        let extract = ExtractOptions::default();
        let pipeline = Pipeline {
            conn: &conn,
            store: &store,
            geocoder: &geocoder,
            scorer: ConfidenceScorer::new(WeightTable::default(), &academies, &partners),
            extract: &extract,
        };
        let opts = PipelineOptions { batch_size: 2, ..Default::default() };

        let stats = pipeline.run(&opts).await.unwrap();
        // "twin" carries sam-lee's markup and upserts onto the same canonical row.
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.definite, 1);
        assert_eq!(count(&conn), 2);
        // Same location text is geocoded once.
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);

        let (confidence, prox): (f64, f64) = conn
            .query_row(
                "SELECT confidence_percentage, proximity_score FROM candidates
                 WHERE profile_url = 'https://www.linkedin.com/in/sam-lee'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(prox, 0.10);
        assert!((confidence - 0.35).abs() < 1e-9);

        // "twin" resolved to sam-lee's row on the first run and is skipped with it.
        let again = pipeline.run(&opts).await.unwrap();
        assert_eq!(again.processed, 0);
        assert_eq!(again.skipped, 3);
        assert_eq!(again.malformed, 2);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
        let twin: String = conn
            .query_row(
                "SELECT resolved_url FROM raw_pages WHERE profile_id = 'twin'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(twin, "https://www.linkedin.com/in/sam-lee");

        let rescored = pipeline
            .run(&PipelineOptions { rescore: true, ..opts.clone() })
            .await
            .unwrap();
        assert_eq!(rescored.processed, 3);
        assert_eq!(count(&conn), 2);
    }

    #[tokio::test]
    async fn geocoder_outage_is_not_fatal() {
        let (conn, store) = setup();
        let academies = default_academy_locations();
        let partners = default_partner_companies();
        let extract = ExtractOptions::default();
        let pipeline = Pipeline {
            conn: &conn,
            store: &store,
            geocoder: &DownGeocoder,
            scorer: ConfidenceScorer::new(WeightTable::default(), &academies, &partners),
            extract: &extract,
        };
        let stats = pipeline
            .run(&PipelineOptions { limit: Some(2), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(stats.processed, 2);

        let (lat, prox, confidence): (Option<f64>, f64, f64) = conn
            .query_row(
                "SELECT latitude, proximity_score, confidence_percentage FROM candidates
                 WHERE profile_url = 'https://www.linkedin.com/in/sam-lee'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(lat, None);
        assert_eq!(prox, 0.0);
        assert_eq!(confidence, 0.25);
    }
}
