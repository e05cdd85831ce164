use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::model::{CanonicalProfile, Coordinates, ScoreBreakdown};
use crate::parser;
use crate::store::ArtifactStore;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS targets (
            id          INTEGER PRIMARY KEY,
            url         TEXT UNIQUE NOT NULL,
            profile_id  TEXT NOT NULL,
            referrer    TEXT,
            acquired    BOOLEAN NOT NULL DEFAULT 0,
            attempts    INTEGER NOT NULL DEFAULT 0,
            last_error  TEXT,
            acquired_at TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_targets_acquired ON targets(acquired);

        -- Documents whose markup sits in the artifact store, keyed by profile id
        CREATE TABLE IF NOT EXISTS raw_pages (
            id          INTEGER PRIMARY KEY,
            profile_url TEXT UNIQUE NOT NULL,
            profile_id  TEXT NOT NULL,
            source      TEXT NOT NULL CHECK(source IN ('crawl','import')),
            final_url   TEXT,
            captured_at TEXT NOT NULL,
            -- Canonical URL the document declares, set once it has been extracted
            resolved_url TEXT
        );

        CREATE TABLE IF NOT EXISTS candidates (
            id                     INTEGER PRIMARY KEY,
            profile_url            TEXT UNIQUE NOT NULL,
            profile_id             TEXT,
            confidence_percentage  REAL NOT NULL,
            is_definite_alumni     BOOLEAN NOT NULL DEFAULT 0,
            full_name              TEXT,
            headline               TEXT,
            email                  TEXT,
            phone_number           TEXT,
            high_school            TEXT,
            hs_graduation_year     TEXT,
            naf_academy            TEXT,
            naf_academy_source     TEXT,
            naf_track_certified    TEXT,
            naf_track_source       TEXT,
            address                TEXT,
            city                   TEXT,
            state                  TEXT,
            country                TEXT,
            zip_code               TEXT,
            birthdate              TEXT,
            gender                 TEXT,
            ethnicity              TEXT,
            military_branch_served TEXT,
            current_job            TEXT,
            university_grad_year   TEXT,
            university             TEXT,
            degree                 TEXT,
            college_major          TEXT,
            school_district        TEXT,
            internship_company1    TEXT,
            internship_end_date1   TEXT,
            internship_company2    TEXT,
            internship_end_date2   TEXT,
            university2            TEXT,
            degree2                TEXT,
            latitude               REAL,
            longitude              REAL,
            high_school_score      REAL NOT NULL DEFAULT 0,
            internship_score       REAL NOT NULL DEFAULT 0,
            current_job_score      REAL NOT NULL DEFAULT 0,
            proximity_score        REAL NOT NULL DEFAULT 0,
            raw_total              REAL NOT NULL DEFAULT 0,
            nearest_academy_km     REAL,
            profile_json           TEXT,
            scored_at              TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_candidates_confidence ON candidates(confidence_percentage);
        ",
    )?;
    // Databases created before these columns existed.
    ensure_column(conn, "raw_pages", "resolved_url TEXT")?;
    ensure_column(conn, "candidates", "college_major TEXT")?;
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, definition: &str) -> Result<()> {
    let Some(column) = definition.split_whitespace().next() else {
        anyhow::bail!("Invalid column definition: {}", definition);
    };
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    if !names.iter().any(|n| n == column) {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {definition}"), [])
            .with_context(|| format!("Failed to add {column} to {table}"))?;
    }
    Ok(())
}

// ── Targets ──

pub struct NewTarget {
    pub url: String,
    pub profile_id: String,
    pub referrer: Option<String>,
}

pub fn insert_targets(conn: &Connection, targets: &[NewTarget]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO targets (url, profile_id, referrer) VALUES (?1, ?2, ?3)",
        )?;
        for t in targets {
            count += stmt.execute(rusqlite::params![t.url, t.profile_id, t.referrer])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

#[derive(Debug, Clone)]
pub struct TargetRow {
    pub id: i64,
    pub url: String,
    pub referrer: Option<String>,
}

pub fn fetch_pending_targets(conn: &Connection, limit: Option<usize>) -> Result<Vec<TargetRow>> {
    let sql = format!(
        "SELECT id, url, referrer FROM targets WHERE acquired = 0 ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TargetRow {
                id: row.get(0)?,
                url: row.get(1)?,
                referrer: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// URLs that need no further acquisition: acquired targets and anything already captured.
pub fn fetch_known_urls(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT url FROM targets WHERE acquired = 1
         UNION
         SELECT profile_url FROM raw_pages",
    )?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

/// Outcome of one acquisition, written back to `targets` (and `raw_pages` on success).
pub struct AttemptRow {
    pub target_id: i64,
    pub url: String,
    pub profile_id: Option<String>,
    pub attempts: u32,
    pub acquired: bool,
    pub final_url: Option<String>,
    pub captured_at: Option<String>,
    pub error: Option<String>,
}

pub fn save_attempt(
    update: &mut rusqlite::Statement,
    insert_raw: &mut rusqlite::Statement,
    row: &AttemptRow,
) -> Result<()> {
    update.execute(rusqlite::params![
        row.target_id,
        row.acquired,
        row.attempts,
        row.error
    ])?;
    if let (true, Some(profile_id), Some(captured_at)) =
        (row.acquired, &row.profile_id, &row.captured_at)
    {
        insert_raw.execute(rusqlite::params![
            row.url,
            profile_id,
            "crawl",
            row.final_url,
            captured_at
        ])?;
    }
    Ok(())
}

pub const UPDATE_TARGET_SQL: &str = "UPDATE targets
     SET acquired = ?2, attempts = attempts + ?3, last_error = ?4,
         acquired_at = CASE WHEN ?2 THEN datetime('now') ELSE acquired_at END
     WHERE id = ?1";

pub const INSERT_RAW_SQL: &str = "INSERT INTO raw_pages (profile_url, profile_id, source, final_url, captured_at)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT(profile_url) DO UPDATE SET
        final_url = excluded.final_url, captured_at = excluded.captured_at";

// ── Raw pages ──

pub struct RawPageRow {
    pub id: i64,
    pub profile_url: String,
    pub profile_id: String,
    pub final_url: Option<String>,
    pub captured_at: String,
    pub resolved_url: Option<String>,
}

/// Registers documents found in the artifact store. Returns how many were new.
pub fn insert_imported(conn: &Connection, rows: &[(String, String, String)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO raw_pages (profile_url, profile_id, source, captured_at)
             VALUES (?1, ?2, 'import', ?3)",
        )?;
        for (url, profile_id, captured_at) in rows {
            count += stmt.execute(rusqlite::params![url, profile_id, captured_at])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Registers store documents that no `raw_pages` row points at yet.
pub fn import_stored(
    conn: &Connection,
    store: &dyn ArtifactStore,
    captured_at: &str,
) -> Result<usize> {
    let known: HashSet<String> = fetch_raw_profile_ids(conn)?.into_iter().collect();
    let rows: Vec<_> = store
        .keys()?
        .into_iter()
        .filter(|key| !known.contains(key))
        .map(|key| (parser::profile_url_for(&key), key, captured_at.to_string()))
        .collect();
    insert_imported(conn, &rows)
}

pub fn fetch_raw_profile_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT profile_id FROM raw_pages")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

/// One page of raw documents, keyset-paginated on `id`.
pub fn fetch_raw_batch(conn: &Connection, after_id: i64, limit: usize) -> Result<Vec<RawPageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, profile_url, profile_id, final_url, captured_at, resolved_url
         FROM raw_pages WHERE id > ?1 ORDER BY id LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![after_id, limit as i64], |row| {
            Ok(RawPageRow {
                id: row.get(0)?,
                profile_url: row.get(1)?,
                profile_id: row.get(2)?,
                final_url: row.get(3)?,
                captured_at: row.get(4)?,
                resolved_url: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Records which candidate row each raw document maps to.
pub fn set_resolved_urls(conn: &Connection, resolved: &[(i64, String)]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare("UPDATE raw_pages SET resolved_url = ?2 WHERE id = ?1")?;
        for (id, url) in resolved {
            stmt.execute(rusqlite::params![id, url])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Candidates ──

pub fn candidate_exists(conn: &Connection, profile_url: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM candidates WHERE profile_url = ?1",
            [profile_url],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateRow {
    pub profile_url: String,
    pub profile_id: Option<String>,
    pub confidence: f64,
    pub is_definite_alumni: bool,
    pub full_name: Option<String>,
    pub headline: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub high_school: Option<String>,
    pub hs_graduation_year: Option<String>,
    pub naf_academy: Option<String>,
    pub naf_academy_source: Option<String>,
    pub naf_track_certified: Option<String>,
    pub naf_track_source: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zip_code: Option<String>,
    pub birthdate: Option<String>,
    pub military_branch_served: Option<String>,
    pub current_job: Option<String>,
    pub university_grad_year: Option<String>,
    pub university: Option<String>,
    pub degree: Option<String>,
    pub college_major: Option<String>,
    pub school_district: Option<String>,
    pub internship_company1: Option<String>,
    pub internship_end_date1: Option<String>,
    pub internship_company2: Option<String>,
    pub internship_end_date2: Option<String>,
    pub university2: Option<String>,
    pub degree2: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub high_school_score: f64,
    pub internship_score: f64,
    pub current_job_score: f64,
    pub proximity_score: f64,
    pub raw_total: f64,
    pub nearest_academy_km: Option<f64>,
    pub profile_json: Option<String>,
}

impl CandidateRow {
    /// `None` when the profile has no canonical URL to key the row on.
    pub fn build(
        profile: &CanonicalProfile,
        coords: Coordinates,
        score: &ScoreBreakdown,
    ) -> Option<Self> {
        let profile_url = profile.profile_url.clone()?;
        let internship = |i: usize| profile.internships.get(i);
        let resolved = (!coords.is_unresolved()).then_some(coords);
        Some(CandidateRow {
            profile_url,
            profile_id: profile.profile_id.clone(),
            confidence: score.confidence,
            is_definite_alumni: score.is_definite_alumni,
            full_name: profile.full_name.clone(),
            headline: profile.headline.clone(),
            email: profile.email.clone(),
            phone_number: profile.phone.clone(),
            high_school: profile.high_school.clone(),
            hs_graduation_year: profile.hs_graduation_year.clone(),
            naf_academy: profile.academy.as_ref().map(|s| s.label.clone()),
            naf_academy_source: profile.academy.as_ref().map(|s| s.source.as_str().to_string()),
            naf_track_certified: profile.track_certification.as_ref().map(|s| s.label.clone()),
            naf_track_source: profile
                .track_certification
                .as_ref()
                .map(|s| s.source.as_str().to_string()),
            address: profile.address.clone(),
            city: profile.location.city.clone(),
            state: profile.location.state.clone(),
            country: profile.location.country.clone(),
            zip_code: profile.zip_code.clone(),
            birthdate: profile.birthdate.clone(),
            military_branch_served: profile.military_branch.clone(),
            current_job: profile.current_job.clone(),
            university_grad_year: profile.university_grad_year.clone(),
            university: profile.university.clone(),
            degree: profile.degree.clone(),
            college_major: profile.college_major.clone(),
            school_district: profile.school_district.clone(),
            internship_company1: internship(0).map(|i| i.company.clone()),
            internship_end_date1: internship(0).and_then(|i| i.end_date.clone()),
            internship_company2: internship(1).map(|i| i.company.clone()),
            internship_end_date2: internship(1).and_then(|i| i.end_date.clone()),
            university2: profile.university2.clone(),
            degree2: profile.degree2.clone(),
            latitude: resolved.map(|c| c.lat),
            longitude: resolved.map(|c| c.lon),
            high_school_score: score.high_school_score,
            internship_score: score.internship_score,
            current_job_score: score.current_job_score,
            proximity_score: score.proximity_score,
            raw_total: score.raw_total,
            nearest_academy_km: score.nearest_academy_km,
            profile_json: serde_json::to_string(profile).ok(),
        })
    }
}

/// Insert or update by `profile_url`; the last writer wins.
pub fn upsert_candidates(conn: &Connection, rows: &[CandidateRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO candidates
             (profile_url, profile_id, confidence_percentage, is_definite_alumni, full_name,
              headline, email, phone_number, high_school, hs_graduation_year, naf_academy,
              naf_academy_source, naf_track_certified, naf_track_source, address, city, state,
              country, zip_code, birthdate, military_branch_served, current_job,
              university_grad_year, university, degree, college_major, school_district,
              internship_company1, internship_end_date1, internship_company2,
              internship_end_date2, university2, degree2, latitude, longitude,
              high_school_score, internship_score, current_job_score, proximity_score,
              raw_total, nearest_academy_km, profile_json)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,
                     ?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32,?33,?34,?35,?36,?37,?38,
                     ?39,?40,?41,?42)
             ON CONFLICT(profile_url) DO UPDATE SET
                profile_id = excluded.profile_id,
                confidence_percentage = excluded.confidence_percentage,
                is_definite_alumni = excluded.is_definite_alumni,
                full_name = excluded.full_name,
                headline = excluded.headline,
                email = excluded.email,
                phone_number = excluded.phone_number,
                high_school = excluded.high_school,
                hs_graduation_year = excluded.hs_graduation_year,
                naf_academy = excluded.naf_academy,
                naf_academy_source = excluded.naf_academy_source,
                naf_track_certified = excluded.naf_track_certified,
                naf_track_source = excluded.naf_track_source,
                address = excluded.address,
                city = excluded.city,
                state = excluded.state,
                country = excluded.country,
                zip_code = excluded.zip_code,
                birthdate = excluded.birthdate,
                military_branch_served = excluded.military_branch_served,
                current_job = excluded.current_job,
                university_grad_year = excluded.university_grad_year,
                university = excluded.university,
                degree = excluded.degree,
                college_major = excluded.college_major,
                school_district = excluded.school_district,
                internship_company1 = excluded.internship_company1,
                internship_end_date1 = excluded.internship_end_date1,
                internship_company2 = excluded.internship_company2,
                internship_end_date2 = excluded.internship_end_date2,
                university2 = excluded.university2,
                degree2 = excluded.degree2,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                high_school_score = excluded.high_school_score,
                internship_score = excluded.internship_score,
                current_job_score = excluded.current_job_score,
                proximity_score = excluded.proximity_score,
                raw_total = excluded.raw_total,
                nearest_academy_km = excluded.nearest_academy_km,
                profile_json = excluded.profile_json,
                scored_at = datetime('now')",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![
                r.profile_url, r.profile_id, r.confidence, r.is_definite_alumni, r.full_name,
                r.headline, r.email, r.phone_number, r.high_school, r.hs_graduation_year,
                r.naf_academy, r.naf_academy_source, r.naf_track_certified, r.naf_track_source,
                r.address, r.city, r.state, r.country, r.zip_code, r.birthdate,
                r.military_branch_served, r.current_job, r.university_grad_year, r.university,
                r.degree, r.college_major, r.school_district, r.internship_company1,
                r.internship_end_date1, r.internship_company2, r.internship_end_date2,
                r.university2, r.degree2,
                r.latitude, r.longitude, r.high_school_score, r.internship_score,
                r.current_job_score, r.proximity_score, r.raw_total, r.nearest_academy_km,
                r.profile_json,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Overview ──

pub struct OverviewRow {
    pub profile_url: String,
    pub full_name: String,
    pub confidence: f64,
    pub is_definite_alumni: bool,
    pub high_school: String,
    pub location: String,
    pub current_job: String,
    pub signal: String,
}

pub fn fetch_overview(
    conn: &Connection,
    min_confidence: Option<f64>,
    definite_only: bool,
    limit: usize,
) -> Result<Vec<OverviewRow>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(min) = min_confidence {
        conditions.push(format!("confidence_percentage >= ?{}", params.len() + 1));
        params.push(Box::new(min));
    }
    if definite_only {
        conditions.push("is_definite_alumni = 1".to_string());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT profile_url, COALESCE(full_name,''), confidence_percentage, is_definite_alumni,
                COALESCE(high_school,''),
                TRIM(COALESCE(city,'') || CASE WHEN state IS NULL THEN '' ELSE ', ' || state END, ', '),
                COALESCE(current_job,''),
                COALESCE(naf_academy, naf_track_certified, '')
         FROM candidates{}
         ORDER BY confidence_percentage DESC, profile_url
         LIMIT {}",
        where_clause, limit
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(OverviewRow {
                profile_url: row.get(0)?,
                full_name: row.get(1)?,
                confidence: row.get(2)?,
                is_definite_alumni: row.get(3)?,
                high_school: row.get(4)?,
                location: row.get(5)?,
                current_job: row.get(6)?,
                signal: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub targets: usize,
    pub acquired: usize,
    pub pending: usize,
    pub failed: usize,
    pub raw_pages: usize,
    pub candidates: usize,
    pub definite: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let targets = count("SELECT COUNT(*) FROM targets")?;
    let acquired = count("SELECT COUNT(*) FROM targets WHERE acquired = 1")?;
    let failed = count("SELECT COUNT(*) FROM targets WHERE acquired = 0 AND last_error IS NOT NULL")?;
    Ok(Stats {
        targets,
        acquired,
        pending: targets - acquired,
        failed,
        raw_pages: count("SELECT COUNT(*) FROM raw_pages")?,
        candidates: count("SELECT COUNT(*) FROM candidates")?,
        definite: count("SELECT COUNT(*) FROM candidates WHERE is_definite_alumni = 1")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AffiliationSignal, Internship, SignalSource};
    use crate::store::FsStore;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn target(id: &str) -> NewTarget {
        NewTarget {
            url: format!("https://www.linkedin.com/in/{}", id),
            profile_id: id.to_string(),
            referrer: None,
        }
    }

    fn breakdown(confidence: f64, definite: bool) -> ScoreBreakdown {
        ScoreBreakdown {
            is_definite_alumni: definite,
            academy_match: definite,
            track_certified: false,
            high_school_score: 0.25,
            internship_score: 0.0,
            current_job_score: 0.0,
            proximity_score: 0.0,
            nearest_academy_km: None,
            raw_total: confidence,
            confidence,
        }
    }

    fn profile(id: &str) -> CanonicalProfile {
        CanonicalProfile {
            profile_id: Some(id.to_string()),
            profile_url: Some(format!("https://www.linkedin.com/in/{}", id)),
            full_name: Some("Maria Lopez".into()),
            college_major: Some("Finance".into()),
            high_school: Some("Miami Senior High School".into()),
            internships: vec![
                Internship { company: "Canva".into(), title: None, end_date: Some("Aug 2018".into()) },
                Internship { company: "HOSA".into(), title: None, end_date: None },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn targets_are_deduplicated_and_paged() {
        let conn = memory();
        assert_eq!(insert_targets(&conn, &[target("a"), target("b"), target("a")]).unwrap(), 2);
        assert_eq!(insert_targets(&conn, &[target("b")]).unwrap(), 0);
        let pending = fetch_pending_targets(&conn, Some(1)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "https://www.linkedin.com/in/a");
    }

    #[test]
    fn attempts_update_targets_and_raw_pages() {
        let conn = memory();
        insert_targets(&conn, &[target("a"), target("b")]).unwrap();
        let pending = fetch_pending_targets(&conn, None).unwrap();
        let mut update = conn.prepare(UPDATE_TARGET_SQL).unwrap();
        let mut insert = conn.prepare(INSERT_RAW_SQL).unwrap();

        save_attempt(&mut update, &mut insert, &AttemptRow {
            target_id: pending[0].id,
            url: pending[0].url.clone(),
            profile_id: Some("a".into()),
            attempts: 2,
            acquired: true,
            final_url: None,
            captured_at: Some("2024-01-01T00:00:00Z".into()),
            error: None,
        })
        .unwrap();
        save_attempt(&mut update, &mut insert, &AttemptRow {
            target_id: pending[1].id,
            url: pending[1].url.clone(),
            profile_id: Some("b".into()),
            attempts: 10,
            acquired: false,
            final_url: None,
            captured_at: None,
            error: Some("authwall".into()),
        })
        .unwrap();

        let left = fetch_pending_targets(&conn, None).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].url, "https://www.linkedin.com/in/b");
        assert_eq!(fetch_known_urls(&conn).unwrap(), vec!["https://www.linkedin.com/in/a".to_string()]);

        let s = get_stats(&conn).unwrap();
        assert_eq!((s.targets, s.acquired, s.pending, s.failed, s.raw_pages), (2, 1, 1, 1, 1));
    }

    #[test]
    fn raw_batches_paginate_until_empty() {
        let conn = memory();
        let rows: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|id| (format!("https://www.linkedin.com/in/{}", id), id.to_string(), "t".to_string()))
            .collect();
        assert_eq!(insert_imported(&conn, &rows).unwrap(), 3);
        assert_eq!(insert_imported(&conn, &rows).unwrap(), 0);

        let first = fetch_raw_batch(&conn, 0, 2).unwrap();
        assert_eq!(first.len(), 2);
        let second = fetch_raw_batch(&conn, first[1].id, 2).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].profile_id, "c");
        assert!(fetch_raw_batch(&conn, second[0].id, 2).unwrap().is_empty());
        assert_eq!(fetch_raw_profile_ids(&conn).unwrap().len(), 3);

        assert_eq!(first[0].resolved_url, None);
        set_resolved_urls(&conn, &[(first[0].id, "https://www.linkedin.com/in/z".into())]).unwrap();
        let again = fetch_raw_batch(&conn, 0, 1).unwrap();
        assert_eq!(again[0].resolved_url.as_deref(), Some("https://www.linkedin.com/in/z"));
    }

    #[test]
    fn import_keeps_escaped_profile_ids() {
        let conn = memory();
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.put("jos%C3%A9-garcia", "<html></html>").unwrap();
        store.put("sam-lee", "<html></html>").unwrap();
        let crawled = vec![(
            "https://www.linkedin.com/in/jos%C3%A9-garcia".to_string(),
            "jos%C3%A9-garcia".to_string(),
            "t".to_string(),
        )];
        insert_imported(&conn, &crawled).unwrap();

        assert_eq!(import_stored(&conn, &store, "t2").unwrap(), 1);
        assert_eq!(import_stored(&conn, &store, "t3").unwrap(), 0);
        let mut urls = fetch_known_urls(&conn).unwrap();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                "https://www.linkedin.com/in/jos%C3%A9-garcia".to_string(),
                "https://www.linkedin.com/in/sam-lee".to_string(),
            ]
        );
    }

    #[test]
    fn schema_upgrades_older_databases() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE raw_pages (
                id INTEGER PRIMARY KEY, profile_url TEXT UNIQUE NOT NULL, profile_id TEXT NOT NULL,
                source TEXT NOT NULL, final_url TEXT, captured_at TEXT NOT NULL);
             INSERT INTO raw_pages (profile_url, profile_id, source, captured_at)
                VALUES ('https://www.linkedin.com/in/a', 'a', 'import', 't');",
        )
        .unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        let batch = fetch_raw_batch(&conn, 0, 10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].resolved_url, None);
    }

    #[test]
    fn upsert_updates_in_place() {
        let conn = memory();
        let p = profile("maria");
        let row = CandidateRow::build(&p, Coordinates::UNRESOLVED, &breakdown(0.25, false)).unwrap();
        assert_eq!(row.internship_company2.as_deref(), Some("HOSA"));
        assert_eq!(row.internship_end_date1.as_deref(), Some("Aug 2018"));
        assert_eq!(row.latitude, None);
        upsert_candidates(&conn, &[row]).unwrap();
        assert!(candidate_exists(&conn, "https://www.linkedin.com/in/maria").unwrap());

        let mut p2 = p.clone();
        p2.academy = Some(AffiliationSignal {
            label: "Academy of Finance".into(),
            source: SignalSource::EducationInferred,
        });
        let coords = Coordinates { lat: 25.76, lon: -80.19 };
        let row = CandidateRow::build(&p2, coords, &breakdown(1.0, true)).unwrap();
        upsert_candidates(&conn, &[row]).unwrap();

        let n: usize = conn.query_row("SELECT COUNT(*) FROM candidates", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 1);
        let (confidence, source, lat, major): (f64, String, f64, String) = conn
            .query_row(
                "SELECT confidence_percentage, naf_academy_source, latitude, college_major
                 FROM candidates",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(confidence, 1.0);
        assert_eq!(major, "Finance");
        assert_eq!(source, "education_inferred");
        assert_eq!(lat, 25.76);

        let overview = fetch_overview(&conn, Some(0.5), true, 10).unwrap();
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].signal, "Academy of Finance");
        assert_eq!(get_stats(&conn).unwrap().definite, 1);
    }

    #[test]
    fn profile_without_url_is_not_persistable() {
        let p = CanonicalProfile::default();
        assert!(CandidateRow::build(&p, Coordinates::UNRESOLVED, &breakdown(0.0, false)).is_none());
        assert!(!candidate_exists(&memory(), "https://www.linkedin.com/in/x").unwrap());
    }
}
