//! # Audit Store
//!
//! Append-only SQLite persistence for a run's audit trail: submissions,
//! validation results, decisions, accepted records and progress reports.
//! Lives at `.sieve/sieve.db`. The accepted dataset can be rebuilt from it.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::dataset::AcceptedRecord;
use crate::protocol::{DataSubmission, OrchestratorDecision, ProgressReport, ValidationResult};

use super::io;

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

pub struct AuditStore {
    conn: Arc<Mutex<Connection>>,
}

impl AuditStore {
    /// Open or create the store in the runtime directory
    pub fn open() -> Result<Self> {
        Self::open_at(io::db_path())
    }

    /// Open the store at a specific path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store directory: {:?}", parent))?;
        }

        let conn = Connection::open(path.as_ref()).context("Failed to open audit store")?;
        Self::from_connection(conn)
    }

    /// Throwaway store for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [1],
            )?;
        }

        Ok(())
    }

    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                data_type TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS validation_results (
                id TEXT PRIMARY KEY,
                submission_id TEXT NOT NULL,
                validation_type TEXT NOT NULL,
                score REAL NOT NULL,
                passed INTEGER NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS decisions (
                id TEXT PRIMARY KEY,
                submission_id TEXT NOT NULL,
                decision TEXT NOT NULL,
                quality_score REAL NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        // Merge order matters for duplicate detection on reload
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS accepted_records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                submission_id TEXT NOT NULL UNIQUE,
                data_type TEXT NOT NULL,
                category TEXT NOT NULL,
                data TEXT NOT NULL,
                accepted_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS progress_reports (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                iteration INTEGER NOT NULL,
                completeness REAL NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_validations_submission ON validation_results(submission_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_decisions_submission ON decisions(submission_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_accepted_type ON accepted_records(data_type)",
            [],
        )?;

        tracing::info!("AuditStore initialized with schema version {}", SCHEMA_VERSION);
        Ok(())
    }

    pub fn record_submission(&self, submission: &DataSubmission) -> Result<()> {
        let data = serde_json::to_string(submission)?;
        self.lock()?.execute(
            "INSERT OR IGNORE INTO submissions (id, task_id, agent_id, data_type, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                submission.id,
                submission.task_id,
                submission.agent_id,
                submission.data_type().as_str(),
                data,
                submission.timestamp.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn record_validation(&self, result: &ValidationResult) -> Result<()> {
        let data = serde_json::to_string(result)?;
        self.lock()?.execute(
            "INSERT OR IGNORE INTO validation_results
                (id, submission_id, validation_type, score, passed, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                result.id,
                result.submission_id,
                result.validation_type.to_string(),
                result.score,
                result.passed,
                data,
                result.timestamp.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn record_decision(&self, decision: &OrchestratorDecision) -> Result<()> {
        let data = serde_json::to_string(decision)?;
        self.lock()?.execute(
            "INSERT OR IGNORE INTO decisions (id, submission_id, decision, quality_score, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                decision.id,
                decision.submission_id,
                decision.decision.to_string(),
                decision.quality_score,
                data,
                decision.timestamp.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn record_accepted(&self, record: &AcceptedRecord) -> Result<()> {
        let data = serde_json::to_string(record)?;
        self.lock()?.execute(
            "INSERT OR IGNORE INTO accepted_records (submission_id, data_type, category, data, accepted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.submission_id,
                record.key.data_type.as_str(),
                record.key.category,
                data,
                record.accepted_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn record_report(&self, report: &ProgressReport) -> Result<()> {
        let data = serde_json::to_string(report)?;
        self.lock()?.execute(
            "INSERT OR IGNORE INTO progress_reports (id, iteration, completeness, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                report.id,
                report.iteration,
                report.completeness,
                data,
                report.timestamp.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Every accepted record, in merge order
    pub fn load_accepted(&self) -> Result<Vec<AcceptedRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT data FROM accepted_records ORDER BY seq")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            let data = row?;
            records.push(
                serde_json::from_str(&data).context("Failed to parse stored accepted record")?,
            );
        }
        Ok(records)
    }

    /// Validation results recorded for one submission
    pub fn validations_for(&self, submission_id: &str) -> Result<Vec<ValidationResult>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM validation_results WHERE submission_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![submission_id], |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(serde_json::from_str(&row?).context("Failed to parse stored validation")?);
        }
        Ok(results)
    }

    /// Number of decisions per outcome (`accept`, `refine`, `reject`)
    pub fn decision_counts(&self) -> Result<BTreeMap<String, usize>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT decision, COUNT(*) FROM decisions GROUP BY decision")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (decision, count) = row?;
            counts.insert(decision, usize::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    pub fn latest_report(&self) -> Result<Option<ProgressReport>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM progress_reports ORDER BY seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|d| serde_json::from_str(&d).context("Failed to parse stored progress report"))
            .transpose()
    }
}
