//! Typed persistent store over SQLite.
//!
//! Holds scan runs, their findings, the run-lock row, and a generic
//! JSON key-value table used for the core-manifest cache. Replaces the
//! host platform's options API with explicit schema per record type.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::core::error::{Error, Result, RunLockFailure};
use crate::core::types::{Finding, FindingType, ScanRun, Severity};

/// SQLite-backed store for engine state.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Create or open the store database.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::file_write(parent, e))?;
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS scan_runs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_runs_status ON scan_runs(status);
            CREATE TABLE IF NOT EXISTS findings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                file_path TEXT NOT NULL,
                finding_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                evidence TEXT NOT NULL,
                detected_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_findings_run ON findings(run_id);
            CREATE TABLE IF NOT EXISTS run_lock (
                slot INTEGER PRIMARY KEY CHECK (slot = 1),
                holder TEXT NOT NULL,
                acquired_at TEXT NOT NULL,
                renewed_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    // ===== generic key-value =====

    /// Fetch and deserialize a value.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a value.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, json],
        )?;
        Ok(())
    }

    /// Remove a key. Returns whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let rows = self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(rows > 0)
    }

    // ===== scan runs =====

    /// Insert or update a run record.
    pub fn save_run(&self, run: &ScanRun) -> Result<()> {
        let data = serde_json::to_string(run)?;
        self.conn.execute(
            "INSERT INTO scan_runs (id, status, started_at, data)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, data = excluded.data",
            params![
                run.id,
                run.status.as_str(),
                run.started_at.to_rfc3339(),
                data
            ],
        )?;
        Ok(())
    }

    /// Fetch a run by id.
    pub fn get_run(&self, id: &str) -> Result<Option<ScanRun>> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM scan_runs WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// The most recent paused run, if one exists.
    pub fn latest_paused_run(&self) -> Result<Option<ScanRun>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM scan_runs WHERE status = 'paused'
                 ORDER BY started_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// The most recent run that can still make progress: paused, or
    /// left marked running by a crashed invocation. Only meaningful
    /// once the caller holds the run lock, which rules out a live
    /// running invocation.
    pub fn latest_resumable_run(&self) -> Result<Option<ScanRun>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM scan_runs WHERE status IN ('paused', 'running')
                 ORDER BY started_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// List run records, newest first.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<ScanRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT data FROM scan_runs ORDER BY started_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(Error::from))
            .collect()
    }

    // ===== findings =====

    /// Append findings produced by a run batch.
    pub fn add_findings(&self, run_id: &str, findings: &[Finding]) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO findings
             (run_id, file_path, finding_type, severity, evidence, detected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for finding in findings {
            stmt.execute(params![
                run_id,
                finding.file_path.to_string_lossy(),
                finding.finding_type.as_str(),
                finding.severity.as_str(),
                finding.evidence,
                finding.detected_at.to_rfc3339(),
            ])?;
        }
        Ok(())
    }

    /// All findings for a run, in insertion order.
    pub fn findings_for_run(&self, run_id: &str) -> Result<Vec<Finding>> {
        let mut stmt = self.conn.prepare(
            "SELECT file_path, finding_type, severity, evidence, detected_at
             FROM findings WHERE run_id = ?1 ORDER BY id ASC",
        )?;

        let findings = stmt
            .query_map([run_id], |row| {
                let path: String = row.get(0)?;
                let ftype: String = row.get(1)?;
                let severity: String = row.get(2)?;
                let evidence: String = row.get(3)?;
                let detected: String = row.get(4)?;
                Ok(Finding {
                    file_path: path.into(),
                    finding_type: FindingType::from_str(&ftype)
                        .unwrap_or(FindingType::AnalysisError),
                    severity: Severity::from_str(&severity).unwrap_or(Severity::Low),
                    evidence,
                    detected_at: DateTime::parse_from_rfc3339(&detected)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(findings)
    }

    // ===== run lock =====

    /// Acquire the installation-wide run lock. A fresh lock held by
    /// someone else fails with `AlreadyActive`; a lock whose last
    /// renewal is older than `ttl` is abandoned and reclaimed.
    pub fn acquire_run_lock(&self, holder: &str, ttl: Duration) -> Result<()> {
        let existing: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT holder, renewed_at FROM run_lock WHERE slot = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let now = Utc::now();

        if let Some((current_holder, renewed_at)) = existing {
            let renewed = DateTime::parse_from_rfc3339(&renewed_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now);
            if now - renewed < ttl {
                return Err(Error::RunLock {
                    reason: RunLockFailure::AlreadyActive,
                });
            }

            log::warn!(
                "reclaiming stale run lock held by {} (last renewed {})",
                current_holder,
                renewed_at
            );
            let removed = self
                .conn
                .execute("DELETE FROM run_lock WHERE slot = 1 AND holder = ?1", [
                    &current_holder,
                ])?;
            if removed == 0 {
                return Err(Error::RunLock {
                    reason: RunLockFailure::StaleReclaimFailed,
                });
            }
        }

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO run_lock (slot, holder, acquired_at, renewed_at)
             VALUES (1, ?1, ?2, ?2)",
            params![holder, now.to_rfc3339()],
        )?;
        if inserted == 0 {
            return Err(Error::RunLock {
                reason: RunLockFailure::AlreadyActive,
            });
        }

        Ok(())
    }

    /// Refresh the lock's renewal timestamp; call at batch boundaries.
    pub fn renew_run_lock(&self, holder: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE run_lock SET renewed_at = ?1 WHERE slot = 1 AND holder = ?2",
            params![Utc::now().to_rfc3339(), holder],
        )?;
        if rows == 0 {
            return Err(Error::RunLock {
                reason: RunLockFailure::StaleReclaimFailed,
            });
        }
        Ok(())
    }

    /// Release the lock if held by `holder`.
    pub fn release_run_lock(&self, holder: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM run_lock WHERE slot = 1 AND holder = ?1", [
                holder,
            ])?;
        Ok(())
    }
}
