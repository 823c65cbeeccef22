//! Quarantine record database using SQLite.
//!
//! Tracks suspended files: original path, content hash, permission
//! bits, vault blob name, and quarantine time. Eviction queries read
//! oldest-first by quarantine time.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::error::Result;

/// One suspended file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// Unique identifier (UUID)
    pub id: String,
    /// Path the file was taken from
    pub original_path: PathBuf,
    /// Filename of the encrypted blob inside the vault
    pub blob_name: String,
    /// SHA-256 hash of the original content
    pub file_hash: String,
    /// Original file size in bytes
    pub file_size: u64,
    /// Original unix permission bits
    pub file_mode: u32,
    /// Threat detail that triggered the quarantine
    pub threat_type: String,
    /// When the file was quarantined
    pub quarantined_at: DateTime<Utc>,
}

impl QuarantineRecord {
    pub fn new(
        original_path: PathBuf,
        blob_name: String,
        file_hash: String,
        file_size: u64,
        file_mode: u32,
        threat_type: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            original_path,
            blob_name,
            file_hash,
            file_size,
            file_mode,
            threat_type,
            quarantined_at: Utc::now(),
        }
    }
}

/// Quarantine record database manager.
pub struct QuarantineMetadata {
    conn: Connection,
}

const SELECT_COLUMNS: &str = "id, original_path, blob_name, file_hash, file_size, \
     file_mode, threat_type, quarantined_at";

impl QuarantineMetadata {
    /// Create or open the quarantine record database.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::core::error::Error::file_write(parent, e))?;
        }

        let conn = Connection::open(db_path)?;
        let metadata = Self { conn };
        metadata.initialize()?;
        Ok(metadata)
    }

    /// Create an in-memory database (for testing).
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let metadata = Self { conn };
        metadata.initialize()?;
        Ok(metadata)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS quarantine_records (
                id TEXT PRIMARY KEY,
                original_path TEXT NOT NULL UNIQUE,
                blob_name TEXT NOT NULL,
                file_hash TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                file_mode INTEGER NOT NULL,
                threat_type TEXT NOT NULL,
                quarantined_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_quarantine_hash ON quarantine_records(file_hash)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_quarantine_time ON quarantine_records(quarantined_at)",
            [],
        )?;

        Ok(())
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<QuarantineRecord> {
        Ok(QuarantineRecord {
            id: row.get(0)?,
            original_path: PathBuf::from(row.get::<_, String>(1)?),
            blob_name: row.get(2)?,
            file_hash: row.get(3)?,
            file_size: row.get::<_, i64>(4)? as u64,
            file_mode: row.get::<_, i64>(5)? as u32,
            threat_type: row.get(6)?,
            quarantined_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    /// Persist a new record. Fails if an active record already exists
    /// for the same original path.
    pub fn add(&self, record: &QuarantineRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO quarantine_records
             (id, original_path, blob_name, file_hash, file_size,
              file_mode, threat_type, quarantined_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.original_path.to_string_lossy(),
                record.blob_name,
                record.file_hash,
                record.file_size as i64,
                record.file_mode as i64,
                record.threat_type,
                record.quarantined_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a record by ID.
    pub fn get(&self, id: &str) -> Result<Option<QuarantineRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM quarantine_records WHERE id = ?1",
            SELECT_COLUMNS
        ))?;

        match stmt.query_row([id], Self::row_to_record) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Get the active record for an original path, if any.
    pub fn get_by_path(&self, path: &Path) -> Result<Option<QuarantineRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM quarantine_records WHERE original_path = ?1",
            SELECT_COLUMNS
        ))?;

        match stmt.query_row([path.to_string_lossy()], Self::row_to_record) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List all records, newest first.
    pub fn list(&self) -> Result<Vec<QuarantineRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM quarantine_records ORDER BY quarantined_at DESC",
            SELECT_COLUMNS
        ))?;

        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// List all records oldest-first, the eviction order.
    pub fn list_oldest_first(&self) -> Result<Vec<QuarantineRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM quarantine_records ORDER BY quarantined_at ASC, id ASC",
            SELECT_COLUMNS
        ))?;

        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Delete a record. Returns whether a row was removed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM quarantine_records WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    /// Count of active records.
    pub fn count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM quarantine_records", [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    /// Total original size of all suspended files.
    pub fn total_size(&self) -> Result<u64> {
        let size: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(file_size), 0) FROM quarantine_records",
            [],
            |row| row.get(0),
        )?;
        Ok(size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record(path: &str) -> QuarantineRecord {
        QuarantineRecord::new(
            PathBuf::from(path),
            "blob.quar".to_string(),
            "a".repeat(64),
            1024,
            0o644,
            "eval_base64".to_string(),
        )
    }

    #[test]
    fn test_open_in_memory() {
        let metadata = QuarantineMetadata::in_memory().unwrap();
        assert_eq!(metadata.count().unwrap(), 0);
    }

    #[test]
    fn test_add_and_get() {
        let metadata = QuarantineMetadata::in_memory().unwrap();
        let record = test_record("/srv/site/shell.php");
        let id = record.id.clone();

        metadata.add(&record).unwrap();
        assert_eq!(metadata.count().unwrap(), 1);

        let retrieved = metadata.get(&id).unwrap().unwrap();
        assert_eq!(retrieved.threat_type, "eval_base64");
        assert_eq!(retrieved.file_mode, 0o644);
        assert_eq!(retrieved.original_path, PathBuf::from("/srv/site/shell.php"));
    }

    #[test]
    fn test_get_nonexistent() {
        let metadata = QuarantineMetadata::in_memory().unwrap();
        assert!(metadata.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_one_record_per_path() {
        let metadata = QuarantineMetadata::in_memory().unwrap();
        metadata.add(&test_record("/srv/site/a.php")).unwrap();
        // Second active record for the same path must be rejected.
        assert!(metadata.add(&test_record("/srv/site/a.php")).is_err());
    }

    #[test]
    fn test_get_by_path() {
        let metadata = QuarantineMetadata::in_memory().unwrap();
        let record = test_record("/srv/site/b.php");
        metadata.add(&record).unwrap();

        let found = metadata
            .get_by_path(Path::new("/srv/site/b.php"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, record.id);
        assert!(metadata
            .get_by_path(Path::new("/srv/site/other.php"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_oldest_first_ordering() {
        let metadata = QuarantineMetadata::in_memory().unwrap();

        let mut first = test_record("/srv/site/1.php");
        first.quarantined_at = Utc::now() - chrono::Duration::hours(3);
        let mut second = test_record("/srv/site/2.php");
        second.quarantined_at = Utc::now() - chrono::Duration::hours(2);
        let third = test_record("/srv/site/3.php");

        metadata.add(&third).unwrap();
        metadata.add(&first).unwrap();
        metadata.add(&second).unwrap();

        let ordered = metadata.list_oldest_first().unwrap();
        assert_eq!(ordered[0].id, first.id);
        assert_eq!(ordered[1].id, second.id);
        assert_eq!(ordered[2].id, third.id);
    }

    #[test]
    fn test_remove() {
        let metadata = QuarantineMetadata::in_memory().unwrap();
        let record = test_record("/srv/site/rm.php");
        let id = record.id.clone();
        metadata.add(&record).unwrap();

        assert!(metadata.remove(&id).unwrap());
        assert_eq!(metadata.count().unwrap(), 0);
        assert!(!metadata.remove(&id).unwrap());
    }

    #[test]
    fn test_total_size() {
        let metadata = QuarantineMetadata::in_memory().unwrap();

        let mut a = test_record("/srv/site/a.php");
        a.file_size = 1000;
        metadata.add(&a).unwrap();

        let mut b = test_record("/srv/site/b.php");
        b.file_size = 2500;
        metadata.add(&b).unwrap();

        assert_eq!(metadata.total_size().unwrap(), 3500);
    }
}
