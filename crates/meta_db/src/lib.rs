//! Durable report metadata store on SQLite.
//!
//! One row per report, keyed by report id, holding the serialized
//! `ReportMetadata` plus bookkeeping columns. Rows carry a TTL refreshed on
//! every write; expired rows are invisible to reads and reaped by
//! `purge_expired`. The store is the authoritative view of report state
//! across restarts.

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use report_models::ReportMetadata;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetaDbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("metadata codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report not found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, MetaDbError>;

pub struct MetaDb {
    conn: Mutex<Connection>,
    retention_secs: i64,
}

impl MetaDb {
    /// Open or create the store at the given path and run migrations.
    /// The parent directory is created (mode 0700) if missing.
    pub fn open(path: &Path, retention: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
                }
            }
        }
        let conn = Connection::open(path)?;
        let db = MetaDb {
            conn: Mutex::new(conn),
            retention_secs: retention.as_secs() as i64,
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                report_id  TEXT PRIMARY KEY,
                meta       TEXT NOT NULL,
                closed     INTEGER NOT NULL,
                updated_ts INTEGER NOT NULL,
                expires_ts INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_reports_expires ON reports(expires_ts);
            CREATE INDEX IF NOT EXISTS idx_reports_closed ON reports(closed);
            "#,
        )?;
        Ok(())
    }

    /// Upsert a metadata record and refresh its TTL.
    pub fn put(&self, meta: &ReportMetadata) -> Result<()> {
        let now = Utc::now().timestamp();
        let value = serde_json::to_string(meta)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO reports (report_id, meta, closed, updated_ts, expires_ts)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(report_id) DO UPDATE SET
                 meta = excluded.meta,
                 closed = excluded.closed,
                 updated_ts = excluded.updated_ts,
                 expires_ts = excluded.expires_ts",
            params![
                meta.report_id,
                value,
                meta.closed as i64,
                now,
                now + self.retention_secs,
            ],
        )?;
        Ok(())
    }

    /// Fetch a record by report id. Expired rows count as absent.
    pub fn get(&self, report_id: &str) -> Result<ReportMetadata> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();
        let value: Option<String> = conn
            .query_row(
                "SELECT meta FROM reports WHERE report_id = ?1 AND expires_ts > ?2",
                params![report_id, now],
                |r| r.get(0),
            )
            .optional()?;
        match value {
            Some(value) => Ok(serde_json::from_str(&value)?),
            None => Err(MetaDbError::NotFound),
        }
    }

    /// All non-expired records that are not closed, used by startup recovery.
    pub fn list_open(&self) -> Result<Vec<ReportMetadata>> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT meta FROM reports WHERE closed = 0 AND expires_ts > ?1 ORDER BY report_id",
        )?;
        let rows = stmt
            .query_map(params![now], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut out = Vec::with_capacity(rows.len());
        for value in rows {
            out.push(serde_json::from_str(&value)?);
        }
        Ok(out)
    }

    /// Delete rows past their TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM reports WHERE expires_ts <= ?1", params![now])?;
        Ok(n)
    }

    /// Close the underlying connection cleanly.
    pub fn close(self) -> Result<()> {
        let conn = self.conn.into_inner().unwrap();
        conn.close().map_err(|(_, err)| MetaDbError::Sqlite(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const RETENTION: Duration = Duration::from_secs(30 * 24 * 3600);

    fn sample_meta(report_id: &str) -> ReportMetadata {
        ReportMetadata {
            report_id: report_id.to_string(),
            test_name: "web_connectivity".to_string(),
            probe_asn: "AS1234".to_string(),
            probe_cc: String::new(),
            platform: String::new(),
            software_name: "netprobe".to_string(),
            software_version: "2.0.0".to_string(),
            creation_time: Utc::now(),
            last_update_time: Utc::now(),
            incoming_path: PathBuf::from("/tmp/incoming/r.json"),
            entry_count: 0,
            closed: false,
        }
    }

    #[test]
    fn put_get_roundtrip() {
        let tmp = TempDir::new().expect("tempdir");
        let db = MetaDb::open(&tmp.path().join("metadb/reports.sqlite"), RETENTION)
            .expect("open meta_db");

        let meta = sample_meta("r1");
        db.put(&meta).expect("put");
        let loaded = db.get("r1").expect("get");
        assert_eq!(loaded.report_id, "r1");
        assert_eq!(loaded.probe_asn, "AS1234");
        assert!(!loaded.closed);
    }

    #[test]
    fn get_unknown_is_not_found() {
        let tmp = TempDir::new().expect("tempdir");
        let db = MetaDb::open(&tmp.path().join("reports.sqlite"), RETENTION).expect("open");
        assert!(matches!(db.get("nope"), Err(MetaDbError::NotFound)));
    }

    #[test]
    fn upsert_overwrites_and_list_open_excludes_closed() {
        let tmp = TempDir::new().expect("tempdir");
        let db = MetaDb::open(&tmp.path().join("reports.sqlite"), RETENTION).expect("open");

        let mut meta = sample_meta("r1");
        db.put(&meta).expect("put open");
        db.put(&sample_meta("r2")).expect("put second");
        assert_eq!(db.list_open().expect("list").len(), 2);

        meta.closed = true;
        meta.entry_count = 3;
        db.put(&meta).expect("put closed");

        let open = db.list_open().expect("list");
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].report_id, "r2");
        assert_eq!(db.get("r1").expect("get").entry_count, 3);
    }

    #[test]
    fn zero_retention_hides_and_purges_rows() {
        let tmp = TempDir::new().expect("tempdir");
        let db = MetaDb::open(&tmp.path().join("reports.sqlite"), Duration::ZERO).expect("open");

        db.put(&sample_meta("r1")).expect("put");
        assert!(matches!(db.get("r1"), Err(MetaDbError::NotFound)));
        assert!(db.list_open().expect("list").is_empty());
        assert_eq!(db.purge_expired().expect("purge"), 1);
    }

    #[test]
    fn close_is_clean() {
        let tmp = TempDir::new().expect("tempdir");
        let db = MetaDb::open(&tmp.path().join("reports.sqlite"), RETENTION).expect("open");
        db.put(&sample_meta("r1")).expect("put");
        db.close().expect("close");
    }
}
