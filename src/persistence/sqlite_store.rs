//! SQLite implementation of the UploadStore trait

use super::{PersistenceError, UploadStore};
use crate::models::{SuspiciousIp, UploadRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-based upload storage
pub struct SqliteUploadStore {
    conn: Mutex<Connection>,
}

impl SqliteUploadStore {
    /// Open (or create) the database at `db_path` and initialize the schema
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, PersistenceError> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistenceError> {
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(SqliteUploadStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)
    }

    /// Fixed-width RFC 3339 so text ordering matches time ordering
    fn format_time(time: DateTime<Utc>) -> String {
        time.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_time(raw: &str) -> Result<DateTime<Utc>, PersistenceError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| PersistenceError::InvalidData(format!("Invalid upload time: {}", raw)))
    }

    fn to_db_count(count: u64) -> Result<i64, PersistenceError> {
        i64::try_from(count)
            .map_err(|_| PersistenceError::InvalidData(format!("Count out of range: {}", count)))
    }

    fn insert_upload(conn: &Connection, filename: &str) -> Result<i64, PersistenceError> {
        conn.execute(
            "INSERT INTO uploaded_files (filename, upload_time) VALUES (?, ?)",
            params![filename, Self::format_time(Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn insert_ip(conn: &Connection, upload_id: i64, entry: &SuspiciousIp) -> Result<(), PersistenceError> {
        conn.execute(
            "INSERT INTO suspicious_ips (ip, count, location, file_id) VALUES (?, ?, ?, ?)",
            params![entry.ip, Self::to_db_count(entry.count)?, entry.location, upload_id],
        )?;
        Ok(())
    }

    fn load_ips(conn: &Connection, upload_id: i64) -> Result<Vec<SuspiciousIp>, PersistenceError> {
        let mut stmt = conn.prepare(
            "SELECT ip, count, location FROM suspicious_ips WHERE file_id = ? ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![upload_id], |row| {
                let ip: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                let location: Option<String> = row.get(2)?;
                Ok((ip, count, location))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(ip, count, location)| {
                let count = u64::try_from(count).map_err(|_| {
                    PersistenceError::InvalidData(format!("Negative count for {}: {}", ip, count))
                })?;
                Ok(SuspiciousIp {
                    ip,
                    count,
                    location: location.unwrap_or_default(),
                })
            })
            .collect()
    }

    fn load_upload(
        conn: &Connection,
        (id, filename, upload_time): (i64, String, String),
    ) -> Result<UploadRecord, PersistenceError> {
        Ok(UploadRecord {
            id,
            filename,
            upload_time: Self::parse_time(&upload_time)?,
            ips: Self::load_ips(conn, id)?,
        })
    }
}

impl UploadStore for SqliteUploadStore {
    fn create_upload(&self, filename: &str) -> Result<i64, PersistenceError> {
        let conn = self.conn()?;
        Self::insert_upload(&conn, filename)
    }

    fn add_suspicious_ip(&self, upload_id: i64, entry: &SuspiciousIp) -> Result<(), PersistenceError> {
        let conn = self.conn()?;
        Self::insert_ip(&conn, upload_id, entry)
    }

    fn save_upload(&self, filename: &str, results: &[SuspiciousIp]) -> Result<i64, PersistenceError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let upload_id = Self::insert_upload(&tx, filename)?;
        for entry in results {
            Self::insert_ip(&tx, upload_id, entry)?;
        }

        tx.commit()?;
        Ok(upload_id)
    }

    fn list_uploads(&self) -> Result<Vec<UploadRecord>, PersistenceError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, filename, upload_time FROM uploaded_files
             ORDER BY upload_time DESC, id DESC",
        )?;

        let uploads = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<(i64, String, String)>, _>>()?;

        uploads
            .into_iter()
            .map(|upload| Self::load_upload(&conn, upload))
            .collect()
    }

    fn get_upload(&self, upload_id: i64) -> Result<Option<UploadRecord>, PersistenceError> {
        let conn = self.conn()?;
        let upload: Option<(i64, String, String)> = conn
            .query_row(
                "SELECT id, filename, upload_time FROM uploaded_files WHERE id = ?",
                params![upload_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        upload
            .map(|upload| Self::load_upload(&conn, upload))
            .transpose()
    }

    fn clear_all(&self) -> Result<(), PersistenceError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "DELETE FROM suspicious_ips;
             DELETE FROM uploaded_files;",
        )?;
        Ok(())
    }
}
