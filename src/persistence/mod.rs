//! Persistence of uploads and the suspicious IPs found in them
//!
//! An upload owns its suspicious IP rows; the rows never outlive it.

pub mod sqlite_store;

pub use sqlite_store::SqliteUploadStore;

use crate::models::{SuspiciousIp, UploadRecord};
use thiserror::Error;

/// Errors that can occur during persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid data in database: {0}")]
    InvalidData(String),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

/// Trait for upload storage backends
pub trait UploadStore: Send + Sync {
    /// Create the parent record for an upload and return its id
    fn create_upload(&self, filename: &str) -> Result<i64, PersistenceError>;

    /// Attach a suspicious IP to an existing upload
    fn add_suspicious_ip(&self, upload_id: i64, entry: &SuspiciousIp) -> Result<(), PersistenceError>;

    /// Create an upload and all of its IPs
    ///
    /// The upload id is assigned before any child row is written.
    /// Backends with transactions should override this to make it atomic.
    fn save_upload(&self, filename: &str, results: &[SuspiciousIp]) -> Result<i64, PersistenceError> {
        let upload_id = self.create_upload(filename)?;
        for entry in results {
            self.add_suspicious_ip(upload_id, entry)?;
        }
        Ok(upload_id)
    }

    /// All uploads with their IPs, newest first
    fn list_uploads(&self) -> Result<Vec<UploadRecord>, PersistenceError>;

    /// A single upload with its IPs
    fn get_upload(&self, upload_id: i64) -> Result<Option<UploadRecord>, PersistenceError>;

    /// Clear all data (useful for testing)
    fn clear_all(&self) -> Result<(), PersistenceError>;
}
