//! Scan -> filter -> enrich pipeline and the store-backed application context
//!
//! [`analyze_path`] and [`enrich`] take only what they need, so front ends
//! without a database can call them directly. [`AppContext`] is built once at
//! startup by front ends that also keep upload history.

use crate::config::{Config, ConfigError};
use crate::detection::{filter, AttemptCounts};
use crate::geolocation::{GeoError, IpLocator};
use crate::input::{LogScanner, ScanError};
use crate::models::{SuspiciousIp, UploadRecord};
use crate::output::store_results;
use crate::persistence::{PersistenceError, SqliteUploadStore, UploadStore};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the application layer
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Failed to initialize geolocation: {0}")]
    Geo(#[from] GeoError),

    #[error("Storage error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Failed to save upload: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Upload {0} not found")]
    UploadNotFound(i64),
}

/// Resolve every IP once, keeping scan order
pub async fn enrich(counts: &AttemptCounts, locator: &IpLocator) -> Vec<SuspiciousIp> {
    let mut results = Vec::with_capacity(counts.len());
    for (ip, count) in counts.iter() {
        let location = locator.resolve(ip).await;
        results.push(SuspiciousIp::new(ip, count, location));
    }
    results
}

/// Scan a log file, keep IPs at or above `threshold` and resolve their locations
pub async fn analyze_path<P: AsRef<Path>>(
    scanner: &LogScanner,
    locator: &IpLocator,
    path: P,
    threshold: i64,
) -> Result<Vec<SuspiciousIp>, ScanError> {
    let counts = scanner.scan_path(path)?;
    let flagged = filter(&counts, threshold);
    log::info!(
        "{} of {} IP(s) reached the threshold of {}",
        flagged.len(),
        counts.len(),
        threshold
    );
    Ok(enrich(&flagged, locator).await)
}

/// Result of ingesting one uploaded log file
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub upload_id: i64,
    pub stored_filename: String,
    pub stored_path: PathBuf,
    pub results: Vec<SuspiciousIp>,
}

/// Everything a store-backed front end needs, built once at startup
pub struct AppContext {
    config: Config,
    scanner: LogScanner,
    locator: IpLocator,
    store: Arc<dyn UploadStore>,
}

impl AppContext {
    /// Build the context with a SQLite store at `storage.database_path`
    pub fn new(config: Config) -> Result<Self, AppError> {
        let store = SqliteUploadStore::new(&config.storage.database_path)?;
        Self::with_store(config, Arc::new(store))
    }

    /// Build the context around an existing store
    pub fn with_store(config: Config, store: Arc<dyn UploadStore>) -> Result<Self, AppError> {
        config.validate()?;
        let scanner = LogScanner::new(&config.scanner)?;
        let locator = IpLocator::from_config(&config.geolocation)?;

        Ok(AppContext {
            config,
            scanner,
            locator,
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Threshold used when the caller does not give one
    pub fn default_threshold(&self) -> i64 {
        self.config.detection.threshold
    }

    /// Run the pipeline against a file without storing anything
    pub async fn analyze_path<P: AsRef<Path>>(
        &self,
        path: P,
        threshold: i64,
    ) -> Result<Vec<SuspiciousIp>, AppError> {
        Ok(analyze_path(&self.scanner, &self.locator, path, threshold).await?)
    }

    /// Save an uploaded log, analyze it and record the results
    ///
    /// The copy is stored as `{YYYYmmddHHMMSS}_{name}` under the upload
    /// directory. A name already taken within the same second gets a
    /// counter, `{YYYYmmddHHMMSS}_{n}_{name}`; existing files are never
    /// overwritten.
    pub async fn ingest_upload<R: Read>(
        &self,
        original_name: &str,
        mut reader: R,
        threshold: i64,
    ) -> Result<UploadOutcome, AppError> {
        let name = Self::sanitize_name(original_name)?;
        let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();

        fs::create_dir_all(&self.config.storage.upload_dir)?;
        let (stored_filename, stored_path, mut file) = self.create_unique(&stamp, name)?;
        let bytes = io::copy(&mut reader, &mut file)?;
        drop(file);
        log::info!("Saved upload {:?} ({} bytes)", stored_path, bytes);

        let results = self.analyze_path(&stored_path, threshold).await?;
        let upload_id = store_results(self.store.as_ref(), &stored_filename, &results)?;

        Ok(UploadOutcome {
            upload_id,
            stored_filename,
            stored_path,
            results,
        })
    }

    /// Past uploads with their IPs, newest first
    pub fn history(&self) -> Result<Vec<UploadRecord>, AppError> {
        Ok(self.store.list_uploads()?)
    }

    /// One past upload with its IPs
    pub fn upload_detail(&self, upload_id: i64) -> Result<UploadRecord, AppError> {
        self.store
            .get_upload(upload_id)?
            .ok_or(AppError::UploadNotFound(upload_id))
    }

    fn create_unique(&self, stamp: &str, name: &str) -> Result<(String, PathBuf, File), AppError> {
        let mut attempt = 0u32;
        loop {
            let filename = match attempt {
                0 => format!("{}_{}", stamp, name),
                n => format!("{}_{}_{}", stamp, n, name),
            };
            let path = self.config.storage.upload_dir.join(&filename);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((filename, path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    log::debug!("{:?} already exists, trying next suffix", path);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn sanitize_name(original_name: &str) -> Result<&str, AppError> {
        // Clients may send a full path; only the final component is kept
        let name = original_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();

        if name.is_empty() || name == "." || name == ".." {
            return Err(AppError::InvalidUpload(format!(
                "no usable file name in '{}'",
                original_name
            )));
        }
        Ok(name)
    }
}
