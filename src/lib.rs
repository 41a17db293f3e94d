pub mod app;
pub mod config;
pub mod detection;
pub mod input;
pub mod models;
pub mod output;
pub mod geolocation;
pub mod persistence;

// Re-export commonly used types
pub use app::{AppContext, AppError, UploadOutcome};
pub use config::Config;
pub use models::{LogEvent, SuspiciousIp, UploadRecord};
pub use detection::{filter, AttemptCounts};
pub use input::{LogScanner, ScanError};
pub use geolocation::{IpLocator, UNKNOWN_LOCATION};
pub use output::{OutputFormat, Report};
pub use persistence::{UploadStore, SqliteUploadStore};
