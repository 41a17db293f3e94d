pub mod log_scanner;

pub use log_scanner::{LogScanner, ScanError};
