//! Report sinks for flagged IPs: console text, CSV and JSON files
//!
//! Store-backed reporting goes through [`store_results`].

use crate::models::SuspiciousIp;
use crate::persistence::{PersistenceError, UploadStore};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub mod csv;

pub use self::csv::{read_csv, write_csv};

pub const CSV_HEADERS: [&str; 3] = ["IP Address", "Failed Attempts", "Location"];

/// Errors that can occur while writing or reading reports
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed CSV at line {line}: {reason}")]
    Csv { line: usize, reason: String },
}

/// Where a report goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Console,
    Csv,
    Json,
}

/// Parses the file formats a caller can ask for; console is the default
/// when no format is given and has no name of its own
impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}' (expected csv or json)", other)),
        }
    }
}

/// Console listing, one line per IP under a threshold header
pub fn render_console(results: &[SuspiciousIp], threshold: i64) -> String {
    let mut out = format!(
        "Suspicious IPs with at least {} failed login attempts:\n",
        threshold
    );
    if results.is_empty() {
        out.push_str("No suspicious IPs found.\n");
    }
    for entry in results {
        out.push_str(&format!(
            "{} had {} failed attempts (Location: {})\n",
            entry.ip, entry.count, entry.location
        ));
    }
    out
}

/// Write the console listing to `out` and flush it
pub fn print_console(
    out: &mut dyn Write,
    results: &[SuspiciousIp],
    threshold: i64,
) -> io::Result<()> {
    out.write_all(render_console(results, threshold).as_bytes())?;
    out.flush()
}

/// Aligned table for the upload results and history views
pub fn render_table(results: &[SuspiciousIp]) -> String {
    let counts: Vec<String> = results.iter().map(|r| r.count.to_string()).collect();
    let ip_width = results
        .iter()
        .map(|r| r.ip.len())
        .chain(std::iter::once(CSV_HEADERS[0].len()))
        .max()
        .unwrap_or(0);
    let count_width = counts
        .iter()
        .map(String::len)
        .chain(std::iter::once(CSV_HEADERS[1].len()))
        .max()
        .unwrap_or(0);

    let mut out = format!(
        "{:<ip_w$} | {:>count_w$} | {}\n",
        CSV_HEADERS[0],
        CSV_HEADERS[1],
        CSV_HEADERS[2],
        ip_w = ip_width,
        count_w = count_width
    );
    out.push_str(&format!(
        "{}-+-{}-+-{}\n",
        "-".repeat(ip_width),
        "-".repeat(count_width),
        "-".repeat(CSV_HEADERS[2].len())
    ));
    for (entry, count) in results.iter().zip(&counts) {
        out.push_str(&format!(
            "{:<ip_w$} | {:>count_w$} | {}\n",
            entry.ip,
            count,
            entry.location,
            ip_w = ip_width,
            count_w = count_width
        ));
    }
    out
}

/// Write results as a pretty-printed JSON array, replacing any existing file
pub fn write_json<P: AsRef<Path>>(path: P, results: &[SuspiciousIp]) -> Result<(), ReportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, results)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read back a file produced by [`write_json`]
pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Vec<SuspiciousIp>, ReportError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Persist results under a new upload record and return its id
pub fn store_results(
    store: &dyn UploadStore,
    filename: &str,
    results: &[SuspiciousIp],
) -> Result<i64, PersistenceError> {
    let upload_id = store.save_upload(filename, results)?;
    log::info!(
        "Stored {} suspicious IP(s) for upload {} ({})",
        results.len(),
        upload_id,
        filename
    );
    Ok(upload_id)
}

/// A single-sink report
#[derive(Debug, Clone)]
pub struct Report {
    pub format: OutputFormat,
    pub csv_path: PathBuf,
    pub json_path: PathBuf,
}

impl Report {
    pub fn new(format: OutputFormat) -> Self {
        Report {
            format,
            csv_path: PathBuf::from("suspicious_ips.csv"),
            json_path: PathBuf::from("suspicious_ips.json"),
        }
    }

    pub fn with_paths(format: OutputFormat, csv_path: PathBuf, json_path: PathBuf) -> Self {
        Report {
            format,
            csv_path,
            json_path,
        }
    }

    /// Emit to the selected sink; console output goes to `out`
    ///
    /// Returns the file written, if any.
    pub fn emit(
        &self,
        results: &[SuspiciousIp],
        threshold: i64,
        out: &mut dyn Write,
    ) -> Result<Option<PathBuf>, ReportError> {
        match self.format {
            OutputFormat::Console => {
                print_console(out, results, threshold)?;
                Ok(None)
            }
            OutputFormat::Csv => {
                write_csv(&self.csv_path, results)?;
                log::info!("Wrote {} row(s) to {:?}", results.len(), self.csv_path);
                Ok(Some(self.csv_path.clone()))
            }
            OutputFormat::Json => {
                write_json(&self.json_path, results)?;
                log::info!("Wrote {} record(s) to {:?}", results.len(), self.json_path);
                Ok(Some(self.json_path.clone()))
            }
        }
    }
}
