use crate::config::ScannerConfig;
use crate::detection::AttemptCounts;
use crate::models::LogEvent;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while scanning a log source
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to read log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read log stream: {0}")]
    Stream(#[from] std::io::Error),

    #[error("Invalid IP label pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Scan a log source and count failed logins per source IP
pub struct LogScanner {
    marker: String,
    ip_pattern: Regex,
    strict_octets: bool,
}

impl LogScanner {
    /// Create a scanner for the given marker and label
    pub fn new(config: &ScannerConfig) -> Result<Self, ScanError> {
        // [0-9] rather than \d: the latter also matches non-ASCII digits
        let ip_pattern = Regex::new(&format!(
            r"{}\s*([0-9]+\.[0-9]+\.[0-9]+\.[0-9]+)",
            regex::escape(&config.ip_label)
        ))?;

        Ok(LogScanner {
            marker: config.marker.clone(),
            ip_pattern,
            strict_octets: config.strict_octets,
        })
    }

    /// Scan a log file on disk
    pub fn scan_path<P: AsRef<Path>>(&self, path: P) -> Result<AttemptCounts, ScanError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!("Scanning log file: {:?}", path);
        self.scan_reader(BufReader::new(file)).map_err(|e| match e {
            ScanError::Stream(source) => ScanError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Scan any line-oriented source
    pub fn scan_reader<R: BufRead>(&self, mut reader: R) -> Result<AttemptCounts, ScanError> {
        let mut counts = AttemptCounts::new();
        let mut buf = Vec::new();
        let mut line_number = 0usize;
        let mut skipped = 0usize;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break; // EOF
            }

            // Noisy logs may carry invalid UTF-8; treat it lossily
            let chunk = String::from_utf8_lossy(&buf);
            for line in Self::split_lines(&chunk) {
                line_number += 1;
                if !line.contains(self.marker.as_str()) {
                    continue;
                }

                match self.extract_event(line, line_number) {
                    Some(event) => counts.record(&event.ip_address),
                    None => {
                        skipped += 1;
                        log::debug!("Line {}: failed login without a usable IP", line_number);
                    }
                }
            }
        }

        log::info!(
            "Scanned {} line(s): {} failed login(s) from {} IP(s), {} malformed",
            line_number,
            counts.total(),
            counts.len(),
            skipped
        );
        Ok(counts)
    }

    /// Split a chunk read up to `\n` into lines
    ///
    /// `\n`, `\r\n` and a bare `\r` each end a line.
    fn split_lines(chunk: &str) -> impl Iterator<Item = &str> {
        let body = chunk.strip_suffix('\n').unwrap_or(chunk);
        let body = body.strip_suffix('\r').unwrap_or(body);
        body.split('\r')
    }

    /// Parse a single line into a failed-login event
    ///
    /// Returns `None` when the marker is missing or no IP follows the label.
    pub fn parse_line(&self, line: &str) -> Option<LogEvent> {
        if !line.contains(self.marker.as_str()) {
            return None;
        }
        self.extract_event(line, 0)
    }

    fn extract_event(&self, line: &str, line_number: usize) -> Option<LogEvent> {
        let ip = self.ip_pattern.captures(line)?.get(1)?.as_str();
        if self.strict_octets && !Self::valid_octets(ip) {
            return None;
        }

        Some(LogEvent {
            line_number,
            ip_address: ip.to_string(),
        })
    }

    fn valid_octets(ip: &str) -> bool {
        ip.split('.').all(|octet| octet.parse::<u8>().is_ok())
    }
}
