use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single failed-login match; `line_number` stands in for the timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub line_number: usize,
    pub ip_address: String,
}

/// An IP that met the threshold, enriched with its location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousIp {
    #[serde(rename = "IP Address")]
    pub ip: String,
    #[serde(rename = "Failed Attempts")]
    pub count: u64,
    #[serde(rename = "Location")]
    pub location: String,
}

impl SuspiciousIp {
    pub fn new(ip: impl Into<String>, count: u64, location: impl Into<String>) -> Self {
        SuspiciousIp {
            ip: ip.into(),
            count,
            location: location.into(),
        }
    }
}

/// A stored upload together with the suspicious IPs found in it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: i64,
    pub filename: String,
    pub upload_time: DateTime<Utc>,
    pub ips: Vec<SuspiciousIp>,
}
