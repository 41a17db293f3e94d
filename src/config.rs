use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the failed-login scanner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log line matching configuration
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Threshold configuration
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Geolocation lookup configuration
    #[serde(default)]
    pub geolocation: GeoConfig,
    /// Export file configuration
    #[serde(default)]
    pub output: OutputConfig,
    /// Upload storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Log line matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Case-sensitive substring marking a failed login line
    pub marker: String,
    /// Literal label preceding the source IP
    pub ip_label: String,
    /// Reject dotted quads with an octet above 255
    pub strict_octets: bool,
}

/// Threshold configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum failed attempts for an IP to be flagged
    pub threshold: i64,
}

/// Which backend resolves IP locations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoBackend {
    /// HTTP JSON endpoint (ipinfo.io style)
    Http,
    /// Local MaxMind GeoLite2-City database
    Maxmind,
}

/// Geolocation lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub backend: GeoBackend,
    /// Base URL; lookups go to `{endpoint}/{ip}/json`
    pub endpoint: String,
    /// Per-lookup timeout in milliseconds
    pub timeout_ms: u64,
    /// Path to the GeoLite2-City.mmdb file (maxmind backend only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Resolve each distinct IP at most once per run
    pub cache_lookups: bool,
}

/// Export file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub csv_path: PathBuf,
    pub json_path: PathBuf,
}

/// Upload storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Directory receiving copies of uploaded log files
    pub upload_dir: PathBuf,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            marker: "LOGIN FAILED".to_string(),
            ip_label: "IP:".to_string(),
            strict_octets: false,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig { threshold: 3 }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        GeoConfig {
            backend: GeoBackend::Http,
            endpoint: "https://ipinfo.io".to_string(),
            timeout_ms: 3000,
            database_path: None,
            cache_lookups: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            csv_path: PathBuf::from("suspicious_ips.csv"),
            json_path: PathBuf::from("suspicious_ips.json"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            database_path: PathBuf::from("failscan.db"),
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scanner: ScannerConfig::default(),
            detection: DetectionConfig::default(),
            geolocation: GeoConfig::default(),
            output: OutputConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check values that the type system cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scanner.marker.is_empty() {
            return Err(ConfigError::Invalid("scanner.marker must not be empty".into()));
        }
        if self.scanner.ip_label.is_empty() {
            return Err(ConfigError::Invalid("scanner.ip_label must not be empty".into()));
        }
        if self.detection.threshold < 0 {
            return Err(ConfigError::Invalid(format!(
                "detection.threshold must be non-negative, got {}",
                self.detection.threshold
            )));
        }
        if self.geolocation.timeout_ms == 0 {
            return Err(ConfigError::Invalid("geolocation.timeout_ms must be positive".into()));
        }
        if self.geolocation.backend == GeoBackend::Maxmind
            && self.geolocation.database_path.is_none()
        {
            return Err(ConfigError::Invalid(
                "geolocation.database_path is required for the maxmind backend".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detection.threshold, 3);
        assert_eq!(config.geolocation.timeout_ms, 3000);
        assert_eq!(config.output.csv_path, PathBuf::from("suspicious_ips.csv"));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.detection.threshold = 7;
        config.geolocation.cache_lookups = false;
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.detection.threshold, 7);
        assert!(!loaded.geolocation.cache_lookups);
        assert_eq!(loaded.scanner.marker, "LOGIN FAILED");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detection]\nthreshold = 5\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.detection.threshold, 5);
        assert_eq!(config.geolocation.endpoint, "https://ipinfo.io");
        assert_eq!(config.storage.upload_dir, PathBuf::from("uploads"));
    }

    #[test]
    fn test_partial_table_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[geolocation]\ntimeout_ms = 1500\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.geolocation.timeout_ms, 1500);
        assert_eq!(config.geolocation.backend, GeoBackend::Http);
        assert!(config.geolocation.cache_lookups);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut config = Config::default();
        config.detection.threshold = -1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_maxmind_requires_database() {
        let mut config = Config::default();
        config.geolocation.backend = GeoBackend::Maxmind;
        assert!(config.validate().is_err());

        config.geolocation.database_path = Some(PathBuf::from("GeoLite2-City.mmdb"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("does-not-exist.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
