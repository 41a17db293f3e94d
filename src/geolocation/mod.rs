//! IP geolocation for flagged addresses
//!
//! Two backends resolve an IP to a `"City, Country"` string: an HTTP JSON
//! endpoint (ipinfo.io style) and a local MaxMind GeoLite2-City database.
//! Lookups are best-effort. Every failure degrades to [`UNKNOWN_LOCATION`]
//! inside [`IpLocator::resolve`] and never reaches the caller.

pub mod maxmind;

pub use maxmind::{CityInfo, GeoIpService};

use crate::config::{GeoBackend, GeoConfig};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Location reported when a lookup fails or yields nothing usable
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Errors that can occur during geolocation lookups
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to open database: {0}")]
    DatabaseOpen(#[from] maxminddb::MaxMindDBError),

    #[error("Database file not found: {0}")]
    FileNotFound(String),

    #[error("IP address not found in database")]
    NotFound,

    #[error("Location data missing for IP address")]
    NoLocation,

    #[error("Not a valid IP address: {0}")]
    InvalidIp(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Geolocation service returned {0}")]
    Status(StatusCode),

    #[error("Geolocation backend misconfigured: {0}")]
    Config(String),
}

/// Shape of the HTTP service response; every field is optional
#[derive(Debug, Deserialize)]
struct LocationResponse {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

/// Combine city and country into a display string
///
/// Both present gives `"City, Country"`, country alone gives the country,
/// anything else gives `None`. Blank strings count as absent.
pub fn format_location(city: Option<&str>, country: Option<&str>) -> Option<String> {
    let city = city.map(str::trim).filter(|s| !s.is_empty());
    let country = country.map(str::trim).filter(|s| !s.is_empty());

    match (city, country) {
        (Some(city), Some(country)) => Some(format!("{}, {}", city, country)),
        (None, Some(country)) => Some(country.to_string()),
        _ => None,
    }
}

/// Lookup client for an HTTP geolocation endpoint
pub struct HttpLocator {
    endpoint: String,
    client: Client,
}

impl HttpLocator {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, GeoError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpLocator {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Query `{endpoint}/{ip}/json` once
    pub async fn lookup(&self, ip: &str) -> Result<String, GeoError> {
        let url = format!("{}/{}/json", self.endpoint, ip);
        log::debug!("Querying geolocation service: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Status(status));
        }

        let body: LocationResponse = response.json().await?;
        format_location(body.city.as_deref(), body.country.as_deref()).ok_or(GeoError::NoLocation)
    }
}

enum Backend {
    Http(HttpLocator),
    MaxMind(GeoIpService),
}

/// Best-effort IP -> location resolver with an optional per-run cache
pub struct IpLocator {
    backend: Backend,
    cache: Option<Mutex<HashMap<String, String>>>,
}

impl IpLocator {
    /// Build the resolver described by the configuration
    pub fn from_config(config: &GeoConfig) -> Result<Self, GeoError> {
        let backend = match config.backend {
            GeoBackend::Http => Backend::Http(HttpLocator::new(
                &config.endpoint,
                Duration::from_millis(config.timeout_ms),
            )?),
            GeoBackend::Maxmind => {
                let path = config.database_path.as_ref().ok_or_else(|| {
                    GeoError::Config("maxmind backend needs database_path".to_string())
                })?;
                Backend::MaxMind(GeoIpService::new(path)?)
            }
        };

        Ok(IpLocator {
            backend,
            cache: config.cache_lookups.then(|| Mutex::new(HashMap::new())),
        })
    }

    /// HTTP resolver without caching
    pub fn http(endpoint: &str, timeout: Duration) -> Result<Self, GeoError> {
        Ok(IpLocator {
            backend: Backend::Http(HttpLocator::new(endpoint, timeout)?),
            cache: None,
        })
    }

    /// Remember results for the rest of the run
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(Mutex::new(HashMap::new()));
        self
    }

    /// Resolve an IP to a location string
    ///
    /// Never fails: any lookup error yields [`UNKNOWN_LOCATION`].
    pub async fn resolve(&self, ip: &str) -> String {
        if let Some(hit) = self.cached(ip) {
            log::debug!("Geolocation cache hit for {}", ip);
            return hit;
        }

        let location = match self.lookup(ip).await {
            Ok(location) => location,
            Err(e) => {
                log::warn!("Geolocation lookup failed for {}: {}", ip, e);
                UNKNOWN_LOCATION.to_string()
            }
        };

        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.insert(ip.to_string(), location.clone());
            }
        }
        location
    }

    async fn lookup(&self, ip: &str) -> Result<String, GeoError> {
        match &self.backend {
            Backend::Http(http) => http.lookup(ip).await,
            Backend::MaxMind(service) => {
                let addr = ip.parse().map_err(|_| GeoError::InvalidIp(ip.to_string()))?;
                let info = service.lookup_city_info(&addr)?;
                format_location(info.city_name.as_deref(), info.country_name.as_deref())
                    .ok_or(GeoError::NoLocation)
            }
        }
    }

    fn cached(&self, ip: &str) -> Option<String> {
        let cache = self.cache.as_ref()?.lock().ok()?;
        cache.get(ip).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn http_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        )
    }

    /// Serve the same canned response to every connection; returns base URL and hit counter
    async fn canned_server(response: String) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    fn locator(endpoint: &str) -> IpLocator {
        IpLocator::http(endpoint, Duration::from_secs(3)).unwrap()
    }

    #[test]
    fn test_format_location() {
        assert_eq!(format_location(Some("Berlin"), Some("DE")), Some("Berlin, DE".to_string()));
        assert_eq!(format_location(None, Some("DE")), Some("DE".to_string()));
        assert_eq!(format_location(Some(""), Some("DE")), Some("DE".to_string()));
        assert_eq!(format_location(Some("Berlin"), None), None);
        assert_eq!(format_location(None, None), None);
        assert_eq!(format_location(Some("  "), Some(" ")), None);
    }

    #[tokio::test]
    async fn test_city_and_country() {
        let body = r#"{"ip":"8.8.8.8","city":"Mountain View","region":"California","country":"US"}"#;
        let (url, _) = canned_server(http_response("200 OK", body)).await;
        assert_eq!(locator(&url).resolve("8.8.8.8").await, "Mountain View, US");
    }

    #[tokio::test]
    async fn test_country_only() {
        let (url, _) = canned_server(http_response("200 OK", r#"{"country":"NL"}"#)).await;
        assert_eq!(locator(&url).resolve("1.2.3.4").await, "NL");
    }

    #[tokio::test]
    async fn test_no_fields_is_unknown() {
        let (url, _) = canned_server(http_response("200 OK", r#"{"ip":"10.0.0.1","bogon":true}"#)).await;
        assert_eq!(locator(&url).resolve("10.0.0.1").await, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn test_server_error_is_unknown() {
        let (url, _) = canned_server(http_response("500 Internal Server Error", "{}")).await;
        assert_eq!(locator(&url).resolve("8.8.8.8").await, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn test_malformed_body_is_unknown() {
        let (url, _) = canned_server(http_response("200 OK", "<html>rate limited</html>")).await;
        assert_eq!(locator(&url).resolve("8.8.8.8").await, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn test_connection_refused_is_unknown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}", addr);
        assert_eq!(locator(&url).resolve("8.8.8.8").await, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn test_timeout_is_unknown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                // Hold the connection open without answering
                tokio::time::sleep(Duration::from_secs(5)).await;
                drop(socket);
            }
        });

        let locator = IpLocator::http(&format!("http://{}", addr), Duration::from_millis(200)).unwrap();
        assert_eq!(locator.resolve("8.8.8.8").await, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn test_cache_avoids_repeat_lookups() {
        let (url, hits) = canned_server(http_response("200 OK", r#"{"city":"Paris","country":"FR"}"#)).await;
        let locator = locator(&url).with_cache();

        assert_eq!(locator.resolve("5.5.5.5").await, "Paris, FR");
        assert_eq!(locator.resolve("5.5.5.5").await, "Paris, FR");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        locator.resolve("6.6.6.6").await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_without_cache_each_call_looks_up() {
        let (url, hits) = canned_server(http_response("200 OK", r#"{"country":"FR"}"#)).await;
        let locator = locator(&url);

        locator.resolve("5.5.5.5").await;
        locator.resolve("5.5.5.5").await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_cached_too() {
        let (url, hits) = canned_server(http_response("503 Service Unavailable", "")).await;
        let locator = locator(&url).with_cache();

        assert_eq!(locator.resolve("7.7.7.7").await, UNKNOWN_LOCATION);
        assert_eq!(locator.resolve("7.7.7.7").await, UNKNOWN_LOCATION);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_config_maxmind_missing_file() {
        let config = GeoConfig {
            backend: GeoBackend::Maxmind,
            database_path: Some("nonexistent.mmdb".into()),
            ..GeoConfig::default()
        };
        assert!(matches!(IpLocator::from_config(&config), Err(GeoError::FileNotFound(_))));
    }

    #[test]
    fn test_from_config_http() {
        let locator = IpLocator::from_config(&GeoConfig::default()).unwrap();
        assert!(locator.cache.is_some());
    }
}
