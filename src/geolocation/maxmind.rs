//! Offline lookups against a MaxMind GeoLite2-City database
//!
//! Users must download the database file separately from MaxMind
//! (free with registration).

use super::GeoError;
use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// GeoIP lookup service using MaxMind GeoLite2-City database
///
/// # Example
///
/// ```ignore
/// use failscan::geolocation::GeoIpService;
///
/// let service = GeoIpService::new("GeoLite2-City.mmdb")?;
/// let info = service.lookup_city_info(&"8.8.8.8".parse()?)?;
/// println!("{:?}, {:?}", info.city_name, info.country_name);
/// ```
#[derive(Clone)]
pub struct GeoIpService {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoIpService {
    /// Open a GeoLite2-City.mmdb database file
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, GeoError> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(GeoError::FileNotFound(path.display().to_string()));
        }

        let reader = Reader::open_readfile(path)?;
        log::info!("Loaded GeoIP database: {:?}", path);
        Ok(GeoIpService {
            reader: Arc::new(reader),
        })
    }

    /// Get city and country names for an IP address
    pub fn lookup_city_info(&self, ip: &IpAddr) -> Result<CityInfo, GeoError> {
        let city: geoip2::City = self.reader.lookup(*ip).map_err(|e| match e {
            maxminddb::MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound,
            other => GeoError::DatabaseOpen(other),
        })?;

        Ok(CityInfo {
            city_name: city
                .city
                .and_then(|c| c.names)
                .and_then(|n| n.get("en").copied())
                .map(String::from),
            country_name: city
                .country
                .and_then(|c| c.names)
                .and_then(|n| n.get("en").copied())
                .map(String::from),
        })
    }
}

/// City information from the GeoIP database
#[derive(Debug, Clone)]
pub struct CityInfo {
    /// City name in English
    pub city_name: Option<String>,
    /// Country name in English
    pub country_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Lookups need a GeoLite2-City.mmdb file; tests using it are skipped
    // when none is present.
    fn get_test_service() -> Option<GeoIpService> {
        let paths = [
            "GeoLite2-City.mmdb",
            "../GeoLite2-City.mmdb",
            "assets/GeoLite2-City.mmdb",
        ];
        paths.iter().find_map(|path| GeoIpService::new(path).ok())
    }

    #[test]
    fn test_file_not_found() {
        let result = GeoIpService::new("nonexistent.mmdb");
        assert!(matches!(result, Err(GeoError::FileNotFound(_))));
    }

    #[test]
    fn test_private_ip_not_found() {
        if let Some(service) = get_test_service() {
            let private_ip: IpAddr = "192.168.1.1".parse().unwrap();
            assert!(matches!(service.lookup_city_info(&private_ip), Err(GeoError::NotFound)));
        }
    }

    #[test]
    fn test_public_ip_has_country() {
        if let Some(service) = get_test_service() {
            let google_dns: IpAddr = "8.8.8.8".parse().unwrap();
            if let Ok(info) = service.lookup_city_info(&google_dns) {
                assert!(info.country_name.is_some());
            }
        }
    }
}
