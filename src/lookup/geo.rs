use maxminddb::{Reader, geoip2};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::lookup::{Locator, sanitize_display};

/// File name of the GeoLite2 city database
pub const CITY_DB_FILE: &str = "GeoLite2-City.mmdb";
/// File name of the GeoLite2 ASN database
pub const ASN_DB_FILE: &str = "GeoLite2-ASN.mmdb";

/// Cached lookup results for one address
#[derive(Debug, Clone, Default)]
struct CacheEntry {
    location: String,
    registration: String,
}

/// Location lookup backed by MaxMind GeoLite2 databases
///
/// Either database may be missing; lookups against a missing database
/// contribute nothing to the result. Results are cached for the lifetime of
/// the locator since the databases never change underneath it.
pub struct GeoLocator {
    city: Option<Reader<Vec<u8>>>,
    asn: Option<Reader<Vec<u8>>>,
    cache: RwLock<HashMap<IpAddr, CacheEntry>>,
}

impl GeoLocator {
    pub fn new(city: Option<Reader<Vec<u8>>>, asn: Option<Reader<Vec<u8>>>) -> Self {
        Self {
            city,
            asn,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Open whichever database paths are given
    pub fn open(city: Option<&Path>, asn: Option<&Path>) -> Result<Self, maxminddb::MaxMindDBError> {
        let city = city.map(Reader::open_readfile).transpose()?;
        let asn = asn.map(Reader::open_readfile).transpose()?;
        Ok(Self::new(city, asn))
    }

    /// True when neither database is loaded
    pub fn is_empty(&self) -> bool {
        self.city.is_none() && self.asn.is_none()
    }

    fn cached(&self, ip: IpAddr) -> CacheEntry {
        if let Some(entry) = self.cache.read().get(&ip) {
            return entry.clone();
        }

        let entry = CacheEntry {
            location: self.lookup_location(ip),
            registration: self.lookup_registration(ip),
        };
        self.cache.write().insert(ip, entry.clone());
        entry
    }

    fn lookup_location(&self, ip: IpAddr) -> String {
        let (country, city) = match &self.city {
            Some(reader) => match reader.lookup::<geoip2::City>(ip) {
                Ok(record) => (
                    record
                        .country
                        .as_ref()
                        .and_then(|c| c.names.as_ref())
                        .and_then(|n| n.get("en"))
                        .map(|s| s.to_string()),
                    record
                        .city
                        .as_ref()
                        .and_then(|c| c.names.as_ref())
                        .and_then(|n| n.get("en"))
                        .map(|s| s.to_string()),
                ),
                Err(_) => (None, None),
            },
            None => (None, None),
        };

        let asn = self
            .asn
            .as_ref()
            .and_then(|reader| reader.lookup::<geoip2::Asn>(ip).ok())
            .and_then(|record| {
                let number = record.autonomous_system_number?;
                let org = record.autonomous_system_organization.unwrap_or_default();
                Some((org.to_string(), number))
            });

        format_location(country.as_deref(), city.as_deref(), asn)
    }

    fn lookup_registration(&self, ip: IpAddr) -> String {
        let Some(reader) = &self.city else {
            return String::new();
        };
        reader
            .lookup::<geoip2::City>(ip)
            .ok()
            .and_then(|record| record.registered_country)
            .and_then(|country| {
                country
                    .names
                    .as_ref()
                    .and_then(|n| n.get("en"))
                    .map(|s| s.to_string())
                    .or_else(|| country.iso_code.map(|s| s.to_string()))
            })
            .map(|s| sanitize_display(&s))
            .unwrap_or_default()
    }
}

impl Locator for GeoLocator {
    fn locate(&self, ip: IpAddr) -> String {
        self.cached(ip).location
    }

    fn registration(&self, ip: IpAddr) -> String {
        self.cached(ip).registration
    }
}

impl std::fmt::Debug for GeoLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoLocator")
            .field("city", &self.city.is_some())
            .field("asn", &self.asn.is_some())
            .field("cached", &self.cache.read().len())
            .finish()
    }
}

/// Build `"<country> <city> <org>(AS<n>)"`, dropping whatever is unknown.
///
/// The city is omitted when it repeats the country name (city-states).
pub fn format_location(country: Option<&str>, city: Option<&str>, asn: Option<(String, u32)>) -> String {
    let country = country.map(str::trim).filter(|s| !s.is_empty());
    let city = city.map(str::trim).filter(|s| !s.is_empty());

    let place = match (country, city) {
        (Some(country), Some(city)) if country == city => city.to_string(),
        (Some(country), Some(city)) => format!("{} {}", country, city),
        (Some(country), None) => country.to_string(),
        (None, Some(city)) => city.to_string(),
        (None, None) => String::new(),
    };
    let asn = asn
        .map(|(org, number)| format!("{}(AS{})", org.trim(), number))
        .unwrap_or_default();

    let text = match (place.is_empty(), asn.is_empty()) {
        (true, _) => asn,
        (false, true) => place,
        (false, false) => format!("{} {}", place, asn),
    };
    sanitize_display(&text)
}

/// Search the usual locations for a database file
pub fn find_database(file_name: &str) -> Option<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));

    let candidates = [
        exe_dir.map(|d| d.join(file_name)),
        dirs::data_dir().map(|d| d.join("hopwatch").join(file_name)),
        dirs::config_dir().map(|d| d.join("hopwatch").join(file_name)),
        Some(PathBuf::from(file_name)),
        Some(PathBuf::from("/usr/share/GeoIP").join(file_name)),
        Some(PathBuf::from("/var/lib/GeoIP").join(file_name)),
    ];

    candidates.into_iter().flatten().find(|path| path.exists())
}
