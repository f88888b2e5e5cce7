//! # Geo Resolver
//!
//! Resolves client addresses to a [`GeoLocation`]. Resolution is total:
//! every failure degrades to a sentinel.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wafpulse_core::GeoLocation;

/// City-level record returned by a lookup table
#[derive(Debug, Clone, PartialEq)]
pub struct CityRecord {
    pub country_iso: String,
    /// English city name
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Read-only IP-to-location table; must tolerate concurrent lookups
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, address: IpAddr) -> Result<CityRecord, GeoError>;
}

/// Geo lookup error
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("Failed to open GeoIP database: {0}")]
    Open(String),

    #[error("Address not found: {0}")]
    NotFound(IpAddr),

    #[error("Lookup error: {0}")]
    Lookup(String),
}

/// MaxMind GeoLite2/GeoIP2 City database
pub struct MaxMindLookup {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindLookup {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GeoError> {
        let reader = maxminddb::Reader::open_readfile(path)
            .map_err(|e| GeoError::Open(e.to_string()))?;
        Ok(Self { reader })
    }
}

impl GeoLookup for MaxMindLookup {
    fn lookup(&self, address: IpAddr) -> Result<CityRecord, GeoError> {
        let record: maxminddb::geoip2::City = self.reader.lookup(address).map_err(|e| match e {
            maxminddb::MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound(address),
            other => GeoError::Lookup(other.to_string()),
        })?;

        let country_iso = record
            .country
            .as_ref()
            .and_then(|c| c.iso_code)
            .unwrap_or_default()
            .to_string();
        let city = record
            .city
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|names| names.get("en").copied())
            .unwrap_or_default()
            .to_string();
        let (latitude, longitude) = record
            .location
            .as_ref()
            .map(|l| (l.latitude.unwrap_or_default(), l.longitude.unwrap_or_default()))
            .unwrap_or_default();

        Ok(CityRecord {
            country_iso,
            city,
            latitude,
            longitude,
        })
    }
}

/// Geo resolver over an optional lookup table
#[derive(Clone, Default)]
pub struct GeoResolver {
    lookup: Option<Arc<dyn GeoLookup>>,
}

impl GeoResolver {
    pub fn new(lookup: Arc<dyn GeoLookup>) -> Self {
        Self { lookup: Some(lookup) }
    }

    /// Resolver without a lookup table; public addresses resolve to `Unknown`
    pub fn disabled() -> Self {
        Self { lookup: None }
    }

    /// Open a MaxMind database, disabling enrichment if it cannot be opened
    pub fn open<P: AsRef<Path>>(path: Option<P>) -> Self {
        let Some(path) = path else {
            info!("No GeoIP database configured, geographic enrichment disabled");
            return Self::disabled();
        };

        match MaxMindLookup::open(path.as_ref()) {
            Ok(lookup) => {
                info!(path = %path.as_ref().display(), "GeoIP database loaded");
                Self::new(Arc::new(lookup))
            }
            Err(e) => {
                warn!(path = %path.as_ref().display(), error = %e, "Geographic enrichment disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.lookup.is_some()
    }

    /// Resolve a textual client address
    pub fn resolve(&self, address: &str) -> GeoLocation {
        let ip: IpAddr = match address.trim().parse() {
            Ok(ip) => ip,
            Err(_) => {
                debug!(address, "Invalid IP address format");
                return GeoLocation::Unknown;
            }
        };

        if is_non_routable(&ip) {
            debug!(address, "Address is private, loopback or link-local");
            return GeoLocation::Private;
        }

        let Some(lookup) = &self.lookup else {
            debug!(address, "GeoIP database not available");
            return GeoLocation::Unknown;
        };

        match lookup.lookup(ip) {
            Ok(record) => {
                debug!(address, country = %record.country_iso, city = %record.city, "GeoIP lookup succeeded");
                GeoLocation::Resolved {
                    country: record.country_iso,
                    city: record.city,
                    latitude: record.latitude,
                    longitude: record.longitude,
                }
            }
            Err(e) => {
                debug!(address, error = %e, "GeoIP lookup failed");
                GeoLocation::Unknown
            }
        }
    }
}

/// Private, loopback or link-local unicast
pub fn is_non_routable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_non_routable_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_non_routable_v4(&v4),
            None => is_non_routable_v6(v6),
        },
    }
}

fn is_non_routable_v4(ip: &Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback() || ip.is_link_local()
}

fn is_non_routable_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link-local
    ip.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}
