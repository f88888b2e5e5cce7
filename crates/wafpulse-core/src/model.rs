//! Security event data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One WAF transaction as reported by the upstream filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Transaction identifier, may repeat across upstream retries
    pub transaction_id: String,

    /// Client address in textual IPv4/IPv6 form
    pub client_ip: String,

    /// Anomaly score assigned by the originating filter
    pub anomaly_score: u32,

    /// Raw transaction timestamp, resolved lazily
    pub timestamp: String,

    pub request: HttpRequest,

    /// HTTP status code returned to the client
    pub response_code: u16,

    /// Rules that matched this transaction
    pub matched_rules: Vec<RuleMatch>,
}

/// Request line and headers of a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    pub headers: HashMap<String, String>,
}

/// A matched rule with its human-readable message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_id: String,
    pub message: String,
}

/// Upstream classification metadata attached to an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Track label assigned by the upstream filter
    pub track: String,

    /// Independently recorded anomaly score
    pub anomaly_score: u32,

    /// Rule identifier used for attack-type mapping
    pub rule_id: String,

    /// Raw classification timestamp
    pub timestamp: String,
}

/// Location of a client address.
///
/// Every address resolves to one of these variants; resolution failures
/// are represented by the sentinels rather than by errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeoLocation {
    /// Private, loopback or link-local address
    Private,
    /// Lookup failed or no lookup table configured
    Unknown,
    Resolved {
        country: String,
        city: String,
        latitude: f64,
        longitude: f64,
    },
}

impl GeoLocation {
    /// Country code, or the sentinel name
    pub fn country(&self) -> &str {
        match self {
            GeoLocation::Private => "private",
            GeoLocation::Unknown => "unknown",
            GeoLocation::Resolved { country, .. } => country,
        }
    }

    /// City name, or the sentinel name
    pub fn city(&self) -> &str {
        match self {
            GeoLocation::Private => "private",
            GeoLocation::Unknown => "unknown",
            GeoLocation::Resolved { city, .. } => city,
        }
    }

    pub fn latitude(&self) -> f64 {
        match self {
            GeoLocation::Resolved { latitude, .. } => *latitude,
            GeoLocation::Private | GeoLocation::Unknown => 0.0,
        }
    }

    pub fn longitude(&self) -> f64 {
        match self {
            GeoLocation::Resolved { longitude, .. } => *longitude,
            GeoLocation::Private | GeoLocation::Unknown => 0.0,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, GeoLocation::Resolved { .. })
    }
}

/// Categorical severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    pub const CRITICAL_THRESHOLD: u32 = 80;
    pub const HIGH_THRESHOLD: u32 = 60;
    pub const MEDIUM_THRESHOLD: u32 = 40;

    /// Step function over the numeric severity
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= Self::CRITICAL_THRESHOLD => SeverityLevel::Critical,
            s if s >= Self::HIGH_THRESHOLD => SeverityLevel::High,
            s if s >= Self::MEDIUM_THRESHOLD => SeverityLevel::Medium,
            _ => SeverityLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Low => "low",
            SeverityLevel::Medium => "medium",
            SeverityLevel::High => "high",
            SeverityLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived severity of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityScore {
    pub value: u32,
    pub level: SeverityLevel,
}

impl SeverityScore {
    pub fn new(value: u32) -> Self {
        Self {
            value,
            level: SeverityLevel::from_score(value),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.level == SeverityLevel::Critical
    }
}

/// Attack class derived from a rule identifier prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackType {
    Sqli,
    Xss,
    Rce,
    Lfi,
    Protocol,
    Other,
}

impl AttackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackType::Sqli => "sqli",
            AttackType::Xss => "xss",
            AttackType::Rce => "rce",
            AttackType::Lfi => "lfi",
            AttackType::Protocol => "protocol",
            AttackType::Other => "other",
        }
    }
}

impl fmt::Display for AttackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Critical security alert record, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_type: String,
    pub transaction_id: String,
    pub client_ip: String,
    pub location: GeoLocation,
    pub severity: SeverityScore,
    pub rule_id: String,
    pub attack_type: AttackType,
    pub uri: String,
    pub raised_at: DateTime<Utc>,
}

impl AlertEvent {
    pub const CRITICAL_SECURITY_EVENT: &'static str = "CRITICAL_SECURITY_EVENT";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_level_boundaries() {
        assert_eq!(SeverityLevel::from_score(0), SeverityLevel::Low);
        assert_eq!(SeverityLevel::from_score(39), SeverityLevel::Low);
        assert_eq!(SeverityLevel::from_score(40), SeverityLevel::Medium);
        assert_eq!(SeverityLevel::from_score(59), SeverityLevel::Medium);
        assert_eq!(SeverityLevel::from_score(60), SeverityLevel::High);
        assert_eq!(SeverityLevel::from_score(79), SeverityLevel::High);
        assert_eq!(SeverityLevel::from_score(80), SeverityLevel::Critical);
        assert_eq!(SeverityLevel::from_score(u32::MAX), SeverityLevel::Critical);
    }

    #[test]
    fn test_severity_level_display() {
        assert_eq!(SeverityLevel::Critical.to_string(), "critical");
        assert_eq!(
            serde_json::to_string(&SeverityLevel::Medium).unwrap(),
            "\"medium\""
        );
    }

    #[test]
    fn test_geo_sentinels() {
        assert_eq!(GeoLocation::Private.country(), "private");
        assert_eq!(GeoLocation::Unknown.city(), "unknown");
        assert_eq!(GeoLocation::Unknown.latitude(), 0.0);
        assert!(!GeoLocation::Private.is_resolved());

        let located = GeoLocation::Resolved {
            country: "DE".to_string(),
            city: "Berlin".to_string(),
            latitude: 52.52,
            longitude: 13.405,
        };
        assert_eq!(located.country(), "DE");
        assert_eq!(located.longitude(), 13.405);
        assert!(located.is_resolved());
    }

    #[test]
    fn test_severity_score_new() {
        let score = SeverityScore::new(85);
        assert_eq!(score.level, SeverityLevel::Critical);
        assert!(score.is_critical());
        assert!(!SeverityScore::new(79).is_critical());
    }
}
