//! # Alert Trigger
//!
//! Emits critical security alerts through the logging boundary.

use chrono::Utc;
use tracing::warn;
use wafpulse_core::{AlertEvent, Classification, SecurityEvent, SeverityScore};
use wafpulse_domain_waf::{attack_type, GeoResolver};

/// Alert trigger for critical-severity events
#[derive(Clone)]
pub struct AlertTrigger {
    geo: GeoResolver,
}

impl AlertTrigger {
    pub fn new(geo: GeoResolver) -> Self {
        Self { geo }
    }

    /// Emit an alert for a critical event.
    ///
    /// Location is resolved again here, independently of persistence.
    pub fn trigger(
        &self,
        event: &SecurityEvent,
        classification: &Classification,
        score: &SeverityScore,
    ) -> AlertEvent {
        let location = self.geo.resolve(&event.client_ip);

        let alert = AlertEvent {
            alert_type: AlertEvent::CRITICAL_SECURITY_EVENT.to_string(),
            transaction_id: event.transaction_id.clone(),
            client_ip: event.client_ip.clone(),
            location,
            severity: *score,
            rule_id: classification.rule_id.clone(),
            attack_type: attack_type(&classification.rule_id),
            uri: event.request.uri.clone(),
            raised_at: Utc::now(),
        };

        warn!(
            alert_type = %alert.alert_type,
            tx_id = %alert.transaction_id,
            client_ip = %alert.client_ip,
            geo_country = %alert.location.country(),
            geo_city = %alert.location.city(),
            severity = alert.severity.value,
            level = %alert.severity.level,
            rule_id = %alert.rule_id,
            attack_type = %alert.attack_type,
            uri = %alert.uri,
            "CRITICAL SECURITY ALERT TRIGGERED"
        );

        alert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use std::sync::Arc;
    use wafpulse_core::{GeoLocation, HttpRequest};
    use wafpulse_domain_waf::{CityRecord, GeoError, GeoLookup};

    struct FixedLookup;

    impl GeoLookup for FixedLookup {
        fn lookup(&self, _ip: IpAddr) -> Result<CityRecord, GeoError> {
            Ok(CityRecord {
                country_iso: "NL".to_string(),
                city: "Amsterdam".to_string(),
                latitude: 52.37,
                longitude: 4.89,
            })
        }
    }

    fn critical_event() -> (SecurityEvent, Classification, SeverityScore) {
        let event = SecurityEvent {
            transaction_id: "tx-critical".to_string(),
            client_ip: "198.51.100.7".to_string(),
            anomaly_score: 60,
            request: HttpRequest {
                method: "POST".to_string(),
                uri: "/cgi-bin/run".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let classification = Classification {
            rule_id: "932160".to_string(),
            ..Default::default()
        };
        (event, classification, SeverityScore::new(95))
    }

    #[test]
    fn test_alert_record() {
        let (event, classification, score) = critical_event();
        let trigger = AlertTrigger::new(GeoResolver::disabled());

        let alert = trigger.trigger(&event, &classification, &score);

        assert_eq!(alert.alert_type, "CRITICAL_SECURITY_EVENT");
        assert_eq!(alert.transaction_id, "tx-critical");
        assert_eq!(alert.rule_id, "932160");
        assert_eq!(alert.uri, "/cgi-bin/run");
        assert_eq!(alert.attack_type.as_str(), "rce");
        assert_eq!(alert.severity.value, 95);
        assert_eq!(alert.location, GeoLocation::Unknown);
    }

    #[test]
    fn test_alert_resolves_location() {
        let (event, classification, score) = critical_event();
        let trigger = AlertTrigger::new(GeoResolver::new(Arc::new(FixedLookup)));

        let alert = trigger.trigger(&event, &classification, &score);
        assert_eq!(alert.location.country(), "NL");
        assert_eq!(alert.location.city(), "Amsterdam");
    }
}
