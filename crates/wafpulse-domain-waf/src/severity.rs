//! # Severity Scorer
//!
//! Deterministic severity over the upstream anomaly score, the CRS rule
//! family of the classification, and the client's risk reputation.

use crate::attack::{attack_class, attack_type, severity_bonus, AttackClass};
use crate::threat_intelligence::HighRiskLookup;
use std::sync::Arc;
use wafpulse_core::{AttackType, Classification, SecurityEvent, SeverityLevel, SeverityScore};

/// Bonus for clients on the high-risk list
pub const HIGH_RISK_BONUS: u32 = 15;

/// Severity scorer
#[derive(Clone)]
pub struct SeverityScorer {
    high_risk: Arc<dyn HighRiskLookup>,
}

impl SeverityScorer {
    pub fn new(high_risk: Arc<dyn HighRiskLookup>) -> Self {
        Self { high_risk }
    }

    /// Score an event
    pub fn score(&self, event: &SecurityEvent, classification: &Classification) -> SeverityScore {
        let mut value = event
            .anomaly_score
            .saturating_add(severity_bonus(&classification.rule_id));

        if self.high_risk.is_high_risk(&event.client_ip) {
            value = value.saturating_add(HIGH_RISK_BONUS);
        }

        SeverityScore::new(value)
    }

    /// Attack type of the classification's rule
    pub fn attack_type(&self, classification: &Classification) -> AttackType {
        attack_type(&classification.rule_id)
    }

    /// Rule family of a rule identifier, if it is a scored one
    pub fn attack_class(&self, rule_id: &str) -> Option<&'static AttackClass> {
        attack_class(rule_id)
    }

    pub fn level_for(&self, value: u32) -> SeverityLevel {
        SeverityLevel::from_score(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threat_intelligence::StaticHighRiskList;
    use proptest::prelude::*;
    use wafpulse_core::SeverityLevel;

    fn scorer() -> SeverityScorer {
        SeverityScorer::new(Arc::new(StaticHighRiskList::placeholder()))
    }

    fn input(anomaly_score: u32, client_ip: &str, rule_id: &str) -> (SecurityEvent, Classification) {
        let event = SecurityEvent {
            client_ip: client_ip.to_string(),
            anomaly_score,
            ..Default::default()
        };
        let classification = Classification {
            rule_id: rule_id.to_string(),
            ..Default::default()
        };
        (event, classification)
    }

    #[test]
    fn test_level_boundaries_without_rule() {
        let scorer = scorer();
        for (anomaly, level) in [
            (39, SeverityLevel::Low),
            (40, SeverityLevel::Medium),
            (59, SeverityLevel::Medium),
            (60, SeverityLevel::High),
            (79, SeverityLevel::High),
            (80, SeverityLevel::Critical),
        ] {
            let (event, classification) = input(anomaly, "203.0.113.7", "");
            let score = scorer.score(&event, &classification);
            assert_eq!(score.value, anomaly);
            assert_eq!(score.level, level, "anomaly score {}", anomaly);
        }
    }

    #[test]
    fn test_sqli_pushes_to_critical() {
        let (event, classification) = input(50, "203.0.113.7", "942100");
        let score = scorer().score(&event, &classification);
        assert_eq!(score.value, 80);
        assert_eq!(score.level, SeverityLevel::Critical);
    }

    #[test]
    fn test_high_risk_bonus() {
        let (event, classification) = input(10, "10.0.0.50", "941100");
        let score = scorer().score(&event, &classification);
        assert_eq!(score.value, 10 + 25 + HIGH_RISK_BONUS);
        assert_eq!(score.level, SeverityLevel::Medium);
    }

    #[test]
    fn test_event_rule_matches_do_not_score() {
        let (mut event, classification) = input(10, "203.0.113.7", "");
        event.matched_rules.push(wafpulse_core::RuleMatch {
            rule_id: "932100".to_string(),
            message: "Remote Command Execution".to_string(),
        });
        assert_eq!(scorer().score(&event, &classification).value, 10);
    }

    #[test]
    fn test_saturates_instead_of_overflowing() {
        let (event, classification) = input(u32::MAX, "192.168.1.100", "932100");
        assert_eq!(scorer().score(&event, &classification).value, u32::MAX);
    }

    #[test]
    fn test_attack_type() {
        let (_, classification) = input(0, "", "930120");
        assert_eq!(scorer().attack_type(&classification), AttackType::Lfi);
    }

    proptest! {
        #[test]
        fn prop_no_rule_is_identity(anomaly in 0u32..100_000) {
            let (event, classification) = input(anomaly, "198.51.100.1", "");
            let score = scorer().score(&event, &classification);
            prop_assert_eq!(score.value, anomaly);
            prop_assert_eq!(score.level, SeverityLevel::from_score(anomaly));
        }

        #[test]
        fn prop_known_prefix_adds_fixed_bonus(anomaly in 0u32..100_000, suffix in "[0-9A-Za-z]{0,6}") {
            let scorer = scorer();
            for (prefix, bonus) in [("942", 30), ("941", 25), ("932", 35), ("930", 20), ("920", 0)] {
                let (event, classification) = input(anomaly, "198.51.100.1", &format!("{}{}", prefix, suffix));
                prop_assert_eq!(scorer.score(&event, &classification).value, anomaly + bonus);
            }
        }

        #[test]
        fn prop_unknown_prefix_adds_nothing(anomaly in 0u32..100_000, rule in "(8|91|95)[0-9]{0,5}") {
            let (event, classification) = input(anomaly, "198.51.100.1", &rule);
            prop_assert_eq!(scorer().score(&event, &classification).value, anomaly);
        }

        #[test]
        fn prop_monotonic_in_anomaly_score(a in 0u32..100_000, b in 0u32..100_000, rule in "(942|941|932|930|920|949)[0-9]{3}") {
            let scorer = scorer();
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let (e1, c1) = input(low, "10.0.0.50", &rule);
            let (e2, c2) = input(high, "10.0.0.50", &rule);
            let s1 = scorer.score(&e1, &c1);
            let s2 = scorer.score(&e2, &c2);
            prop_assert!(s1.value <= s2.value);
            prop_assert!(s1.level <= s2.level);
        }
    }
}
