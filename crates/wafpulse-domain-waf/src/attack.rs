//! CRS rule-prefix table
//!
//! Severity bonuses and attack-type tags both come from this one table.

use wafpulse_core::AttackType;

/// One CRS rule family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackClass {
    /// Case-sensitive rule identifier prefix
    pub prefix: &'static str,
    pub attack_type: AttackType,
    /// Added to the severity of events matching this family
    pub severity_bonus: u32,
}

pub const ATTACK_CLASSES: [AttackClass; 5] = [
    AttackClass { prefix: "942", attack_type: AttackType::Sqli, severity_bonus: 30 },
    AttackClass { prefix: "941", attack_type: AttackType::Xss, severity_bonus: 25 },
    AttackClass { prefix: "932", attack_type: AttackType::Rce, severity_bonus: 35 },
    AttackClass { prefix: "930", attack_type: AttackType::Lfi, severity_bonus: 20 },
    AttackClass { prefix: "920", attack_type: AttackType::Protocol, severity_bonus: 0 },
];

/// Rule family for a rule identifier, if any
pub fn attack_class(rule_id: &str) -> Option<&'static AttackClass> {
    if rule_id.is_empty() {
        return None;
    }
    ATTACK_CLASSES.iter().find(|class| rule_id.starts_with(class.prefix))
}

/// Symbolic attack type for the current-schema `attack_type` tag
pub fn attack_type(rule_id: &str) -> AttackType {
    attack_class(rule_id)
        .map(|class| class.attack_type)
        .unwrap_or(AttackType::Other)
}

/// Severity bonus for a rule identifier, zero when no family matches
pub fn severity_bonus(rule_id: &str) -> u32 {
    attack_class(rule_id)
        .map(|class| class.severity_bonus)
        .unwrap_or(0)
}
