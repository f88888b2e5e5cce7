//! High-risk address capability

use std::collections::HashSet;

/// Answers whether a client address is known to be high risk
pub trait HighRiskLookup: Send + Sync {
    fn is_high_risk(&self, address: &str) -> bool;
}

/// Fixed set of high-risk addresses.
///
/// Stands in for a threat-intelligence feed; any [`HighRiskLookup`]
/// implementation can replace it without touching the scorer.
#[derive(Debug, Clone, Default)]
pub struct StaticHighRiskList {
    addresses: HashSet<String>,
}

impl StaticHighRiskList {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// The address list shipped before threat-intelligence integration
    pub fn placeholder() -> Self {
        Self::new(["192.168.1.100", "10.0.0.50"])
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl HighRiskLookup for StaticHighRiskList {
    fn is_high_risk(&self, address: &str) -> bool {
        self.addresses.contains(address)
    }
}
