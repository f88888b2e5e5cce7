//! # WAF domain rules
//!
//! Severity scoring and attack classification over OWASP CRS rule
//! identifiers, the high-risk address capability, and geolocation
//! enrichment of client addresses.

pub mod attack;
pub mod severity;
pub mod threat_intelligence;
pub mod geo;

pub use attack::*;
pub use severity::*;
pub use threat_intelligence::*;
pub use geo::*;
