//! # wafpulse core
//!
//! Data model for web-application-firewall security events, the wire
//! decoder that turns raw stream payloads into that model, and event
//! timestamp resolution.

pub mod model;
pub mod decode;
pub mod time;

pub use model::*;
pub use decode::*;
pub use time::*;
