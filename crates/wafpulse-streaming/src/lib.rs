//! # wafpulse streaming
//!
//! Real-time processing of WAF security events: inbound stream sources,
//! dual-schema metrics persistence, critical alerting, and the stream
//! processor that sequences them per message.

pub mod config;
pub mod stream;
pub mod consumer;
pub mod shutdown;
pub mod sink;
pub mod alert;
pub mod processor;

pub use config::*;
pub use stream::*;
pub use consumer::*;
pub use shutdown::*;
pub use sink::*;
pub use alert::*;
pub use processor::*;
