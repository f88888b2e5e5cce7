//! # wafpulse CLI Library
//!
//! Argument parsing and process wiring for the real-time WAF event processor

pub mod app;
pub mod commands;

pub use app::*;
pub use commands::*;
