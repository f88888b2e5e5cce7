//! # wafpulse store
//!
//! Metric points and the time-series write paths: an acknowledged
//! point-at-a-time path through [`TimeSeriesClient`] and a buffered
//! fire-and-forget path through [`BufferedWriter`], whose failures are
//! reported on a separate channel.

pub mod point;
pub mod timeseriesdb;
pub mod writer;

pub use point::*;
pub use timeseriesdb::*;
pub use writer::*;
