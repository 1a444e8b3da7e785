//! metrics-reporter library crate.
//!
//! Schedules periodic reports of samples read from a metric store and hands
//! each batch to a pluggable reporter. Every sample is delivered once, in
//! consecutive non-overlapping windows, with failed batches retried on the
//! next cycle.

pub mod config;
pub mod error;
pub mod logging;
pub mod reporter;
pub mod scheduler;
pub mod store;

pub use error::{Error, Result};
