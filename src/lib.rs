//! Per-IP traffic abuse control.
//!
//! Hits are counted per ip at day, hour, ten-minute and minute resolution.
//! Batch engines ban ips that cross escalating thresholds and whitelist ips
//! that reverse resolve to well-known crawlers.

pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod jobs;
pub mod service;
pub mod store;
pub mod utils;

pub use service::{Observation, TrafficService};
