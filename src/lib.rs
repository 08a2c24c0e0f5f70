// Vehicle Stats
// Per-vehicle-kind usage telemetry: session tracking, debounced aggregation,
// throttled persistence and ranked reporting

pub mod admin;
pub mod aggregator;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod hub;
pub mod observability;
pub mod protocol;
pub mod report;
pub mod scheduler;
pub mod server;
pub mod signals;
pub mod stats;
pub mod storage;
pub mod tracker;

pub use error::{Result, StatsError};
