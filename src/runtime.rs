//! Runtime glue: configuration, the first-failure latch, shutdown signals,
//! telemetry, and the session runner that maps a run onto an exit status.

pub mod config;
pub mod failure;
pub mod runner;
pub mod shutdown;
pub mod telemetry;
