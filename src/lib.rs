//! Benchmark driver: resolves workload parameters from the command line and
//! dispatches them to a compute backend.

pub mod config;
pub mod device;
pub mod engine;
pub mod host;
pub mod logging;
pub mod sweep;
