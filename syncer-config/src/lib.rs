//! Configuration for sync workers.
//!
//! Provides environment detection, layered loading from YAML files and environment variables, and
//! the configuration types consumed by the workload lifecycle and state persistence components.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
