//! Broker orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{Broker, BrokerRuntimeConfig};
pub use stats::BrokerStats;
