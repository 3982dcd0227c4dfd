//! # Host Gateway
//!
//! Abstraction over the host environment that owns the actual context
//! sources. Everything above this crate talks to a `HostClient`; the
//! mock implementation drives tests and local runs without a real host.

mod client;
mod error;
mod mock;
mod policy;
mod session;

pub use client::HostClient;
pub use error::{HostGatewayError, Result};
pub use mock::{MockHost, MockHostConfig};
pub use policy::{ActivateAll, SourceSelectionPolicy};
pub use session::SessionDriver;
