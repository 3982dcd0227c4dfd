//! # Registry
//!
//! Source registry: which sources exist and which context types each
//! advertises. Announcements come from the host layer; lookups come
//! from the dispatcher and subscription manager.

mod registry;

pub use registry::{RegistryDelta, SourceRegistry};
