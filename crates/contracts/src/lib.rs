//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Uses unix wall-clock seconds (f64) as primary clock
//! - All store/queue operations take `now` explicitly so tests stay deterministic

mod config;
mod decode;
mod error;
mod event;
mod ids;
mod request;
mod snapshot;
mod source;
mod subscription;
mod time;

pub use config::*;
pub use decode::*;
pub use error::*;
pub use event::*;
pub use ids::{ContextType, SourceId};
pub use request::*;
pub use snapshot::*;
pub use source::*;
pub use subscription::*;
pub use time::unix_now;
