//! # Subscriptions
//!
//! Tracks which (source, context type) pairs have a push subscription
//! and retries failed ones with jittered exponential backoff. At most
//! one in-flight subscribe attempt exists per pair.

mod manager;

pub use manager::SubscriptionManager;
