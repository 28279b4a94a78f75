//! Shared types, error definitions, and small utilities used across the bridge crates.

pub mod error;

pub use error::{Error, FromMessage, Result};

/// A short, log-friendly opaque identifier. Used for event ids and anything
/// else that only needs to be unique enough to correlate lines in a log.
#[must_use]
pub fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
