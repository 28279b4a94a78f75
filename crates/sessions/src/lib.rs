//! The hub's session registry: one [`Session`] per live Gateway connection,
//! keyed by Telegram owner.

pub mod error;
pub mod registry;
pub mod session;

pub use error::{Error, Result};
pub use registry::SessionRegistry;
pub use session::{Session, SessionChannels};
