//! Telegram chat-UI adapter for the hub.
//!
//! Owns the bot's long-polling loop, the command/callback router, and the
//! contract for the out-of-scope user-account service. Core event-plane
//! logic (sessions, wire codec, gRPC service) lives in sibling crates; this
//! crate only turns chat updates into [`autorc_sessions::Session`] calls and
//! vice versa.

pub mod bot;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod router;

pub use bot::Notification;
pub use directory::{UserDirectory, UserRecord};
pub use error::{Error, Result};
pub use handlers::{CallbackRequest, HandlerContext};
pub use router::Router;
