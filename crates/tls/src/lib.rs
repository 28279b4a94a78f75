//! mTLS configuration and client-certificate identity extraction for the
//! hub and the gateway. Certificate issuance is out of scope: this crate
//! only loads and verifies certificates handed to it by configuration.

pub mod client;
pub mod error;
pub mod server;
pub mod subject;

pub use client::load_client_tls;
pub use error::{Context, Error, Result};
pub use server::load_server_tls;
pub use subject::{ClientIdentity, extract_identity, extract_identity_from_pem};
