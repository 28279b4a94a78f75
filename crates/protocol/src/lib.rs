//! Wire types for the `EventMultiService` gRPC stream and the JSON payloads
//! carried inside an `Event`.

pub mod error;
pub mod model;

/// Generated protobuf/tonic types and service traits.
#[allow(unused_qualifications)]
pub mod pb {
    tonic::include_proto!("autorc.event.v1");
}

pub use error::CoreError;
pub use model::{ActionEvent, ActionKind, NotifyEvent, decode_payload, encode_payload, new_event};
pub use pb::{
    Action, Event,
    event_multi_service_client::EventMultiServiceClient,
    event_multi_service_server::{EventMultiService, EventMultiServiceServer},
};

/// Header carrying the Telegram handle of the certificate owner.
pub const HEADER_USERNAME: &str = "x-username";
/// Header carrying the UUID matching the cert's unique-id attribute.
pub const HEADER_CLIENT_ID: &str = "x-clientid";
