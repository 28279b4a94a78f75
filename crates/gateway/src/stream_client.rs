//! Gateway-side half of the `EventStreaming` call: a reconnect loop around
//! one logical bidirectional stream, plus the send/receive loops that
//! marshal between field-bus events and wire `Event`s (§4.5).

use std::time::Duration;

use autorc_protocol::{
    Action, ActionEvent, CoreError, EventMultiServiceClient, HEADER_CLIENT_ID, HEADER_USERNAME,
    NotifyEvent, decode_payload, new_event,
};
use autorc_tls::ClientIdentity;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::Request;
use tracing::{debug, error, info, warn};

/// Fixed delay between reconnect attempts; no backoff, no cap (§4.5).
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);
const MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct StreamClient {
    server_addr: String,
    tls_config: ClientTlsConfig,
    identity: ClientIdentity,
}

impl StreamClient {
    #[must_use]
    pub fn new(server_addr: String, tls_config: ClientTlsConfig, identity: ClientIdentity) -> Self {
        Self {
            server_addr,
            tls_config,
            identity,
        }
    }

    /// Runs until `cancel` fires. Reconnects on every transport error with
    /// a fixed delay; each connection gets a fresh send loop and receive
    /// loop that run until that connection breaks.
    pub async fn run(
        self,
        cancel: CancellationToken,
        mut outbound: mpsc::Receiver<NotifyEvent>,
        inbound: mpsc::Sender<ActionEvent>,
    ) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let client = match self.dial().await {
                Ok(client) => client,
                Err(err) => {
                    warn!(%err, "failed to dial hub, retrying");
                    if sleep_or_cancelled(&cancel).await {
                        return;
                    }
                    continue;
                },
            };

            info!(server_addr = %self.server_addr, "connected to hub");
            self.drive_one_connection(client, &cancel, &mut outbound, &inbound).await;

            if cancel.is_cancelled() {
                return;
            }
            if sleep_or_cancelled(&cancel).await {
                return;
            }
        }
    }

    async fn dial(&self) -> Result<EventMultiServiceClient<Channel>, CoreError> {
        let uri = format!("https://{}", self.server_addr);
        let endpoint = Endpoint::from_shared(uri)
            .map_err(CoreError::transport)?
            .tls_config(self.tls_config.clone())
            .map_err(CoreError::transport)?
            .keep_alive_timeout(KEEPALIVE_TIMEOUT)
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .connect_timeout(MIN_CONNECT_TIMEOUT);

        let channel = endpoint.connect().await.map_err(CoreError::transport)?;
        Ok(EventMultiServiceClient::new(channel))
    }

    async fn drive_one_connection(
        &self,
        mut client: EventMultiServiceClient<Channel>,
        cancel: &CancellationToken,
        outbound: &mut mpsc::Receiver<NotifyEvent>,
        inbound: &mpsc::Sender<ActionEvent>,
    ) {
        let (to_hub_tx, to_hub_rx) = mpsc::channel(32);
        let mut request = Request::new(tokio_stream::wrappers::ReceiverStream::new(to_hub_rx));
        if let Err(err) = attach_identity(&mut request, &self.identity) {
            error!(%err, "failed to attach identity metadata");
            return;
        }

        let response = match client.event_streaming(request).await {
            Ok(response) => response,
            Err(status) => {
                warn!(%status, "EventStreaming rpc failed to open");
                return;
            },
        };
        let mut from_hub = response.into_inner();

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    drop(to_hub_tx);
                    return;
                }
                event = outbound.recv() => {
                    let Some(event) = event else {
                        drop(to_hub_tx);
                        return;
                    };
                    let Ok(payload) = autorc_protocol::encode_payload(&event) else {
                        warn!("failed to encode notify event, dropping");
                        continue;
                    };
                    if to_hub_tx.send(new_event(Action::Notification, payload)).await.is_err() {
                        warn!("send to hub failed, reconnecting");
                        return;
                    }
                }
                message = from_hub.message() => {
                    match message {
                        Ok(Some(event)) => self.handle_inbound(event, inbound).await,
                        Ok(None) => {
                            info!("hub closed the stream, reconnecting");
                            return;
                        },
                        Err(status) => {
                            warn!(%status, "read from hub failed, reconnecting");
                            return;
                        },
                    }
                }
            }
        }
    }

    async fn handle_inbound(&self, event: autorc_protocol::Event, inbound: &mpsc::Sender<ActionEvent>) {
        if event.action != Action::Switch as i32 && event.action != Action::Toggle as i32 {
            debug!(action = event.action, "ignoring unrecognized event action");
            return;
        }
        match decode_payload::<ActionEvent>(&event.payload) {
            Ok(action) => {
                if inbound.send(action).await.is_err() {
                    warn!("dispatcher inbound channel closed");
                }
            },
            Err(err) => warn!(%err, "failed to decode inbound action event"),
        }
    }
}

fn attach_identity<T>(request: &mut Request<T>, identity: &ClientIdentity) -> Result<(), CoreError> {
    let username: MetadataValue<_> = identity
        .owner
        .parse()
        .map_err(|_| CoreError::ConfigInvalid("owner is not valid metadata".to_string()))?;
    let client_id: MetadataValue<_> = identity
        .client_id
        .parse()
        .map_err(|_| CoreError::ConfigInvalid("client_id is not valid metadata".to_string()))?;
    request.metadata_mut().insert(HEADER_USERNAME, username);
    request.metadata_mut().insert(HEADER_CLIENT_ID, client_id);
    Ok(())
}

/// Sleeps for `RECONNECT_DELAY` unless cancelled first. Returns `true` if
/// cancellation won the race.
async fn sleep_or_cancelled(cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(RECONNECT_DELAY) => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn identity() -> ClientIdentity {
        ClientIdentity {
            owner: "alice".to_string(),
            client_id: "11111111-1111-1111-1111-111111111111".to_string(),
        }
    }

    #[test]
    fn attach_identity_sets_both_headers() {
        let mut request = Request::new(());
        attach_identity(&mut request, &identity()).unwrap();

        assert_eq!(request.metadata().get(HEADER_USERNAME).unwrap().to_str().unwrap(), "alice");
        assert_eq!(
            request.metadata().get(HEADER_CLIENT_ID).unwrap().to_str().unwrap(),
            "11111111-1111-1111-1111-111111111111"
        );
    }

    #[test]
    fn attach_identity_rejects_values_that_are_not_valid_metadata() {
        let mut request = Request::new(());
        let bad = ClientIdentity {
            owner: "not\x00valid".to_string(),
            client_id: "11111111-1111-1111-1111-111111111111".to_string(),
        };
        assert!(attach_identity(&mut request, &bad).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_or_cancelled_returns_true_when_cancelled_first() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(sleep_or_cancelled(&cancel).await);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_or_cancelled_returns_false_once_the_delay_elapses() {
        let cancel = CancellationToken::new();
        let sleeping = tokio::spawn(async move { sleep_or_cancelled(&cancel).await });
        tokio::time::advance(RECONNECT_DELAY + Duration::from_millis(1)).await;
        assert!(!sleeping.await.unwrap());
    }
}
