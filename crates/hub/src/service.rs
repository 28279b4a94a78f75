//! `EventMultiService` gRPC implementation: the connect sequence, the
//! per-session receive/dispatch loops, and the notify-bridge that feeds the
//! bot's outbound chat channel.

use std::pin::Pin;
use std::sync::Arc;

use autorc_protocol::{
    Action, CoreError, Event, EventMultiService, HEADER_CLIENT_ID, HEADER_USERNAME, NotifyEvent,
    decode_payload,
};
use autorc_sessions::{Session, SessionChannels, SessionRegistry};
use autorc_telegram::{Notification, UserDirectory};
use futures::Stream;
use tokio::sync::mpsc;
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, warn};

pub struct StreamService {
    registry: Arc<SessionRegistry>,
    directory: Arc<dyn UserDirectory>,
    notifications: mpsc::Sender<Notification>,
}

impl StreamService {
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        directory: Arc<dyn UserDirectory>,
        notifications: mpsc::Sender<Notification>,
    ) -> Self {
        Self {
            registry,
            directory,
            notifications,
        }
    }

    /// The connect sequence: look the client up by cert id, check it
    /// belongs to the asserted username, require a registered chat, then
    /// mint and register a fresh session.
    async fn authenticate(
        &self,
        username: &str,
        client_id: &str,
    ) -> Result<(Arc<Session>, SessionChannels), Status> {
        let user = self
            .directory
            .find_by_client_id(client_id)
            .await
            .map_err(|err| Status::internal(err.to_string()))?
            .ok_or_else(|| Status::unauthenticated("unknown client id"))?;
        if user.tg_user != username {
            return Err(Status::unauthenticated("certificate owner does not match X-Username"));
        }
        if user.chat_id == 0 {
            return Err(Status::invalid_argument(
                "no chat registered for this user; run /menu in chat first",
            ));
        }

        let (session, channels) = Session::new(
            user.tg_user.clone(),
            client_id.to_string(),
            user.chat_id,
            user.notify_enabled,
        );
        let session = Arc::new(session);
        self.registry.insert(&session.owner_tg, Arc::clone(&session)).await;
        info!(owner = %session.owner_tg, "gateway session established");
        Ok((session, channels))
    }
}

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl EventMultiService for StreamService {
    type EventStreamingStream = EventStream;

    async fn event_streaming(
        &self,
        request: Request<Streaming<Event>>,
    ) -> Result<Response<Self::EventStreamingStream>, Status> {
        let username = header(&request, HEADER_USERNAME)?;
        let client_id = header(&request, HEADER_CLIENT_ID)?;

        let (session, channels) = self.authenticate(&username, &client_id).await?;

        let SessionChannels {
            recv_tx,
            recv_rx,
            mut send_rx,
            mut err_rx,
        } = channels;

        tokio::spawn(receive_loop(request.into_inner(), recv_tx, Arc::clone(&session)));

        tokio::spawn(notify_bridge(Arc::clone(&session), self.notifications.clone(), recv_rx));

        let registry = Arc::clone(&self.registry);
        let dispatch_session = Arc::clone(&session);
        let outbound = async_stream::stream! {
            loop {
                tokio::select! {
                    () = dispatch_session.ctx.cancelled() => {
                        break;
                    }
                    err = err_rx.recv() => {
                        if let Some(err) = err {
                            warn!(owner = %dispatch_session.owner_tg, %err, "session error, tearing down");
                            yield Err(Status::from(err));
                        }
                        break;
                    }
                    event = send_rx.recv() => {
                        match event {
                            Some(event) => yield Ok(event),
                            None => break,
                        }
                    }
                }
            }
            registry.remove(&dispatch_session.owner_tg, &dispatch_session).await;
            info!(owner = %dispatch_session.owner_tg, "gateway session torn down");
        };

        Ok(Response::new(Box::pin(outbound)))
    }
}

fn header(request: &Request<Streaming<Event>>, name: &str) -> Result<String, Status> {
    request
        .metadata()
        .get(name)
        .ok_or_else(|| Status::invalid_argument(format!("missing {name} header")))?
        .to_str()
        .map(str::to_string)
        .map_err(|_| Status::invalid_argument(format!("{name} header is not valid UTF-8")))
}

/// Reads inbound events off the stream and forwards them to `recv_tx`. On a
/// transport error or stream close, publishes the cause to the session's
/// error sink and returns — it never touches the outbound side.
async fn receive_loop(
    mut stream: Streaming<Event>,
    recv_tx: mpsc::Sender<Event>,
    session: Arc<Session>,
) {
    loop {
        match stream.message().await {
            Ok(Some(event)) => {
                if recv_tx.send(event).await.is_err() {
                    return;
                }
            },
            Ok(None) => {
                session.ctx.cancel();
                return;
            },
            Err(status) => {
                session.publish_error(CoreError::transport(status));
                return;
            },
        }
    }
}

/// Consumes inbound events in arrival order. `NOTIFICATION` events are
/// decoded and, if the session currently wants notifications, pushed onto
/// the bot's outbound chat channel. Other action kinds are accepted and
/// dropped for forward-compatibility.
async fn notify_bridge(
    session: Arc<Session>,
    notifications: mpsc::Sender<Notification>,
    mut recv_rx: mpsc::Receiver<Event>,
) {
    while let Some(event) = recv_rx.recv().await {
        if event.action != Action::Notification as i32 {
            continue;
        }
        let notify: NotifyEvent = match decode_payload(&event.payload) {
            Ok(notify) => notify,
            Err(err) => {
                session.publish_error(err);
                continue;
            },
        };
        if !session.notify_enabled() {
            continue;
        }
        let notification = Notification {
            chat_id: session.chat_id,
            text: notify.text,
        };
        if notifications.send(notification).await.is_err() {
            warn!(owner = %session.owner_tg, "bot notification channel closed");
            return;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use autorc_telegram::UserRecord;
    use autorc_telegram::directory::fake::InMemoryUserDirectory;

    use super::*;

    fn service(directory: InMemoryUserDirectory) -> (StreamService, mpsc::Receiver<Notification>) {
        let (notify_tx, notify_rx) = mpsc::channel(8);
        let service = StreamService::new(Arc::new(SessionRegistry::new()), Arc::new(directory), notify_tx);
        (service, notify_rx)
    }

    #[tokio::test]
    async fn unknown_client_id_is_rejected() {
        let (service, _notify_rx) = service(InMemoryUserDirectory::new());

        let err = service.authenticate("alice", "no-such-client").await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
    }

    #[tokio::test]
    async fn username_mismatch_is_rejected() {
        let directory = InMemoryUserDirectory::new();
        directory.insert(
            "U1",
            UserRecord {
                tg_user: "alice".to_string(),
                chat_id: 42,
                notify_enabled: true,
            },
        );
        let (service, _notify_rx) = service(directory);

        let err = service.authenticate("mallory", "U1").await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unauthenticated);
    }

    #[tokio::test]
    async fn missing_chat_id_is_rejected() {
        let directory = InMemoryUserDirectory::new();
        directory.insert(
            "U1",
            UserRecord {
                tg_user: "alice".to_string(),
                chat_id: 0,
                notify_enabled: true,
            },
        );
        let (service, _notify_rx) = service(directory);

        let err = service.authenticate("alice", "U1").await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn valid_connect_registers_a_session() {
        let directory = InMemoryUserDirectory::new();
        directory.insert(
            "U1",
            UserRecord {
                tg_user: "alice".to_string(),
                chat_id: 42,
                notify_enabled: true,
            },
        );
        let registry = Arc::new(SessionRegistry::new());
        let (notify_tx, _notify_rx) = mpsc::channel(8);
        let service = StreamService::new(Arc::clone(&registry), Arc::new(directory), notify_tx);

        let (session, _channels) = service.authenticate("alice", "U1").await.unwrap();

        assert_eq!(session.chat_id, 42);
        let found = registry.lookup("alice").await.unwrap();
        assert!(Arc::ptr_eq(&found, &session));
    }

    struct FailingDirectory;

    #[async_trait::async_trait]
    impl UserDirectory for FailingDirectory {
        async fn set_chat_id(&self, _tg_user: &str, _chat_id: i64) -> bool {
            false
        }

        async fn set_notification(&self, _tg_user: &str, _enabled: bool) -> bool {
            false
        }

        async fn user_exists(&self, _tg_user: &str) -> bool {
            false
        }

        async fn find_by_client_id(
            &self,
            _cert_id: &str,
        ) -> Result<Option<UserRecord>, CoreError> {
            Err(CoreError::persistence(std::io::Error::other("db unreachable")))
        }
    }

    #[tokio::test]
    async fn directory_failure_is_surfaced_as_internal_not_unauthenticated() {
        let (notify_tx, _notify_rx) = mpsc::channel(8);
        let service = StreamService::new(Arc::new(SessionRegistry::new()), Arc::new(FailingDirectory), notify_tx);

        let err = service.authenticate("alice", "U1").await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Internal);
    }

    #[tokio::test]
    async fn reconnect_evicts_the_prior_session() {
        let directory = InMemoryUserDirectory::new();
        directory.insert(
            "U1",
            UserRecord {
                tg_user: "alice".to_string(),
                chat_id: 42,
                notify_enabled: true,
            },
        );
        let (service, _notify_rx) = service(directory);

        let (first, _channels) = service.authenticate("alice", "U1").await.unwrap();
        let (second, _channels) = service.authenticate("alice", "U1").await.unwrap();

        assert!(first.ctx.is_cancelled());
        assert!(!second.ctx.is_cancelled());
    }
}
