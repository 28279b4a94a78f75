use std::sync::atomic::{AtomicBool, Ordering};

use autorc_protocol::{ActionEvent, ActionKind, Event, encode_payload, pb};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Channel depth for a session's inbound/outbound event queues. Deep enough
/// to absorb a burst of polls without a slow stream writer stalling the
/// receive loop, shallow enough that a wedged Gateway can't build up an
/// unbounded backlog before the caller notices via backpressure.
const CHANNEL_CAPACITY: usize = 32;

/// Per-connection runtime state, keyed by Telegram owner in the
/// [`crate::SessionRegistry`].
///
/// One `Session` exists per live Gateway connection. It is destroyed when
/// `ctx` cancels, `err` receives a value, or the peer closes the stream.
pub struct Session {
    pub owner_tg: String,
    pub cert_id: String,
    pub chat_id: i64,
    notify_enabled: AtomicBool,
    send_tx: mpsc::Sender<Event>,
    err_tx: mpsc::Sender<autorc_protocol::CoreError>,
    pub ctx: CancellationToken,
}

/// The receiving halves of a freshly constructed [`Session`], owned by the
/// caller that spawns the per-session loops (the stream service).
pub struct SessionChannels {
    pub recv_tx: mpsc::Sender<Event>,
    pub recv_rx: mpsc::Receiver<Event>,
    pub send_rx: mpsc::Receiver<Event>,
    pub err_rx: mpsc::Receiver<autorc_protocol::CoreError>,
}

impl Session {
    /// Builds a new Session plus the channel halves its caller needs to
    /// drive the receive loop, dispatch loop, and notify-bridge.
    #[must_use]
    pub fn new(
        owner_tg: String,
        cert_id: String,
        chat_id: i64,
        notify_enabled: bool,
    ) -> (Self, SessionChannels) {
        let (recv_tx, recv_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (send_tx, send_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(1);

        let session = Self {
            owner_tg,
            cert_id,
            chat_id,
            notify_enabled: AtomicBool::new(notify_enabled),
            send_tx,
            err_tx,
            ctx: CancellationToken::new(),
        };
        let channels = SessionChannels {
            recv_tx,
            recv_rx,
            send_rx,
            err_rx,
        };
        (session, channels)
    }

    #[must_use]
    pub fn notify_enabled(&self) -> bool {
        self.notify_enabled.load(Ordering::Acquire)
    }

    pub fn set_notify_enabled(&self, enabled: bool) {
        self.notify_enabled.store(enabled, Ordering::Release);
    }

    /// Publishes a transport/codec error to the session's single-error
    /// sink, triggering teardown. A send that fails because a value is
    /// already pending is silently ignored: one cause is enough.
    pub fn publish_error(&self, err: autorc_protocol::CoreError) {
        if self.err_tx.try_send(err).is_err() {
            warn!(owner_tg = %self.owner_tg, "session error sink already full, dropping");
        }
    }

    /// Marshals an `ActionEvent` into a `SWITCH` event and enqueues it onto
    /// the session's outbound queue for the dispatch loop to forward. If the
    /// queue is full the action is dropped and logged — no retry at this
    /// layer.
    pub async fn send_action(&self, action: ActionEvent) {
        let payload = match encode_payload(&action) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(owner_tg = %self.owner_tg, %err, "failed to encode action event");
                return;
            },
        };
        let event = Event {
            id: autorc_common::new_event_id(),
            action: pb::Action::Switch as i32,
            payload,
        };
        if self.send_tx.send(event).await.is_err() {
            warn!(owner_tg = %self.owner_tg, "session send queue closed, dropping action");
        }
    }

    #[must_use]
    pub fn switch_on(device_id: impl Into<String>) -> ActionEvent {
        ActionEvent {
            device_id: device_id.into(),
            action: ActionKind::SwitchOn,
        }
    }

    #[must_use]
    pub fn switch_off(device_id: impl Into<String>) -> ActionEvent {
        ActionEvent {
            device_id: device_id.into(),
            action: ActionKind::SwitchOff,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_action_enqueues_a_switch_event() {
        let (session, mut channels) = Session::new("alice".into(), "U1".into(), 42, true);
        session.send_action(Session::switch_on("Lamp001")).await;

        let event = channels.send_rx.recv().await.unwrap();
        assert_eq!(event.action, pb::Action::Switch as i32);
        let decoded: ActionEvent = autorc_protocol::decode_payload(&event.payload).unwrap();
        assert_eq!(decoded.device_id, "Lamp001");
        assert_eq!(decoded.action, ActionKind::SwitchOn);
    }

    #[test]
    fn notify_enabled_toggles() {
        let (session, _channels) = Session::new("alice".into(), "U1".into(), 42, true);
        assert!(session.notify_enabled());
        session.set_notify_enabled(false);
        assert!(!session.notify_enabled());
    }
}
