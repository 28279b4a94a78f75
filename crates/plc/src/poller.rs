use std::sync::Arc;
use std::time::Duration;

use autorc_config::NotificationConfig;
use autorc_protocol::{CoreError, NotifyEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::addr::TagAddress;
use crate::pool::ConnPool;

const POLL_PACING: Duration = Duration::from_millis(100);

struct Tuple {
    register: u16,
    bit: u8,
    text_true: Option<String>,
    last_level: bool,
}

/// Rising-edge detector over a fixed list of `{tag_address, bit}` tuples.
/// Each cycle reads every tuple's word, extracts its bit, and emits a
/// [`NotifyEvent`] only on a `false -> true` transition (§4.7).
pub struct Poller {
    pool: Arc<ConnPool>,
    tuples: Vec<Tuple>,
    notify_tx: mpsc::Sender<NotifyEvent>,
}

impl Poller {
    pub fn new(
        pool: Arc<ConnPool>,
        configs: &[NotificationConfig],
        notify_tx: mpsc::Sender<NotifyEvent>,
    ) -> Result<Self, CoreError> {
        let mut tuples = Vec::with_capacity(configs.len());
        for config in configs {
            let TagAddress::Bit { register, bit } = TagAddress::parse_bit(&config.tag_address)? else {
                unreachable!("parse_bit always returns TagAddress::Bit")
            };
            tuples.push(Tuple {
                register,
                bit,
                text_true: config.text.get("true").cloned(),
                last_level: false,
            });
        }
        Ok(Self { pool, tuples, notify_tx })
    }

    /// Runs until `cancel` fires or the outbound channel closes.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            for tuple in &mut self.tuples {
                if cancel.is_cancelled() {
                    return;
                }

                match self.pool.read_word(&cancel, tuple.register).await {
                    Ok(word) => {
                        let level = (word >> tuple.bit) & 1 == 1;
                        if !tuple.last_level && level {
                            match &tuple.text_true {
                                Some(text) => {
                                    let event = NotifyEvent { text: text.clone() };
                                    if self.notify_tx.send(event).await.is_err() {
                                        warn!("notify channel closed, stopping poller");
                                        return;
                                    }
                                },
                                None => debug!(register = tuple.register, "rising edge with no configured text"),
                            }
                        }
                        tuple.last_level = level;
                    },
                    Err(err) => {
                        warn!(register = tuple.register, %err, "poll read failed, skipping this cycle");
                    },
                }

                tokio::time::sleep(POLL_PACING).await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU16, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::conn::ModbusConn;

    struct SequenceConn {
        words: Arc<[AtomicU16]>,
        index: usize,
    }

    #[async_trait]
    impl ModbusConn for SequenceConn {
        async fn read_word(&mut self, _register: u16) -> Result<u16, CoreError> {
            Ok(self.words[self.index].load(Ordering::SeqCst))
        }

        async fn write_word(&mut self, _register: u16, _value: u16) -> Result<(), CoreError> {
            Ok(())
        }

        async fn ping(&mut self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn emits_exactly_one_notification_per_rising_edge() {
        let levels: Arc<[AtomicU16]> = Arc::from(vec![AtomicU16::new(0)]);
        let sequence = [0u16, 0, 1, 1, 0, 1];

        let connector_levels = Arc::clone(&levels);
        let connector: crate::pool::Connector = Arc::new(move || {
            let levels = Arc::clone(&connector_levels);
            Box::pin(async move { Ok(Box::new(SequenceConn { words: levels, index: 0 }) as Box<dyn ModbusConn>) })
        });

        let pool = ConnPool::connect(connector, 1, Duration::from_secs(1)).await.unwrap();
        let mut text = HashMap::new();
        text.insert("true".to_string(), "door open".to_string());
        let configs = vec![NotificationConfig {
            tag_address: "0x0/0".to_string(),
            text,
        }];
        let (tx, mut rx) = mpsc::channel(8);
        let poller = Poller::new(Arc::clone(&pool), &configs, tx).unwrap();

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(poller.run(run_cancel));

        let mut emitted = 0usize;
        for level in sequence {
            levels[0].store(level, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(150)).await;
            while rx.try_recv().is_ok() {
                emitted += 1;
            }
        }
        cancel.cancel();
        let _ = handle.await;

        // Rising edges in `sequence`: 0->1 (idx2), 0->1 (idx5) = 2.
        assert_eq!(emitted, 2);
    }
}
