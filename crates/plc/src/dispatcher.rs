use std::collections::HashMap;
use std::sync::Arc;

use autorc_config::DeviceConfig;
use autorc_protocol::{ActionEvent, ActionKind, CoreError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::addr::TagAddress;
use crate::pool::ConnPool;

struct Device {
    register: u16,
    values: HashMap<String, String>,
}

/// Turns inbound [`ActionEvent`]s into register writes. `device_id` is
/// matched case-insensitively; the symbolic action name is looked up
/// (also case-insensitively) in the device's `values` map for the literal
/// value to write (§4.7).
pub struct Dispatcher {
    pool: Arc<ConnPool>,
    devices: HashMap<String, Device>,
}

impl Dispatcher {
    pub fn new(pool: Arc<ConnPool>, configs: &[DeviceConfig]) -> Result<Self, CoreError> {
        let mut devices = HashMap::with_capacity(configs.len());
        for config in configs {
            let TagAddress::Word { register } = TagAddress::parse_word(&config.tag_address)? else {
                unreachable!("parse_word always returns TagAddress::Word")
            };
            let values = config
                .values
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect();
            devices.insert(config.device_id.to_ascii_lowercase(), Device { register, values });
        }
        Ok(Self { pool, devices })
    }

    /// Runs until the inbound channel closes. Unknown devices, unmapped
    /// actions, and write errors are all logged and dropped — no retry at
    /// this layer.
    pub async fn run(self, cancel: CancellationToken, mut actions: mpsc::Receiver<ActionEvent>) {
        while let Some(action) = actions.recv().await {
            if cancel.is_cancelled() {
                return;
            }
            self.dispatch(&cancel, action).await;
        }
    }

    async fn dispatch(&self, cancel: &CancellationToken, action: ActionEvent) {
        let Some(device) = self.devices.get(&action.device_id.to_ascii_lowercase()) else {
            warn!(device_id = %action.device_id, "unknown device, dropping action");
            return;
        };
        let symbolic = symbolic_name(action.action);
        let Some(raw_value) = device.values.get(symbolic) else {
            warn!(device_id = %action.device_id, action = symbolic, "unmapped action, dropping");
            return;
        };
        let Ok(value) = raw_value.parse::<u16>() else {
            warn!(device_id = %action.device_id, raw_value, "device value is not a valid register word");
            return;
        };
        if let Err(err) = self.pool.write_word(cancel, device.register, value).await {
            warn!(device_id = %action.device_id, %err, "write failed");
        }
    }
}

fn symbolic_name(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Empty => "empty",
        ActionKind::SwitchOn => "switchon",
        ActionKind::SwitchOff => "switchoff",
        ActionKind::Toggle => "toggle",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicU16, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::conn::ModbusConn;

    struct RecordingConn {
        last_write: Arc<AtomicU16>,
    }

    #[async_trait]
    impl ModbusConn for RecordingConn {
        async fn read_word(&mut self, _register: u16) -> Result<u16, CoreError> {
            Ok(0)
        }

        async fn write_word(&mut self, _register: u16, value: u16) -> Result<(), CoreError> {
            self.last_write.store(value, Ordering::SeqCst);
            Ok(())
        }

        async fn ping(&mut self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatches_known_device_case_insensitively() {
        let last_write = Arc::new(AtomicU16::new(0));
        let connector_write = Arc::clone(&last_write);
        let connector: crate::pool::Connector = Arc::new(move || {
            let last_write = Arc::clone(&connector_write);
            Box::pin(async move { Ok(Box::new(RecordingConn { last_write }) as Box<dyn ModbusConn>) })
        });
        let pool = ConnPool::connect(connector, 1, Duration::from_secs(1)).await.unwrap();

        let mut values = StdHashMap::new();
        values.insert("switchon".to_string(), "1".to_string());
        let configs = vec![DeviceConfig {
            device_id: "Lamp001".to_string(),
            tag_address: "HR:7:WORD".to_string(),
            values,
        }];
        let dispatcher = Dispatcher::new(pool, &configs).unwrap();
        let cancel = CancellationToken::new();
        dispatcher
            .dispatch(
                &cancel,
                ActionEvent {
                    device_id: "lamp001".to_string(),
                    action: ActionKind::SwitchOn,
                },
            )
            .await;

        assert_eq!(last_write.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_device_is_dropped_without_error() {
        let connector: crate::pool::Connector = Arc::new(|| {
            Box::pin(async move { Ok(Box::new(RecordingConn { last_write: Arc::new(AtomicU16::new(0)) }) as Box<dyn ModbusConn>) })
        });
        let pool = ConnPool::connect(connector, 1, Duration::from_secs(1)).await.unwrap();
        let dispatcher = Dispatcher::new(pool, &[]).unwrap();
        let cancel = CancellationToken::new();
        dispatcher
            .dispatch(
                &cancel,
                ActionEvent {
                    device_id: "Ghost".to_string(),
                    action: ActionKind::Toggle,
                },
            )
            .await;
    }
}
