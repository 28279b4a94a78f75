use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::logger::LoggerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub server_addr: String,
    pub ca_cert: PathBuf,
    pub client_cert: PathBuf,
    pub plc_uri: String,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub notifications: Vec<NotificationConfig>,
    #[serde(default)]
    pub logger: LoggerConfig,
}

/// One writable device the dispatcher can actuate. `device_id` is matched
/// case-insensitively; `values` maps a lowercased symbolic action name
/// (`switchon`, `switchoff`, `toggle`) to the literal register value
/// written for it.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,
    pub tag_address: String,
    pub values: HashMap<String, String>,
}

/// One readable notification source. `tag_address` has the form
/// `<addr>/<bit>`; `text` maps `"true"`/`"false"` to the message emitted on
/// that level (only the `"true"` entry needs to be present for a
/// notification to fire on a rising edge).
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    pub tag_address: String,
    pub text: HashMap<String, String>,
}

impl GatewayConfig {
    /// Applies the named environment-variable overrides from the external
    /// interfaces table: `SERVER_ADDR`, `CA_CERT`, `CLIENT_CERT`, `PLC_URI`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SERVER_ADDR") {
            self.server_addr = v;
        }
        if let Ok(v) = std::env::var("CA_CERT") {
            self.ca_cert = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CLIENT_CERT") {
            self.client_cert = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PLC_URI") {
            self.plc_uri = v;
        }
    }
}
