//! Layered YAML + named-environment-variable configuration for the Gateway
//! and the Hub.
//!
//! Config files: `gateway.yaml` / `hub.yaml`. Searched in `./` then the
//! platform config directory. See the external interfaces key tables for
//! the recognized keys and their env-var overrides.

pub mod gateway;
pub mod hub;
pub mod loader;
pub mod logger;

pub use gateway::{DeviceConfig, GatewayConfig, NotificationConfig};
pub use hub::HubConfig;
pub use loader::{config_dir, load_gateway_config, load_hub_config};
pub use logger::{LogFormat, LoggerConfig};
