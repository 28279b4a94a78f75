use std::path::{Path, PathBuf};

use autorc_protocol::CoreError;
use tracing::debug;

use crate::gateway::GatewayConfig;
use crate::hub::HubConfig;

/// Returns the user-global config directory, platform-specific
/// (`~/.config/autorc/` on Linux).
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "autorc").map(|d| d.config_dir().to_path_buf())
}

/// Loads the Gateway's YAML config from `path`, or — if `path` is `None` —
/// from `./gateway.yaml` and then the user-global config directory, and
/// applies the named environment-variable overrides.
pub fn load_gateway_config(path: Option<&Path>) -> Result<GatewayConfig, CoreError> {
    let resolved = resolve_path(path, "gateway.yaml")?;
    let raw = std::fs::read_to_string(&resolved).map_err(|e| {
        CoreError::ConfigInvalid(format!("read {}: {e}", resolved.display()))
    })?;
    let mut config: GatewayConfig = serde_yaml::from_str(&raw)
        .map_err(|e| CoreError::ConfigInvalid(format!("parse {}: {e}", resolved.display())))?;
    config.apply_env_overrides();
    debug!(path = %resolved.display(), "loaded gateway config");
    Ok(config)
}

/// Loads the Hub's YAML config analogously to [`load_gateway_config`].
pub fn load_hub_config(path: Option<&Path>) -> Result<HubConfig, CoreError> {
    let resolved = resolve_path(path, "hub.yaml")?;
    let raw = std::fs::read_to_string(&resolved).map_err(|e| {
        CoreError::ConfigInvalid(format!("read {}: {e}", resolved.display()))
    })?;
    let mut config: HubConfig = serde_yaml::from_str(&raw)
        .map_err(|e| CoreError::ConfigInvalid(format!("parse {}: {e}", resolved.display())))?;
    config
        .apply_env_overrides()
        .map_err(|e| CoreError::ConfigInvalid(format!("invalid PORT override: {e}")))?;
    debug!(path = %resolved.display(), "loaded hub config");
    Ok(config)
}

fn resolve_path(explicit: Option<&Path>, filename: &str) -> Result<PathBuf, CoreError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let local = PathBuf::from(filename);
    if local.exists() {
        return Ok(local);
    }
    if let Some(dir) = config_dir() {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(CoreError::ConfigInvalid(format!(
        "no config file found: ./{filename} or $XDG_CONFIG_HOME/autorc/{filename}"
    )))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const GATEWAY_YAML: &str = r"
server_addr: hub.example.com:9443
ca_cert: /etc/autorc/ca.pem
client_cert: /etc/autorc/client.pem
plc_uri: modbus-tcp://10.0.0.5?unit-identifier=1
devices:
  - device_id: Lamp001
    tag_address: HR:7:WORD
    values:
      switchon: '1'
      switchoff: '0'
notifications:
  - tag_address: 0x1/2
    text:
      'true': door open
";

    #[test]
    fn load_gateway_config_parses_devices_and_notifications() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(&path, GATEWAY_YAML).unwrap();

        let config = load_gateway_config(Some(&path)).unwrap();
        assert_eq!(config.server_addr, "hub.example.com:9443");
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].device_id, "Lamp001");
        assert_eq!(config.notifications[0].tag_address, "0x1/2");
    }

    #[test]
    fn missing_config_file_is_config_invalid() {
        let err = load_gateway_config(Some(Path::new("/nonexistent/gateway.yaml"))).unwrap_err();
        assert!(matches!(err, CoreError::ConfigInvalid(_)));
    }

    #[test]
    #[allow(unsafe_code)]
    fn gateway_env_overrides_apply_in_order() {
        // SAFETY (test-only): no other test in this crate reads or writes
        // these specific env vars concurrently.
        unsafe {
            std::env::set_var("SERVER_ADDR", "override.example.com:1");
            std::env::set_var("PLC_URI", "modbus-tcp://override");
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(&path, GATEWAY_YAML).unwrap();
        let config = load_gateway_config(Some(&path)).unwrap();

        unsafe {
            std::env::remove_var("SERVER_ADDR");
            std::env::remove_var("PLC_URI");
        }

        assert_eq!(config.server_addr, "override.example.com:1");
        assert_eq!(config.plc_uri, "modbus-tcp://override");
    }
}
