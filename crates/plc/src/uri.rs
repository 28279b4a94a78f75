use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use autorc_protocol::CoreError;

/// A parsed `plc_uri` config value, e.g.
/// `modbus-tcp://10.0.0.5?unit-identifier=1&request-timeout=5000`.
#[derive(Debug, Clone)]
pub struct PlcUri {
    pub socket_addr: SocketAddr,
    pub unit_id: u8,
    pub request_timeout: Duration,
}

const DEFAULT_MODBUS_PORT: u16 = 502;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3_000;

impl PlcUri {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let url = url::Url::parse(raw).map_err(|e| CoreError::ConfigInvalid(format!("invalid plc_uri: {e}")))?;
        if url.scheme() != "modbus-tcp" {
            return Err(CoreError::ConfigInvalid(format!("unsupported plc_uri scheme: {}", url.scheme())));
        }
        let host = url
            .host_str()
            .ok_or_else(|| CoreError::ConfigInvalid("plc_uri missing host".to_string()))?;
        let port = url.port().unwrap_or(DEFAULT_MODBUS_PORT);
        let socket_addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| CoreError::ConfigInvalid(format!("cannot resolve plc_uri host: {e}")))?
            .next()
            .ok_or_else(|| CoreError::ConfigInvalid(format!("no address for plc_uri host: {host}")))?;

        let mut unit_id: u8 = 1;
        let mut request_timeout = Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS);
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "unit-identifier" => {
                    unit_id = value
                        .parse()
                        .map_err(|_| CoreError::ConfigInvalid(format!("invalid unit-identifier: {value}")))?;
                },
                "request-timeout" => {
                    let millis: u64 = value
                        .parse()
                        .map_err(|_| CoreError::ConfigInvalid(format!("invalid request-timeout: {value}")))?;
                    request_timeout = Duration::from_millis(millis);
                },
                _ => {},
            }
        }

        Ok(Self {
            socket_addr,
            unit_id,
            request_timeout,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_uri() {
        let uri = PlcUri::parse("modbus-tcp://127.0.0.1:1502?unit-identifier=3&request-timeout=5000").unwrap();
        assert_eq!(uri.socket_addr.port(), 1502);
        assert_eq!(uri.unit_id, 3);
        assert_eq!(uri.request_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn applies_defaults() {
        let uri = PlcUri::parse("modbus-tcp://127.0.0.1").unwrap();
        assert_eq!(uri.socket_addr.port(), DEFAULT_MODBUS_PORT);
        assert_eq!(uri.unit_id, 1);
    }

    #[test]
    fn rejects_wrong_scheme() {
        assert!(PlcUri::parse("modbus-rtu://127.0.0.1").is_err());
    }
}
