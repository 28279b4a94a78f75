use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;

use crate::logger::LoggerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    pub port: u16,
    pub bot_token: SecretString,
    pub ca_cert: PathBuf,
    pub server_cert: PathBuf,
    pub server_pkey: PathBuf,
    pub database_uri: String,
    #[serde(default)]
    pub logger: LoggerConfig,
}

impl HubConfig {
    /// Applies the env-var overrides, named by upper-casing the matching
    /// config key (`PORT`, `BOT_TOKEN`, `CA_CERT`, `SERVER_CERT`,
    /// `SERVER_PKEY`, `DATABASE_URI`).
    pub fn apply_env_overrides(&mut self) -> Result<(), std::num::ParseIntError> {
        if let Ok(v) = std::env::var("PORT") {
            self.port = v.parse()?;
        }
        if let Ok(v) = std::env::var("BOT_TOKEN") {
            self.bot_token = SecretString::from(v);
        }
        if let Ok(v) = std::env::var("CA_CERT") {
            self.ca_cert = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SERVER_CERT") {
            self.server_cert = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SERVER_PKEY") {
            self.server_pkey = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DATABASE_URI") {
            self.database_uri = v;
        }
        Ok(())
    }
}
