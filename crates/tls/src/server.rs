use std::path::Path;

use tonic::transport::{Certificate, Identity, ServerTlsConfig};

use crate::error::{Context as _, Result};

/// Builds the mTLS configuration for the hub's gRPC server: a server
/// identity plus the shared CA used to require and verify client
/// certificates.
pub fn load_server_tls(
    ca_cert_path: &Path,
    server_cert_path: &Path,
    server_key_path: &Path,
) -> Result<ServerTlsConfig> {
    let ca_pem = std::fs::read(ca_cert_path).context("read CA certificate")?;
    let server_cert_pem = std::fs::read(server_cert_path).context("read server certificate")?;
    let server_key_pem = std::fs::read(server_key_path).context("read server private key")?;

    let identity = Identity::from_pem(server_cert_pem, server_key_pem);
    let ca = Certificate::from_pem(ca_pem);

    Ok(ServerTlsConfig::new()
        .identity(identity)
        .client_ca_root(ca))
}
