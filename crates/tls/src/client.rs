use std::io::Cursor;
use std::path::Path;

use tonic::transport::{Certificate, ClientTlsConfig, Identity};

use crate::error::{Context as _, Error, Result};

/// Builds the mTLS configuration for the Gateway's `StreamClient`: the
/// shared CA to verify the hub, plus the client identity extracted from the
/// combined cert+key file named by `client_cert`.
pub fn load_client_tls(ca_cert_path: &Path, client_cert_path: &Path) -> Result<ClientTlsConfig> {
    let ca_pem = std::fs::read(ca_cert_path).context("read CA certificate")?;
    let combined_pem = std::fs::read(client_cert_path).context("read client cert+key file")?;

    let (cert_pem, key_pem) = split_cert_and_key(&combined_pem)?;

    let identity = Identity::from_pem(cert_pem, key_pem);
    let ca = Certificate::from_pem(ca_pem);

    Ok(ClientTlsConfig::new().ca_certificate(ca).identity(identity))
}

/// Splits a PEM file containing both a certificate chain and a private key
/// into their two PEM-encoded byte ranges.
fn split_cert_and_key(combined_pem: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let certs = rustls_pemfile::certs(&mut Cursor::new(combined_pem))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("parse client certificate chain")?;
    if certs.is_empty() {
        return Err(Error::message("client cert+key file has no certificate"));
    }
    let cert_pem = certs
        .iter()
        .map(|der| pem_encode("CERTIFICATE", der))
        .collect::<Vec<_>>()
        .join("");

    let key = rustls_pemfile::private_key(&mut Cursor::new(combined_pem))
        .context("parse client private key")?
        .ok_or_else(|| Error::message("client cert+key file has no private key"))?;
    let key_pem = pem_encode("PRIVATE KEY", key.secret_der());

    Ok((cert_pem.into_bytes(), key_pem.into_bytes()))
}

fn pem_encode(label: &str, der: &[u8]) -> String {
    use base64::Engine as _;
    let encoded = base64::engine::general_purpose::STANDARD.encode(der);
    let mut out = format!("-----BEGIN {label}-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}
