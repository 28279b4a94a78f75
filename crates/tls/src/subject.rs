//! Extraction of the two domain-specific Subject attributes carried on every
//! Gateway client certificate: the Telegram handle (`owner`, OID 2.5.4.32)
//! and the client UUID (`x500-unique-id`, OID 2.5.4.45).

use x509_parser::der_parser::oid::Oid;
use x509_parser::prelude::*;

use crate::error::{Error, Result};

const OID_OWNER: &[u64] = &[2, 5, 4, 32];
const OID_UNIQUE_ID: &[u64] = &[2, 5, 4, 45];

/// The two identity attributes the hub and the gateway both derive from a
/// client certificate's Subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Telegram handle of the certificate owner.
    pub owner: String,
    /// UUID matching the cert's unique-id attribute.
    pub client_id: String,
}

/// Parses a DER-encoded certificate and extracts [`ClientIdentity`] from its
/// Subject.
pub fn extract_identity(cert_der: &[u8]) -> Result<ClientIdentity> {
    let (_, cert) =
        X509Certificate::from_der(cert_der).map_err(|e| Error::CertParse(e.to_string()))?;
    let subject = cert.subject();

    let owner = attribute_value(subject, OID_OWNER).ok_or(Error::MissingAttribute("owner"))?;
    let client_id =
        attribute_value(subject, OID_UNIQUE_ID).ok_or(Error::MissingAttribute("x500-unique-id"))?;

    Ok(ClientIdentity { owner, client_id })
}

/// Parses a PEM-encoded certificate (the first certificate block found) and
/// extracts [`ClientIdentity`] from its Subject.
pub fn extract_identity_from_pem(pem_bytes: &[u8]) -> Result<ClientIdentity> {
    let (_, pem) = parse_x509_pem(pem_bytes).map_err(|e| Error::CertParse(e.to_string()))?;
    extract_identity(&pem.contents)
}

fn attribute_value(subject: &X509Name<'_>, oid: &[u64]) -> Option<String> {
    let oid = Oid::from(oid).ok()?;
    subject
        .iter_by_oid(&oid)
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn self_signed_cert_with_subject(owner: &str, client_id: &str) -> Vec<u8> {
        use rcgen::{CertificateParams, DnType, KeyPair};

        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params
            .distinguished_name
            .push(DnType::CustomDnType(vec![2, 5, 4, 32]), owner);
        params
            .distinguished_name
            .push(DnType::CustomDnType(vec![2, 5, 4, 45]), client_id);
        let cert = params.self_signed(&key).unwrap();
        cert.der().to_vec()
    }

    #[test]
    fn extracts_owner_and_client_id() {
        let der = self_signed_cert_with_subject("alice", "U1");
        let identity = extract_identity(&der).unwrap();
        assert_eq!(identity.owner, "alice");
        assert_eq!(identity.client_id, "U1");
    }

    #[test]
    fn missing_attribute_is_an_error() {
        use rcgen::{CertificateParams, KeyPair};

        let key = KeyPair::generate().unwrap();
        let params = CertificateParams::new(Vec::<String>::new()).unwrap();
        let cert = params.self_signed(&key).unwrap();
        let err = extract_identity(cert.der()).unwrap_err();
        assert!(matches!(err, Error::MissingAttribute(_)));
    }
}
