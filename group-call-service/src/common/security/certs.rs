//! This module generates the per-session certificate used for DTLS.

use anyhow::Context;
use lib_common_groupcall::types::GroupJoinPayloadFingerprint;
use sha2::{Digest, Sha256};

pub const FINGERPRINT_HASH: &str = "sha-256";
/// We always open the DTLS handshake towards the conference server.
pub const LOCAL_SETUP_ROLE: &str = "active";

/// Self-signed certificate plus its private key, both DER encoded.
#[derive(Clone)]
pub struct LocalCertificate {
    pub certificate_der: Vec<u8>,
    pub private_key_der: Vec<u8>,
}

impl std::fmt::Debug for LocalCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCertificate")
            .field("fingerprint", &self.fingerprint_value())
            .finish_non_exhaustive()
    }
}

impl LocalCertificate {
    pub fn generate() -> anyhow::Result<Self> {
        let key_pair = rcgen::KeyPair::generate().context("failed to generate key pair")?;
        let params = rcgen::CertificateParams::new(vec!["group-call".to_string()])
            .context("invalid certificate parameters")?;
        let cert = params
            .self_signed(&key_pair)
            .context("failed to self-sign certificate")?;
        tracing::debug!("Generated session certificate");
        Ok(Self {
            certificate_der: cert.der().to_vec(),
            private_key_der: key_pair.serialize_der(),
        })
    }

    /// Upper-case hex SHA-256 digest of the certificate, bytes separated by colons.
    pub fn fingerprint_value(&self) -> String {
        Sha256::digest(&self.certificate_der)
            .iter()
            .map(|byte| format!("{byte:02X}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn fingerprint(&self) -> GroupJoinPayloadFingerprint {
        GroupJoinPayloadFingerprint {
            hash: FINGERPRINT_HASH.to_owned(),
            setup: LOCAL_SETUP_ROLE.to_owned(),
            fingerprint: self.fingerprint_value(),
        }
    }
}
