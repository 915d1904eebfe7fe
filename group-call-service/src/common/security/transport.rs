//! ICE credentials and DTLS identities of both ends of the media transport.

use lib_common_groupcall::types::{
    GroupJoinPayloadFingerprint, GroupJoinResponsePayload, IceCandidate,
};

use crate::common::security::certs::LocalCertificate;
use crate::error::GroupCallError;

/// ice-char from RFC 8839
const ICE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
/// RFC 8839 requires at least 4 characters of ufrag and 22 of password.
pub const UFRAG_LEN: usize = 8;
pub const PWD_LEN: usize = 24;

fn random_ice_string(len: usize) -> String {
    (0..len)
        .map(|_| ICE_CHARS[rand::random_range(0..ICE_CHARS.len())] as char)
        .collect()
}

#[derive(Debug, Clone)]
pub struct LocalTransport {
    pub ufrag: String,
    pub pwd: String,
    pub certificate: LocalCertificate,
}

impl LocalTransport {
    /// Fresh credentials and certificate. CPU bound, run it off the async workers.
    pub fn generate() -> anyhow::Result<Self> {
        Ok(Self {
            ufrag: random_ice_string(UFRAG_LEN),
            pwd: random_ice_string(PWD_LEN),
            certificate: LocalCertificate::generate()?,
        })
    }

    pub fn fingerprints(&self) -> Vec<GroupJoinPayloadFingerprint> {
        vec![self.certificate.fingerprint()]
    }
}

/// Validated remote side of a join response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTransport {
    pub ufrag: String,
    pub pwd: String,
    pub fingerprints: Vec<GroupJoinPayloadFingerprint>,
    pub candidates: Vec<IceCandidate>,
}

impl RemoteTransport {
    /// Malformed candidates are skipped; missing credentials reject the whole response.
    pub fn from_response(response: &GroupJoinResponsePayload) -> Result<Self, GroupCallError> {
        if response.ufrag.trim().is_empty() || response.pwd.trim().is_empty() {
            return Err(GroupCallError::InvalidJoinResponse {
                reason: "missing ICE ufrag or pwd".to_owned(),
            });
        }
        if response.fingerprints.iter().all(|f| f.fingerprint.is_empty()) {
            return Err(GroupCallError::InvalidJoinResponse {
                reason: "no DTLS fingerprint".to_owned(),
            });
        }

        let candidates = response
            .candidates
            .iter()
            .filter_map(|raw| match IceCandidate::try_from(raw) {
                Ok(candidate) => Some(candidate),
                Err(e) => {
                    tracing::warn!("Skipping candidate {:?}: {e}", raw.id);
                    None
                }
            })
            .collect::<Vec<_>>();
        tracing::debug!(
            "Remote transport has {}/{} usable candidates",
            candidates.len(),
            response.candidates.len()
        );

        Ok(Self {
            ufrag: response.ufrag.clone(),
            pwd: response.pwd.clone(),
            fingerprints: response.fingerprints.clone(),
            candidates,
        })
    }
}
