//! Join response returned by the signaling server.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::join::GroupJoinPayloadFingerprint;

/// A connectivity candidate exactly as the server sends it: every field is a string.
///
/// Use [`crate::candidate::IceCandidate::try_from`] to get a typed candidate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GroupJoinResponseCandidate {
    pub port: String,
    pub protocol: String,
    pub network: String,
    pub generation: String,
    pub id: String,
    pub component: String,
    pub foundation: String,
    pub priority: String,
    pub ip: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub candidate_type: String,

    #[cfg_attr(feature = "serde", serde(rename = "tcpType"))]
    pub tcp_type: String,
    #[cfg_attr(feature = "serde", serde(rename = "rel-addr"))]
    pub rel_addr: String,
    #[cfg_attr(feature = "serde", serde(rename = "rel-port"))]
    pub rel_port: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupJoinResponsePayload {
    pub ufrag: String,
    pub pwd: String,
    pub fingerprints: Vec<GroupJoinPayloadFingerprint>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub candidates: Vec<GroupJoinResponseCandidate>,
}
