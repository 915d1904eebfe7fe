//! Local join offer sent by an endpoint when it enters a group call.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Certificate fingerprint used to authenticate the DTLS channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupJoinPayloadFingerprint {
    /// Hash function name, e.g. `sha-256`
    pub hash: String,
    /// DTLS role: `active`, `passive` or `actpass`
    pub setup: String,
    /// Colon separated upper-case hex digest
    pub fingerprint: String,
}

/// A set of ssrcs sharing a relationship (`SIM` simulcast layers, `FID` retransmission pairs).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupJoinPayloadVideoSourceGroup {
    #[cfg_attr(feature = "serde", serde(rename = "sources"))]
    pub ssrcs: Vec<u32>,
    pub semantics: String,
}

impl GroupJoinPayloadVideoSourceGroup {
    pub fn new(ssrcs: impl Into<Vec<u32>>, semantics: impl Into<String>) -> Self {
        Self {
            ssrcs: ssrcs.into(),
            semantics: semantics.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupJoinPayloadVideoPayloadFeedbackType {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub feedback_type: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub subtype: String,
}

impl GroupJoinPayloadVideoPayloadFeedbackType {
    pub fn new(feedback_type: &str, subtype: &str) -> Self {
        Self {
            feedback_type: feedback_type.to_owned(),
            subtype: subtype.to_owned(),
        }
    }
}

/// One advertised RTP payload type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupJoinPayloadVideoPayloadType {
    pub id: u32,
    pub name: String,
    pub clockrate: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub channels: u32,
    #[cfg_attr(feature = "serde", serde(rename = "rtcp-fbs", default))]
    pub feedback_types: Vec<GroupJoinPayloadVideoPayloadFeedbackType>,
    /// fmtp parameters, in the order they were advertised
    #[cfg_attr(feature = "serde", serde(default))]
    pub parameters: Vec<(String, String)>,
}

/// RTP header extension id to uri mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupJoinPayloadHeaderExtension {
    pub id: u32,
    pub uri: String,
}

impl GroupJoinPayloadHeaderExtension {
    pub fn new(id: u32, uri: &str) -> Self {
        Self {
            id,
            uri: uri.to_owned(),
        }
    }
}

/// The offer an endpoint hands to the signaling server. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupJoinPayload {
    pub ufrag: String,
    pub pwd: String,
    pub fingerprints: Vec<GroupJoinPayloadFingerprint>,

    #[cfg_attr(feature = "serde", serde(rename = "payload-types", default))]
    pub video_payload_types: Vec<GroupJoinPayloadVideoPayloadType>,
    #[cfg_attr(feature = "serde", serde(rename = "rtp-hdrexts", default))]
    pub video_extension_map: Vec<GroupJoinPayloadHeaderExtension>,
    /// Local audio ssrc
    pub ssrc: u32,
    #[cfg_attr(feature = "serde", serde(rename = "ssrc-groups", default))]
    pub video_source_groups: Vec<GroupJoinPayloadVideoSourceGroup>,
}

impl GroupJoinPayload {
    /// Every video ssrc advertised by this payload, in group order.
    pub fn video_ssrcs(&self) -> impl Iterator<Item = u32> + '_ {
        self.video_source_groups
            .iter()
            .flat_map(|group| group.ssrcs.iter().copied())
    }
}
