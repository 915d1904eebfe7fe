#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::join::{
    GroupJoinPayloadHeaderExtension, GroupJoinPayloadVideoPayloadType,
    GroupJoinPayloadVideoSourceGroup,
};

/// Media description of one remote participant, as delivered by signaling.
///
/// Participants arrive in batches. An entry with `is_removed` set deletes the
/// participant and retires its endpoint id for the rest of the call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct GroupParticipantDescription {
    #[cfg_attr(feature = "serde", serde(default))]
    pub endpoint_id: String,
    /// 0 when the participant sends no audio
    #[cfg_attr(feature = "serde", serde(default))]
    pub audio_ssrc: u32,
    #[cfg_attr(feature = "serde", serde(rename = "payload-types", default))]
    pub video_payload_types: Vec<GroupJoinPayloadVideoPayloadType>,
    #[cfg_attr(feature = "serde", serde(rename = "rtp-hdrexts", default))]
    pub video_extension_map: Vec<GroupJoinPayloadHeaderExtension>,
    #[cfg_attr(feature = "serde", serde(rename = "ssrc-groups", default))]
    pub video_source_groups: Vec<GroupJoinPayloadVideoSourceGroup>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_removed: bool,
}

impl GroupParticipantDescription {
    pub fn new(endpoint_id: impl Into<String>, audio_ssrc: u32) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            audio_ssrc,
            ..Default::default()
        }
    }

    /// Builds the tombstone entry for `endpoint_id`.
    pub fn removed(endpoint_id: impl Into<String>, audio_ssrc: u32) -> Self {
        Self {
            is_removed: true,
            ..Self::new(endpoint_id, audio_ssrc)
        }
    }

    pub fn with_video_source_group(mut self, group: GroupJoinPayloadVideoSourceGroup) -> Self {
        self.video_source_groups.push(group);
        self
    }

    /// Video ssrcs across all groups, deduplicated, in first-seen order.
    pub fn video_ssrcs(&self) -> Vec<u32> {
        let mut ssrcs: Vec<u32> = Vec::new();
        for ssrc in self
            .video_source_groups
            .iter()
            .flat_map(|group| group.ssrcs.iter().copied())
        {
            if ssrc != 0 && !ssrcs.contains(&ssrc) {
                ssrcs.push(ssrc);
            }
        }
        ssrcs
    }

    /// Audio ssrc (when present) followed by every video ssrc.
    pub fn ssrcs(&self) -> Vec<u32> {
        let mut ssrcs = self.video_ssrcs();
        if self.audio_ssrc != 0 && !ssrcs.contains(&self.audio_ssrc) {
            ssrcs.insert(0, self.audio_ssrc);
        }
        ssrcs
    }
}
