//! Signaling payloads exchanged while joining a group call.
//!
//! The host transports these records over whatever signaling channel it uses.
//! Enable the `serde` feature to get the JSON shape used on the wire.

pub mod candidate;
pub mod join;
pub mod participant;
pub mod response;

pub mod types {
    pub use crate::candidate::{CandidateError, CandidateType, IceCandidate};
    pub use crate::join::{
        GroupJoinPayload, GroupJoinPayloadFingerprint, GroupJoinPayloadHeaderExtension,
        GroupJoinPayloadVideoPayloadFeedbackType, GroupJoinPayloadVideoPayloadType,
        GroupJoinPayloadVideoSourceGroup,
    };
    pub use crate::participant::GroupParticipantDescription;
    pub use crate::response::{GroupJoinResponseCandidate, GroupJoinResponsePayload};
}
