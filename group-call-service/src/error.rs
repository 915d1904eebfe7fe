use derive_more::{Display, Error};

use crate::vc::negotiation::NegotiationState;

/// Errors returned to the host by a group call session.
///
/// The negotiation variants are contract violations: the host called the
/// negotiation operations out of order. Recoverable conditions (missing devices,
/// unknown ssrcs, network loss) never show up here.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum GroupCallError {
    #[display("join payload requested twice (negotiation is {state})")]
    JoinPayloadAlreadyRequested { state: NegotiationState },
    #[display("join response applied while negotiation is {state}; emit the join payload first")]
    JoinResponseOutOfOrder { state: NegotiationState },
    #[display("invalid join response: {reason}")]
    InvalidJoinResponse { reason: String },
    #[display("media engine rejected the remote transport: {reason}")]
    TransportRejected { reason: String },
}

impl GroupCallError {
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::JoinPayloadAlreadyRequested { .. } | Self::JoinResponseOutOfOrder { .. }
        )
    }
}
