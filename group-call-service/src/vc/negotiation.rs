//! Join negotiation state machine.
//!
//! `Idle -> AwaitingLocalTransport -> OfferEmitted -> Negotiated`
//!
//! The transport can only be configured once, so every transition is checked
//! and an out of order call is rejected instead of being reordered.

use lib_common_groupcall::types::{GroupJoinPayload, GroupJoinPayloadVideoSourceGroup};

use crate::common::security::transport::LocalTransport;
use crate::engine::MediaEngine;
use crate::error::GroupCallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum NegotiationState {
    Idle,
    /// Join payload requested, credentials still being prepared
    AwaitingLocalTransport,
    OfferEmitted,
    Negotiated,
}

/// Completion receiving a join payload. Invoked at most once; dropped if the session stops first.
pub type OfferCompletion = Box<dyn FnOnce(GroupJoinPayload) + Send>;

#[derive(Debug)]
pub struct JoinNegotiator {
    state: NegotiationState,
    local_transport: Option<LocalTransport>,
    generating: bool,
}

impl Default for JoinNegotiator {
    fn default() -> Self {
        Self {
            state: NegotiationState::Idle,
            local_transport: None,
            generating: false,
        }
    }
}

impl JoinNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn local_transport(&self) -> Option<&LocalTransport> {
        self.local_transport.as_ref()
    }

    /// `emit_join_payload`: only allowed once, from `Idle`.
    pub fn begin_offer(&mut self) -> Result<(), GroupCallError> {
        match self.state {
            NegotiationState::Idle => {
                self.state = NegotiationState::AwaitingLocalTransport;
                Ok(())
            }
            state => Err(GroupCallError::JoinPayloadAlreadyRequested { state }),
        }
    }

    /// Whether a local transport has to be generated before an offer can be built.
    /// Returns true at most once until the generation finishes.
    pub fn needs_local_transport(&mut self) -> bool {
        if self.local_transport.is_some() || self.generating {
            return false;
        }
        self.generating = true;
        true
    }

    /// Stores the generated transport. Returns true when a pending join payload request
    /// just completed.
    pub fn local_transport_ready(&mut self, transport: LocalTransport) -> bool {
        self.generating = false;
        self.local_transport = Some(transport);
        self.complete_offer_if_ready()
    }

    /// Moves a pending join request to `OfferEmitted` once a transport is available.
    pub fn complete_offer_if_ready(&mut self) -> bool {
        if self.state == NegotiationState::AwaitingLocalTransport && self.local_transport.is_some() {
            self.state = NegotiationState::OfferEmitted;
            true
        } else {
            false
        }
    }

    /// Generation failed: a pending join request goes back to `Idle` so it can be retried.
    pub fn local_transport_failed(&mut self) {
        self.generating = false;
        if self.state == NegotiationState::AwaitingLocalTransport {
            self.state = NegotiationState::Idle;
        }
    }

    /// `set_join_response_payload`: only allowed once, after the offer was delivered.
    pub fn check_can_apply_response(&self) -> Result<(), GroupCallError> {
        match self.state {
            NegotiationState::OfferEmitted => Ok(()),
            state => Err(GroupCallError::JoinResponseOutOfOrder { state }),
        }
    }

    pub fn response_applied(&mut self) {
        self.state = NegotiationState::Negotiated;
    }

    /// Builds the offer from the cached transport. `None` until the transport exists.
    pub fn build_offer(
        &self,
        engine: &dyn MediaEngine,
        audio_ssrc: u32,
        video_source_groups: Vec<GroupJoinPayloadVideoSourceGroup>,
    ) -> Option<GroupJoinPayload> {
        let transport = self.local_transport.as_ref()?;
        Some(GroupJoinPayload {
            ufrag: transport.ufrag.clone(),
            pwd: transport.pwd.clone(),
            fingerprints: transport.fingerprints(),
            video_payload_types: engine.video_payload_types(),
            video_extension_map: engine.video_extension_map(),
            ssrc: audio_ssrc,
            video_source_groups,
        })
    }
}
