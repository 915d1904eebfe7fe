//! Voice/video call state owned by a session task.

pub mod audio_levels;
pub mod negotiation;
pub mod participant_registry;
pub(crate) mod session;
pub mod video_outputs;

pub use audio_levels::{AudioLevelAggregator, GroupLevelUpdate, GroupLevelValue, GroupLevelsUpdate};
pub use negotiation::{JoinNegotiator, NegotiationState, OfferCompletion};
pub use participant_registry::{ParticipantRegistry, RegistryChange};
pub use video_outputs::VideoOutputs;
