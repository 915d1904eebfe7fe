//! Session core of a group voice/video call.
//!
//! A [`GroupInstance`] negotiates the join with the signaling server, tracks
//! who sends on which ssrc, reports voice activity and forwards the host's
//! control requests to a [`MediaEngine`].

pub mod common {
    pub mod app_config;
    pub mod logging;
    pub mod security {
        pub mod certs;
        pub mod transport;
    }
    pub mod services {
        pub mod devices;
    }
}
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod instance;
pub mod vc;

pub use common::app_config::GroupConfig;
pub use common::services::devices::{AudioDevice, AudioDeviceType};
pub use descriptor::{GroupInstanceCallbacks, GroupInstanceDescriptor};
pub use engine::{
    EngineEvent, EngineEventSender, MediaEngine, MediaEngineFactory, NullMediaEngine,
    VideoCapture, VideoFrame, VideoSink,
};
pub use error::GroupCallError;
pub use instance::GroupInstance;
pub use vc::audio_levels::{GroupLevelUpdate, GroupLevelValue, GroupLevelsUpdate};
pub use vc::negotiation::NegotiationState;
pub use vc::session::{MAX_VOLUME, clamp_volume};
