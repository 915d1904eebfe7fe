use std::sync::Arc;

use crate::common::app_config::GroupConfig;
use crate::engine::{MediaEngineFactory, VideoCapture};
use crate::vc::audio_levels::GroupLevelsUpdate;

pub type NetworkStateCallback = Box<dyn Fn(bool) + Send>;
pub type AudioLevelsCallback = Box<dyn Fn(&GroupLevelsUpdate) + Send>;
/// Receives a list of ssrcs, ascending.
pub type SsrcListCallback = Box<dyn Fn(&[u32]) + Send>;

/// Host hooks. All of them run on the session task, one at a time, and must not
/// wait on the session they belong to.
pub struct GroupInstanceCallbacks {
    pub network_state_updated: NetworkStateCallback,
    pub audio_levels_updated: AudioLevelsCallback,
    pub incoming_video_sources_updated: SsrcListCallback,
    /// ssrcs carrying media or announced without a participant description
    pub participant_descriptions_required: SsrcListCallback,
}

impl Default for GroupInstanceCallbacks {
    fn default() -> Self {
        Self {
            network_state_updated: Box::new(|_| {}),
            audio_levels_updated: Box::new(|_| {}),
            incoming_video_sources_updated: Box::new(|_| {}),
            participant_descriptions_required: Box::new(|_| {}),
        }
    }
}

/// Everything a session is started with.
pub struct GroupInstanceDescriptor {
    pub config: GroupConfig,
    pub callbacks: GroupInstanceCallbacks,
    pub create_media_engine: MediaEngineFactory,
    pub video_capture: Option<Arc<dyn VideoCapture>>,
}

impl GroupInstanceDescriptor {
    pub fn new(config: GroupConfig, create_media_engine: MediaEngineFactory) -> Self {
        Self {
            config,
            callbacks: GroupInstanceCallbacks::default(),
            create_media_engine,
            video_capture: None,
        }
    }

    pub fn with_network_state_updated(mut self, callback: impl Fn(bool) + Send + 'static) -> Self {
        self.callbacks.network_state_updated = Box::new(callback);
        self
    }

    pub fn with_audio_levels_updated(
        mut self,
        callback: impl Fn(&GroupLevelsUpdate) + Send + 'static,
    ) -> Self {
        self.callbacks.audio_levels_updated = Box::new(callback);
        self
    }

    pub fn with_incoming_video_sources_updated(
        mut self,
        callback: impl Fn(&[u32]) + Send + 'static,
    ) -> Self {
        self.callbacks.incoming_video_sources_updated = Box::new(callback);
        self
    }

    pub fn with_participant_descriptions_required(
        mut self,
        callback: impl Fn(&[u32]) + Send + 'static,
    ) -> Self {
        self.callbacks.participant_descriptions_required = Box::new(callback);
        self
    }

    pub fn with_video_capture(mut self, capture: Arc<dyn VideoCapture>) -> Self {
        self.video_capture = Some(capture);
        self
    }
}

impl std::fmt::Debug for GroupInstanceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupInstanceDescriptor")
            .field("config", &self.config)
            .field("video_capture", &self.video_capture.is_some())
            .finish_non_exhaustive()
    }
}
