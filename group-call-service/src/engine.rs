//! Seam between the session core and the real-time media engine.
//!
//! The engine owns capture, codecs, jitter buffers and the ICE/DTLS/SRTP
//! transport. The session only configures it through [`MediaEngine`] and hears
//! back through [`EngineEventSender`].

use std::sync::Arc;

use bytes::Bytes;
use lib_common_groupcall::types::{
    GroupJoinPayloadHeaderExtension, GroupJoinPayloadVideoPayloadFeedbackType,
    GroupJoinPayloadVideoPayloadType, GroupJoinPayloadVideoSourceGroup,
    GroupParticipantDescription,
};
use tokio::sync::mpsc;

use crate::common::security::transport::{LocalTransport, RemoteTransport};
use crate::vc::audio_levels::GroupLevelUpdate;

/// Device id selecting the system default device.
pub const DEFAULT_DEVICE_ID: &str = "";

/// Configuration surface of the media engine.
///
/// Methods are called from the session task (or, for
/// [`MediaEngine::set_local_transport`], from a blocking worker) and must hand
/// work off to the engine's own threads rather than block.
pub trait MediaEngine: Send + Sync {
    /// Installs the local ICE credentials and DTLS certificate. May block while
    /// the engine prepares its transport.
    fn set_local_transport(&self, transport: &LocalTransport) -> anyhow::Result<()>;
    fn set_remote_transport(&self, transport: &RemoteTransport) -> anyhow::Result<()>;

    /// Starts or stops sending the local audio source. Reception is unaffected.
    fn set_audio_send_enabled(&self, enabled: bool);
    /// Fails when the device is unavailable. [`DEFAULT_DEVICE_ID`] should always work.
    fn set_audio_input_device(&self, id: &str) -> anyhow::Result<()>;
    fn set_audio_output_device(&self, id: &str) -> anyhow::Result<()>;
    fn set_video_capture(&self, capture: Option<Arc<dyn VideoCapture>>) -> anyhow::Result<()>;

    fn add_participant(&self, participant: &GroupParticipantDescription);
    fn remove_participant(&self, participant: &GroupParticipantDescription);
    /// Remote video ssrcs the engine should decode, ascending.
    fn set_incoming_video_sources(&self, ssrcs: &[u32]);
    fn set_volume(&self, ssrc: u32, volume: f64);
    fn set_full_size_video_ssrc(&self, ssrc: Option<u32>);

    /// Latest voice activity per audio ssrc (local and remote).
    fn audio_levels(&self) -> Vec<GroupLevelUpdate>;

    fn video_payload_types(&self) -> Vec<GroupJoinPayloadVideoPayloadType> {
        default_video_payload_types()
    }
    fn video_extension_map(&self) -> Vec<GroupJoinPayloadHeaderExtension> {
        default_video_extension_map()
    }

    /// Releases transport and devices. Called exactly once, on teardown.
    fn shutdown(&self);
}

/// A local video source and the ssrcs it sends on.
pub trait VideoCapture: Send + Sync {
    fn source_groups(&self) -> Vec<GroupJoinPayloadVideoSourceGroup>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp_us: i64,
    /// I420 planes, tightly packed
    pub data: Bytes,
}

/// Renderer for one remote video source. Held weakly by the session.
pub trait VideoSink: Send + Sync {
    fn on_frame(&self, ssrc: u32, frame: &VideoFrame);
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    NetworkStateChanged { connected: bool },
    IncomingVideoFrame { ssrc: u32, frame: VideoFrame },
    /// Media arrived on an ssrc nobody described yet.
    UnknownSsrc { ssrc: u32 },
}

/// Handle the engine uses to report back to its session. Events sent after the
/// session stopped are discarded.
#[derive(Debug, Clone)]
pub struct EngineEventSender {
    sender: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineEventSender {
    pub(crate) fn new(sender: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { sender }
    }

    pub fn send(&self, event: EngineEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Session gone, dropping engine event");
        }
    }

    pub fn network_state_changed(&self, connected: bool) {
        self.send(EngineEvent::NetworkStateChanged { connected });
    }

    pub fn incoming_video_frame(&self, ssrc: u32, frame: VideoFrame) {
        self.send(EngineEvent::IncomingVideoFrame { ssrc, frame });
    }

    pub fn unknown_ssrc(&self, ssrc: u32) {
        self.send(EngineEvent::UnknownSsrc { ssrc });
    }
}

/// Builds the session's engine, handing it the event channel back to the session.
pub type MediaEngineFactory = Box<dyn FnOnce(EngineEventSender) -> Arc<dyn MediaEngine> + Send>;

fn feedback(pairs: &[(&str, &str)]) -> Vec<GroupJoinPayloadVideoPayloadFeedbackType> {
    pairs
        .iter()
        .map(|(feedback_type, subtype)| {
            GroupJoinPayloadVideoPayloadFeedbackType::new(feedback_type, subtype)
        })
        .collect()
}

fn rtx(id: u32, apt: u32) -> GroupJoinPayloadVideoPayloadType {
    GroupJoinPayloadVideoPayloadType {
        id,
        name: "rtx".to_owned(),
        clockrate: 90000,
        parameters: vec![("apt".to_owned(), apt.to_string())],
        ..Default::default()
    }
}

/// VP8 and constrained-baseline H264, each with a retransmission payload.
pub fn default_video_payload_types() -> Vec<GroupJoinPayloadVideoPayloadType> {
    let video_feedback = feedback(&[
        ("goog-remb", ""),
        ("transport-cc", ""),
        ("ccm", "fir"),
        ("nack", ""),
        ("nack", "pli"),
    ]);
    vec![
        GroupJoinPayloadVideoPayloadType {
            id: 100,
            name: "VP8".to_owned(),
            clockrate: 90000,
            feedback_types: video_feedback.clone(),
            ..Default::default()
        },
        rtx(101, 100),
        GroupJoinPayloadVideoPayloadType {
            id: 102,
            name: "H264".to_owned(),
            clockrate: 90000,
            feedback_types: video_feedback,
            parameters: vec![
                ("level-asymmetry-allowed".to_owned(), "1".to_owned()),
                ("packetization-mode".to_owned(), "1".to_owned()),
                ("profile-level-id".to_owned(), "42e01f".to_owned()),
            ],
            ..Default::default()
        },
        rtx(103, 102),
    ]
}

pub fn default_video_extension_map() -> Vec<GroupJoinPayloadHeaderExtension> {
    vec![
        GroupJoinPayloadHeaderExtension::new(2, "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time"),
        GroupJoinPayloadHeaderExtension::new(
            3,
            "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01",
        ),
        GroupJoinPayloadHeaderExtension::new(13, "urn:3gpp:video-orientation"),
    ]
}

/// Engine that moves no media. Used by the demo host and for signaling-only sessions.
#[derive(Debug)]
pub struct NullMediaEngine {
    events: EngineEventSender,
}

impl NullMediaEngine {
    pub fn factory() -> MediaEngineFactory {
        Box::new(|events| Arc::new(NullMediaEngine { events }))
    }
}

impl MediaEngine for NullMediaEngine {
    fn set_local_transport(&self, transport: &LocalTransport) -> anyhow::Result<()> {
        tracing::debug!("null engine: local ufrag {}", transport.ufrag);
        Ok(())
    }

    fn set_remote_transport(&self, transport: &RemoteTransport) -> anyhow::Result<()> {
        tracing::debug!(
            "null engine: remote ufrag {} with {} candidates",
            transport.ufrag,
            transport.candidates.len()
        );
        // Nothing to connect, report the transport as up right away.
        self.events.network_state_changed(true);
        Ok(())
    }

    fn set_audio_send_enabled(&self, _enabled: bool) {}

    fn set_audio_input_device(&self, _id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_audio_output_device(&self, _id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_video_capture(&self, _capture: Option<Arc<dyn VideoCapture>>) -> anyhow::Result<()> {
        Ok(())
    }

    fn add_participant(&self, _participant: &GroupParticipantDescription) {}

    fn remove_participant(&self, _participant: &GroupParticipantDescription) {}

    fn set_incoming_video_sources(&self, _ssrcs: &[u32]) {}

    fn set_volume(&self, _ssrc: u32, _volume: f64) {}

    fn set_full_size_video_ssrc(&self, _ssrc: Option<u32>) {}

    fn audio_levels(&self) -> Vec<GroupLevelUpdate> {
        Vec::new()
    }

    fn shutdown(&self) {
        tracing::debug!("null engine: shutdown");
    }
}
