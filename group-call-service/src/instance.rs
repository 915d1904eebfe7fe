use std::sync::{Arc, Weak};

use lib_common_groupcall::types::{
    GroupJoinPayload, GroupJoinResponsePayload, GroupParticipantDescription,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::instrument::WithSubscriber;

use crate::common::logging;
use crate::common::services::devices::{self, AudioDevice, AudioDeviceType};
use crate::descriptor::GroupInstanceDescriptor;
use crate::engine::{VideoCapture, VideoSink};
use crate::error::GroupCallError;
use crate::vc::session::{Command, Session};

/// Handle to a running group call session.
///
/// Every operation is forwarded to the session task and returns once it was
/// applied. After [`GroupInstance::stop`] all operations are no-ops.
/// Dropping the handle stops the session in the background.
pub struct GroupInstance {
    commands: mpsc::UnboundedSender<Command>,
    local_audio_ssrc: u32,
    /// Token notifying of session teardown
    cancellation_token: CancellationToken,
    /// Session task and everything it spawns
    task_tracker: TaskTracker,
}

impl GroupInstance {
    /// Starts the session task. Must be called from within a tokio runtime.
    pub fn new(descriptor: GroupInstanceDescriptor) -> anyhow::Result<Self> {
        let dispatch = logging::session_dispatch(&descriptor.config)?;
        let cancellation_token = CancellationToken::new();
        let task_tracker = TaskTracker::new();
        let local_audio_ssrc = rand::random_range(1..=u32::MAX);
        let (commands, receiver) = mpsc::unbounded_channel();

        let session = Session::new(
            descriptor,
            local_audio_ssrc,
            cancellation_token.clone(),
            task_tracker.clone(),
        );
        let run = session.run(receiver);
        match dispatch {
            Some(dispatch) => task_tracker.spawn(run.with_subscriber(dispatch)),
            None => task_tracker.spawn(run),
        };

        Ok(Self {
            commands,
            local_audio_ssrc,
            cancellation_token,
            task_tracker,
        })
    }

    /// Audio devices of the given direction. Empty when the `cpal` feature is off.
    pub fn audio_devices(device_type: AudioDeviceType) -> Vec<AudioDevice> {
        devices::audio_devices(device_type)
    }

    pub fn local_audio_ssrc(&self) -> u32 {
        self.local_audio_ssrc
    }

    pub fn is_stopped(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Tears the session down and waits for it. Calling it again does nothing.
    pub async fn stop(&self) {
        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        if self.cancellation_token.is_cancelled() {
            return None;
        }
        let (ack, response) = oneshot::channel();
        self.commands.send(command(ack)).ok()?;
        response.await.ok()
    }

    /// Requests the local join payload. `completion` runs once it is ready, or
    /// never if the session stops first.
    pub async fn emit_join_payload(
        &self,
        completion: impl FnOnce(GroupJoinPayload) + Send + 'static,
    ) -> Result<(), GroupCallError> {
        let completion = Box::new(completion);
        self.request(|ack| Command::EmitJoinPayload { completion, ack })
            .await
            .unwrap_or(Ok(()))
    }

    /// Applies the remote join response and replaces the participant list with `participants`.
    pub async fn set_join_response_payload(
        &self,
        payload: GroupJoinResponsePayload,
        participants: Vec<GroupParticipantDescription>,
    ) -> Result<(), GroupCallError> {
        self.request(|ack| Command::SetJoinResponsePayload {
            payload,
            participants,
            ack,
        })
        .await
        .unwrap_or(Ok(()))
    }

    pub async fn add_participants(&self, participants: Vec<GroupParticipantDescription>) {
        self.request(|ack| Command::AddParticipants { participants, ack })
            .await;
    }

    pub async fn remove_ssrcs(&self, ssrcs: Vec<u32>) {
        self.request(|ack| Command::RemoveSsrcs { ssrcs, ack }).await;
    }

    pub async fn set_is_muted(&self, muted: bool) {
        self.request(|ack| Command::SetIsMuted { muted, ack }).await;
    }

    /// Switches the local video source (`None` turns video off). `completion`
    /// receives a join payload describing the capture now in use.
    pub async fn set_video_capture(
        &self,
        capture: Option<Arc<dyn VideoCapture>>,
        completion: impl FnOnce(GroupJoinPayload) + Send + 'static,
    ) {
        let completion = Box::new(completion);
        self.request(|ack| Command::SetVideoCapture {
            capture,
            completion,
            ack,
        })
        .await;
    }

    pub async fn set_audio_input_device(&self, id: impl Into<String>) {
        let id = id.into();
        self.request(|ack| Command::SetAudioInputDevice { id, ack })
            .await;
    }

    pub async fn set_audio_output_device(&self, id: impl Into<String>) {
        let id = id.into();
        self.request(|ack| Command::SetAudioOutputDevice { id, ack })
            .await;
    }

    /// The sink is held weakly; it is attached once `ssrc` is a live video source.
    pub async fn add_incoming_video_output(&self, ssrc: u32, sink: Weak<dyn VideoSink>) {
        self.request(|ack| Command::AddIncomingVideoOutput { ssrc, sink, ack })
            .await;
    }

    /// Playback volume of one remote source, 0.0 to 2.0 with 1.0 unchanged.
    pub async fn set_volume(&self, ssrc: u32, volume: f64) {
        self.request(|ack| Command::SetVolume { ssrc, volume, ack })
            .await;
    }

    pub async fn set_full_size_video_ssrc(&self, ssrc: Option<u32>) {
        self.request(|ack| Command::SetFullSizeVideoSsrc { ssrc, ack })
            .await;
    }

    /// Live participants ordered by endpoint id. Empty once stopped.
    pub async fn participants(&self) -> Vec<GroupParticipantDescription> {
        self.request(|reply| Command::Participants { reply })
            .await
            .unwrap_or_default()
    }
}

impl Drop for GroupInstance {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

impl std::fmt::Debug for GroupInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupInstance")
            .field("local_audio_ssrc", &self.local_audio_ssrc)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
