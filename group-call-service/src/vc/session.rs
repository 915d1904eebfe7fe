//! The task owning a group call session.
//!
//! All session state lives here and is only touched from this task. Public
//! operations arrive as [`Command`]s, the engine reports through its event
//! channel and host callbacks are invoked inline, so they never overlap.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};

use anyhow::Context;
use lib_common_groupcall::types::{
    GroupJoinPayload, GroupJoinPayloadVideoSourceGroup, GroupJoinResponsePayload,
    GroupParticipantDescription,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::instrument::WithSubscriber;

use crate::common::app_config::GroupConfig;
use crate::common::security::transport::{LocalTransport, RemoteTransport};
use crate::descriptor::{GroupInstanceCallbacks, GroupInstanceDescriptor};
use crate::engine::{
    DEFAULT_DEVICE_ID, EngineEvent, EngineEventSender, MediaEngine, VideoCapture, VideoSink,
};
use crate::error::GroupCallError;
use crate::vc::audio_levels::AudioLevelAggregator;
use crate::vc::negotiation::{JoinNegotiator, OfferCompletion};
use crate::vc::participant_registry::{ParticipantRegistry, RegistryChange};
use crate::vc::video_outputs::VideoOutputs;

pub const MAX_VOLUME: f64 = 2.0;

/// Playback gain accepted by the engine. NaN means unity.
pub fn clamp_volume(volume: f64) -> f64 {
    if volume.is_nan() {
        1.0
    } else {
        volume.clamp(0.0, MAX_VOLUME)
    }
}

pub(crate) enum Command {
    EmitJoinPayload {
        completion: OfferCompletion,
        ack: oneshot::Sender<Result<(), GroupCallError>>,
    },
    SetJoinResponsePayload {
        payload: GroupJoinResponsePayload,
        participants: Vec<GroupParticipantDescription>,
        ack: oneshot::Sender<Result<(), GroupCallError>>,
    },
    AddParticipants {
        participants: Vec<GroupParticipantDescription>,
        ack: oneshot::Sender<()>,
    },
    RemoveSsrcs {
        ssrcs: Vec<u32>,
        ack: oneshot::Sender<()>,
    },
    SetIsMuted {
        muted: bool,
        ack: oneshot::Sender<()>,
    },
    SetVideoCapture {
        capture: Option<Arc<dyn VideoCapture>>,
        completion: OfferCompletion,
        ack: oneshot::Sender<()>,
    },
    SetAudioInputDevice {
        id: String,
        ack: oneshot::Sender<()>,
    },
    SetAudioOutputDevice {
        id: String,
        ack: oneshot::Sender<()>,
    },
    AddIncomingVideoOutput {
        ssrc: u32,
        sink: Weak<dyn VideoSink>,
        ack: oneshot::Sender<()>,
    },
    SetVolume {
        ssrc: u32,
        volume: f64,
        ack: oneshot::Sender<()>,
    },
    SetFullSizeVideoSsrc {
        ssrc: Option<u32>,
        ack: oneshot::Sender<()>,
    },
    Participants {
        reply: oneshot::Sender<Vec<GroupParticipantDescription>>,
    },
}

pub(crate) struct Session {
    config: GroupConfig,
    callbacks: GroupInstanceCallbacks,
    engine: Arc<dyn MediaEngine>,
    engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    transport_results: mpsc::UnboundedSender<anyhow::Result<LocalTransport>>,
    transport_ready: mpsc::UnboundedReceiver<anyhow::Result<LocalTransport>>,
    cancellation_token: CancellationToken,
    task_tracker: TaskTracker,

    local_audio_ssrc: u32,
    negotiator: JoinNegotiator,
    pending_join: Option<OfferCompletion>,
    /// `set_video_capture` completions waiting for the local transport
    pending_capture_offers: Vec<OfferCompletion>,
    registry: ParticipantRegistry,
    aggregator: AudioLevelAggregator,
    video_outputs: VideoOutputs,
    video_capture: Option<Arc<dyn VideoCapture>>,

    muted: bool,
    input_device_id: String,
    output_device_id: String,
    /// Requested volumes, also for sources that are not live yet
    volumes: HashMap<u32, f64>,
    full_size_video_ssrc: Option<u32>,
    applied_full_size_video_ssrc: Option<u32>,
    network_connected: bool,
    reported_missing: Vec<u32>,
}

impl Session {
    pub(crate) fn new(
        descriptor: GroupInstanceDescriptor,
        local_audio_ssrc: u32,
        cancellation_token: CancellationToken,
        task_tracker: TaskTracker,
    ) -> Self {
        let GroupInstanceDescriptor {
            config,
            callbacks,
            create_media_engine,
            video_capture,
        } = descriptor;
        let (events, engine_events) = mpsc::unbounded_channel();
        let engine = create_media_engine(EngineEventSender::new(events));
        let (transport_results, transport_ready) = mpsc::unbounded_channel();
        let aggregator = AudioLevelAggregator::new(local_audio_ssrc, config.audio_level_interval());

        Self {
            config,
            callbacks,
            engine,
            engine_events,
            transport_results,
            transport_ready,
            cancellation_token,
            task_tracker,
            local_audio_ssrc,
            negotiator: JoinNegotiator::new(),
            pending_join: None,
            pending_capture_offers: Vec::new(),
            registry: ParticipantRegistry::new(),
            aggregator,
            video_outputs: VideoOutputs::new(),
            video_capture,
            muted: false,
            input_device_id: DEFAULT_DEVICE_ID.to_owned(),
            output_device_id: DEFAULT_DEVICE_ID.to_owned(),
            volumes: HashMap::new(),
            full_size_video_ssrc: None,
            applied_full_size_video_ssrc: None,
            network_connected: false,
            reported_missing: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.start();
        let mut ticker = self.aggregator.ticker();

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::debug!("Session handle dropped");
                        break;
                    }
                },
                Some(result) = self.transport_ready.recv() => self.on_local_transport(result),
                Some(event) = self.engine_events.recv() => self.on_engine_event(event),
                _ = ticker.tick() => self.report_audio_levels(),
            }
        }

        self.teardown();
    }

    fn start(&mut self) {
        tracing::info!(
            "Starting group call session, local audio ssrc {}",
            self.local_audio_ssrc
        );
        self.engine.set_audio_send_enabled(!self.muted);
        self.set_audio_input_device(self.config.initial_input_device_id.clone());
        self.set_audio_output_device(self.config.initial_output_device_id.clone());

        if let Some(capture) = self.video_capture.clone() {
            if let Err(e) = self.engine.set_video_capture(Some(capture)) {
                tracing::warn!("Initial video capture rejected: {e:#}");
                self.video_capture = None;
            }
        }
        self.refresh_local_ssrcs();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::EmitJoinPayload { completion, ack } => {
                let _ = ack.send(self.emit_join_payload(completion));
            }
            Command::SetJoinResponsePayload {
                payload,
                participants,
                ack,
            } => {
                let _ = ack.send(self.set_join_response_payload(payload, participants));
            }
            Command::AddParticipants { participants, ack } => {
                let changes = self.registry.add_participants(participants);
                self.apply_registry_changes(changes);
                self.publish_registry();
                let _ = ack.send(());
            }
            Command::RemoveSsrcs { ssrcs, ack } => {
                let changes = self.registry.remove_ssrcs(&ssrcs);
                self.apply_registry_changes(changes);
                self.publish_registry();
                let _ = ack.send(());
            }
            Command::SetIsMuted { muted, ack } => {
                self.set_is_muted(muted);
                let _ = ack.send(());
            }
            Command::SetVideoCapture {
                capture,
                completion,
                ack,
            } => {
                self.set_video_capture(capture, completion);
                let _ = ack.send(());
            }
            Command::SetAudioInputDevice { id, ack } => {
                self.set_audio_input_device(id);
                let _ = ack.send(());
            }
            Command::SetAudioOutputDevice { id, ack } => {
                self.set_audio_output_device(id);
                let _ = ack.send(());
            }
            Command::AddIncomingVideoOutput { ssrc, sink, ack } => {
                let live = self.registry.is_video_ssrc(ssrc);
                self.video_outputs.add(ssrc, sink, live);
                let _ = ack.send(());
            }
            Command::SetVolume { ssrc, volume, ack } => {
                self.set_volume(ssrc, volume);
                let _ = ack.send(());
            }
            Command::SetFullSizeVideoSsrc { ssrc, ack } => {
                self.full_size_video_ssrc = ssrc;
                self.apply_full_size_hint();
                let _ = ack.send(());
            }
            Command::Participants { reply } => {
                let _ = reply.send(self.registry.participants().cloned().collect());
            }
        }
    }

    fn emit_join_payload(&mut self, completion: OfferCompletion) -> Result<(), GroupCallError> {
        if let Err(e) = self.negotiator.begin_offer() {
            tracing::error!("{e}");
            return Err(e);
        }
        self.pending_join = Some(completion);
        if self.negotiator.needs_local_transport() {
            self.spawn_local_transport();
        } else if self.negotiator.complete_offer_if_ready() {
            self.deliver_join_offer();
        }
        Ok(())
    }

    fn set_join_response_payload(
        &mut self,
        payload: GroupJoinResponsePayload,
        participants: Vec<GroupParticipantDescription>,
    ) -> Result<(), GroupCallError> {
        if let Err(e) = self.negotiator.check_can_apply_response() {
            tracing::error!("{e}");
            return Err(e);
        }
        let remote = RemoteTransport::from_response(&payload)
            .inspect_err(|e| tracing::warn!("{e}"))?;
        self.engine.set_remote_transport(&remote).map_err(|e| {
            tracing::warn!("Remote transport rejected: {e:#}");
            GroupCallError::TransportRejected {
                reason: format!("{e:#}"),
            }
        })?;
        self.negotiator.response_applied();

        let mut changes = self.registry.reset();
        changes.extend(self.registry.add_participants(participants));
        self.apply_registry_changes(changes);
        self.publish_registry();
        tracing::info!("Joined group call with {} participants", self.registry.len());
        Ok(())
    }

    /// Generates credentials and hands them to the engine off the session task.
    fn spawn_local_transport(&self) {
        let engine = Arc::clone(&self.engine);
        let results = self.transport_results.clone();
        let token = self.cancellation_token.clone();

        self.task_tracker.spawn(
            async move {
                let work = tokio::task::spawn_blocking(move || {
                    let transport =
                        LocalTransport::generate().context("cannot generate local credentials")?;
                    engine
                        .set_local_transport(&transport)
                        .context("media engine rejected the local transport")?;
                    Ok::<_, anyhow::Error>(transport)
                });
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("Session stopped while preparing the local transport");
                    }
                    joined = work => {
                        let result = joined
                            .context("local transport worker panicked")
                            .and_then(|result| result);
                        let _ = results.send(result);
                    }
                }
            }
            .with_current_subscriber(),
        );
    }

    fn on_local_transport(&mut self, result: anyhow::Result<LocalTransport>) {
        match result {
            Ok(transport) => {
                tracing::debug!("Local transport ready, ufrag {}", transport.ufrag);
                if self.negotiator.local_transport_ready(transport) {
                    self.deliver_join_offer();
                }
                for completion in std::mem::take(&mut self.pending_capture_offers) {
                    if let Some(offer) = self.build_offer() {
                        completion(offer);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Local transport setup failed: {e:#}");
                self.negotiator.local_transport_failed();
                self.pending_join = None;
                self.pending_capture_offers.clear();
            }
        }
    }

    fn deliver_join_offer(&mut self) {
        let Some(completion) = self.pending_join.take() else {
            return;
        };
        match self.build_offer() {
            Some(offer) => {
                tracing::info!(
                    "Join payload ready, ssrc {} with {} video groups",
                    offer.ssrc,
                    offer.video_source_groups.len()
                );
                completion(offer);
            }
            None => tracing::error!("Join payload requested without a local transport"),
        }
    }

    fn capture_source_groups(&self) -> Vec<GroupJoinPayloadVideoSourceGroup> {
        self.video_capture
            .as_ref()
            .map(|capture| capture.source_groups())
            .unwrap_or_default()
    }

    fn build_offer(&self) -> Option<GroupJoinPayload> {
        self.negotiator.build_offer(
            self.engine.as_ref(),
            self.local_audio_ssrc,
            self.capture_source_groups(),
        )
    }

    fn refresh_local_ssrcs(&mut self) {
        let video = self
            .capture_source_groups()
            .into_iter()
            .flat_map(|group| group.ssrcs);
        let ssrcs: Vec<u32> = std::iter::once(self.local_audio_ssrc).chain(video).collect();
        let changes = self.registry.set_local_ssrcs(ssrcs);
        if !changes.is_empty() {
            self.apply_registry_changes(changes);
            self.publish_registry();
        }
    }

    fn apply_registry_changes(&mut self, changes: Vec<RegistryChange>) {
        for change in changes {
            match change {
                RegistryChange::Added(participant) => {
                    self.engine.add_participant(&participant);
                    if let Some(&volume) = self.volumes.get(&participant.audio_ssrc) {
                        self.engine.set_volume(participant.audio_ssrc, volume);
                    }
                }
                RegistryChange::Removed(participant) => self.engine.remove_participant(&participant),
            }
        }
    }

    /// Pushes the registry state out to the engine, the host and deferred controls.
    fn publish_registry(&mut self) {
        let incoming = self.registry.incoming_video_ssrcs();
        self.engine.set_incoming_video_sources(&incoming);
        (self.callbacks.incoming_video_sources_updated)(&incoming);

        let live: BTreeSet<u32> = incoming.iter().copied().collect();
        for ssrc in self.video_outputs.sync_live(&live) {
            tracing::debug!("Video output attached to ssrc {ssrc}");
        }
        self.apply_full_size_hint();
        self.report_missing_ssrcs();
    }

    fn apply_full_size_hint(&mut self) {
        let target = self
            .full_size_video_ssrc
            .filter(|ssrc| self.registry.is_video_ssrc(*ssrc));
        if target != self.applied_full_size_video_ssrc {
            self.engine.set_full_size_video_ssrc(target);
            self.applied_full_size_video_ssrc = target;
        }
    }

    fn report_missing_ssrcs(&mut self) {
        if self.config.debug_ignore_missing_ssrcs {
            return;
        }
        let missing = self.registry.missing_ssrcs();
        if missing == self.reported_missing {
            return;
        }
        self.reported_missing = missing;
        if !self.reported_missing.is_empty() {
            tracing::debug!("Requesting descriptions for {:?}", self.reported_missing);
            (self.callbacks.participant_descriptions_required)(&self.reported_missing);
        }
    }

    fn set_is_muted(&mut self, muted: bool) {
        if self.muted == muted {
            return;
        }
        self.muted = muted;
        self.engine.set_audio_send_enabled(!muted);
        tracing::info!("Microphone {}", if muted { "muted" } else { "unmuted" });
    }

    fn set_audio_input_device(&mut self, id: String) {
        self.input_device_id =
            select_device("input", id, |id| self.engine.set_audio_input_device(id));
    }

    fn set_audio_output_device(&mut self, id: String) {
        self.output_device_id =
            select_device("output", id, |id| self.engine.set_audio_output_device(id));
    }

    fn set_video_capture(
        &mut self,
        capture: Option<Arc<dyn VideoCapture>>,
        completion: OfferCompletion,
    ) {
        match self.engine.set_video_capture(capture.clone()) {
            Ok(()) => {
                self.video_capture = capture;
                self.refresh_local_ssrcs();
            }
            Err(e) => tracing::warn!("Video capture rejected, keeping the previous one: {e:#}"),
        }

        match self.build_offer() {
            Some(offer) => completion(offer),
            None => {
                self.pending_capture_offers.push(completion);
                if self.negotiator.needs_local_transport() {
                    self.spawn_local_transport();
                }
            }
        }
    }

    fn set_volume(&mut self, ssrc: u32, volume: f64) {
        let volume = clamp_volume(volume);
        self.volumes.insert(ssrc, volume);
        if self.registry.is_audio_ssrc(ssrc) {
            self.engine.set_volume(ssrc, volume);
        } else {
            tracing::debug!("Volume for ssrc {ssrc} deferred until it is live");
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::NetworkStateChanged { connected } => {
                if connected != self.network_connected {
                    self.network_connected = connected;
                    tracing::info!("Network {}", if connected { "connected" } else { "lost" });
                    (self.callbacks.network_state_updated)(connected);
                }
            }
            EngineEvent::IncomingVideoFrame { ssrc, frame } => {
                if !self.video_outputs.deliver(ssrc, &frame) {
                    tracing::trace!("No video output for ssrc {ssrc}");
                }
            }
            EngineEvent::UnknownSsrc { ssrc } => {
                if self.registry.note_missing(ssrc) {
                    self.report_missing_ssrcs();
                }
            }
        }
    }

    fn report_audio_levels(&mut self) {
        let snapshot = self.aggregator.collect(
            self.engine.audio_levels(),
            &self.registry.audio_ssrcs(),
            self.muted,
        );
        (self.callbacks.audio_levels_updated)(&snapshot);
    }

    fn teardown(&mut self) {
        tracing::info!(
            input = %self.input_device_id,
            output = %self.output_device_id,
            "Stopping group call session"
        );
        if self.pending_join.take().is_some() || !self.pending_capture_offers.is_empty() {
            tracing::debug!("Dropping join payload completions");
        }
        self.pending_capture_offers.clear();
        self.video_outputs.clear();
        self.engine.shutdown();
        self.registry.clear();
    }
}

/// Opens `id`, falling back to the system default device when it is unavailable.
/// Returns the id actually in use.
fn select_device(
    kind: &str,
    id: String,
    open: impl Fn(&str) -> anyhow::Result<()>,
) -> String {
    match open(&id) {
        Ok(()) => {
            tracing::debug!("Using {kind} device {id:?}");
            id
        }
        Err(e) if id != DEFAULT_DEVICE_ID => {
            tracing::warn!("Cannot open {kind} device {id:?}, using the system default: {e:#}");
            if let Err(e) = open(DEFAULT_DEVICE_ID) {
                tracing::error!("Default {kind} device unavailable: {e:#}");
            }
            DEFAULT_DEVICE_ID.to_owned()
        }
        Err(e) => {
            tracing::error!("Default {kind} device unavailable: {e:#}");
            id
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn volume_is_clamped() {
        assert_eq!(clamp_volume(0.5), 0.5);
        assert_eq!(clamp_volume(7.0), MAX_VOLUME);
        assert_eq!(clamp_volume(-1.0), 0.0);
        assert_eq!(clamp_volume(f64::NAN), 1.0);
    }

    #[test]
    fn unavailable_device_falls_back_to_default() {
        let opened = Mutex::new(Vec::new());
        let selected = select_device("input", "usb-mic".to_owned(), |id| {
            opened.lock().unwrap().push(id.to_owned());
            if id == DEFAULT_DEVICE_ID {
                Ok(())
            } else {
                anyhow::bail!("no such device")
            }
        });
        assert_eq!(selected, DEFAULT_DEVICE_ID);
        assert_eq!(*opened.lock().unwrap(), vec!["usb-mic".to_owned(), String::new()]);
    }

    #[test]
    fn available_device_is_kept() {
        let selected = select_device("output", "speakers".to_owned(), |_| Ok(()));
        assert_eq!(selected, "speakers");
    }
}
