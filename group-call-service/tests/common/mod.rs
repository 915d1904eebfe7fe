#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc as std_mpsc};
use std::time::Duration;

use group_call_service::common::security::transport::{LocalTransport, RemoteTransport};
use group_call_service::{
    EngineEventSender, GroupConfig, GroupInstance, GroupInstanceDescriptor, GroupLevelUpdate,
    GroupLevelsUpdate, MediaEngine, MediaEngineFactory, NullMediaEngine, VideoCapture,
};
use lib_common_groupcall::types::{
    GroupJoinPayload, GroupJoinPayloadFingerprint, GroupJoinPayloadVideoSourceGroup,
    GroupJoinResponseCandidate, GroupJoinResponsePayload, GroupParticipantDescription,
};
use tokio::sync::oneshot;

/// Everything the session asked the engine to do.
#[derive(Debug, Default, Clone)]
pub struct EngineCalls {
    pub local_transports: Vec<String>,
    pub remote_transport: Option<RemoteTransport>,
    pub audio_send_enabled: Vec<bool>,
    pub input_devices: Vec<String>,
    pub output_devices: Vec<String>,
    pub video_captures: usize,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub incoming_video: Vec<Vec<u32>>,
    pub volumes: Vec<(u32, f64)>,
    pub full_size: Vec<Option<u32>>,
    pub shutdowns: usize,
}

/// Recording media engine with switchable failures.
#[derive(Default)]
pub struct FakeEngine {
    calls: Mutex<EngineCalls>,
    events: Mutex<Option<EngineEventSender>>,
    levels: Mutex<Vec<GroupLevelUpdate>>,
    transport_gate: Mutex<Option<std_mpsc::Receiver<()>>>,
    pub fail_local_transport: AtomicBool,
    pub reject_remote_transport: AtomicBool,
    pub reject_video_capture: AtomicBool,
    pub missing_devices: Mutex<HashSet<String>>,
}

/// Holds the local transport handshake until opened or dropped.
pub struct TransportGate(std_mpsc::Sender<()>);

impl TransportGate {
    pub fn open(self) {
        let _ = self.0.send(());
    }
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated() -> (Arc<Self>, TransportGate) {
        let (sender, receiver) = std_mpsc::channel();
        let engine = Self {
            transport_gate: Mutex::new(Some(receiver)),
            ..Self::default()
        };
        (Arc::new(engine), TransportGate(sender))
    }

    pub fn factory(self: &Arc<Self>) -> MediaEngineFactory {
        let engine = Arc::clone(self);
        Box::new(move |events| {
            *engine.events.lock().unwrap() = Some(events);
            engine as Arc<dyn MediaEngine>
        })
    }

    pub fn calls(&self) -> EngineCalls {
        self.calls.lock().unwrap().clone()
    }

    pub fn events(&self) -> EngineEventSender {
        self.events
            .lock()
            .unwrap()
            .clone()
            .expect("engine was not created by a session")
    }

    pub fn set_levels(&self, levels: Vec<GroupLevelUpdate>) {
        *self.levels.lock().unwrap() = levels;
    }

    pub fn remove_device(&self, id: &str) {
        self.missing_devices.lock().unwrap().insert(id.to_owned());
    }

    fn open_device(&self, id: &str) -> anyhow::Result<()> {
        if self.missing_devices.lock().unwrap().contains(id) {
            anyhow::bail!("device {id} unplugged");
        }
        Ok(())
    }
}

impl MediaEngine for FakeEngine {
    fn set_local_transport(&self, transport: &LocalTransport) -> anyhow::Result<()> {
        let gate = self.transport_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        if self.fail_local_transport.swap(false, Ordering::SeqCst) {
            anyhow::bail!("transport unavailable");
        }
        self.calls
            .lock()
            .unwrap()
            .local_transports
            .push(transport.ufrag.clone());
        Ok(())
    }

    fn set_remote_transport(&self, transport: &RemoteTransport) -> anyhow::Result<()> {
        if self.reject_remote_transport.load(Ordering::SeqCst) {
            anyhow::bail!("fingerprint algorithm not supported");
        }
        self.calls.lock().unwrap().remote_transport = Some(transport.clone());
        Ok(())
    }

    fn set_audio_send_enabled(&self, enabled: bool) {
        self.calls.lock().unwrap().audio_send_enabled.push(enabled);
    }

    fn set_audio_input_device(&self, id: &str) -> anyhow::Result<()> {
        self.open_device(id)?;
        self.calls.lock().unwrap().input_devices.push(id.to_owned());
        Ok(())
    }

    fn set_audio_output_device(&self, id: &str) -> anyhow::Result<()> {
        self.open_device(id)?;
        self.calls.lock().unwrap().output_devices.push(id.to_owned());
        Ok(())
    }

    fn set_video_capture(&self, _capture: Option<Arc<dyn VideoCapture>>) -> anyhow::Result<()> {
        if self.reject_video_capture.load(Ordering::SeqCst) {
            anyhow::bail!("camera busy");
        }
        self.calls.lock().unwrap().video_captures += 1;
        Ok(())
    }

    fn add_participant(&self, participant: &GroupParticipantDescription) {
        self.calls
            .lock()
            .unwrap()
            .added
            .push(participant.endpoint_id.clone());
    }

    fn remove_participant(&self, participant: &GroupParticipantDescription) {
        self.calls
            .lock()
            .unwrap()
            .removed
            .push(participant.endpoint_id.clone());
    }

    fn set_incoming_video_sources(&self, ssrcs: &[u32]) {
        self.calls.lock().unwrap().incoming_video.push(ssrcs.to_vec());
    }

    fn set_volume(&self, ssrc: u32, volume: f64) {
        self.calls.lock().unwrap().volumes.push((ssrc, volume));
    }

    fn set_full_size_video_ssrc(&self, ssrc: Option<u32>) {
        self.calls.lock().unwrap().full_size.push(ssrc);
    }

    fn audio_levels(&self) -> Vec<GroupLevelUpdate> {
        self.levels.lock().unwrap().clone()
    }

    fn shutdown(&self) {
        self.calls.lock().unwrap().shutdowns += 1;
    }
}

/// Host callback invocations, in order.
#[derive(Default)]
pub struct Recorder {
    pub network: Mutex<Vec<bool>>,
    pub levels: Mutex<Vec<GroupLevelsUpdate>>,
    pub incoming_video: Mutex<Vec<Vec<u32>>>,
    pub descriptions_required: Mutex<Vec<Vec<u32>>>,
}

impl Recorder {
    pub fn network(&self) -> Vec<bool> {
        self.network.lock().unwrap().clone()
    }

    pub fn levels(&self) -> Vec<GroupLevelsUpdate> {
        self.levels.lock().unwrap().clone()
    }

    pub fn incoming_video(&self) -> Vec<Vec<u32>> {
        self.incoming_video.lock().unwrap().clone()
    }

    pub fn last_incoming_video(&self) -> Option<Vec<u32>> {
        self.incoming_video.lock().unwrap().last().cloned()
    }

    pub fn descriptions_required(&self) -> Vec<Vec<u32>> {
        self.descriptions_required.lock().unwrap().clone()
    }
}

pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub recorder: Arc<Recorder>,
    pub instance: GroupInstance,
}

pub fn test_config() -> GroupConfig {
    GroupConfig {
        log_level: "debug".to_owned(),
        ..GroupConfig::default()
    }
}

pub fn start(engine: Arc<FakeEngine>) -> Harness {
    start_with(
        engine,
        GroupInstanceDescriptor::new(test_config(), NullMediaEngine::factory()),
    )
}

/// Starts a session from `descriptor`, replacing its engine factory and callbacks.
pub fn start_with(engine: Arc<FakeEngine>, descriptor: GroupInstanceDescriptor) -> Harness {
    let recorder = Arc::new(Recorder::default());
    let (network, levels, incoming, required) = (
        Arc::clone(&recorder),
        Arc::clone(&recorder),
        Arc::clone(&recorder),
        Arc::clone(&recorder),
    );
    let descriptor = GroupInstanceDescriptor {
        create_media_engine: engine.factory(),
        ..descriptor
    }
    .with_network_state_updated(move |connected| network.network.lock().unwrap().push(connected))
    .with_audio_levels_updated(move |update| levels.levels.lock().unwrap().push(update.clone()))
    .with_incoming_video_sources_updated(move |ssrcs| {
        incoming.incoming_video.lock().unwrap().push(ssrcs.to_vec())
    })
    .with_participant_descriptions_required(move |ssrcs| {
        required
            .descriptions_required
            .lock()
            .unwrap()
            .push(ssrcs.to_vec())
    });

    let instance = GroupInstance::new(descriptor).unwrap();
    Harness {
        engine,
        recorder,
        instance,
    }
}

/// Requests the join payload; the receiver resolves when the completion runs.
pub async fn request_offer(
    instance: &GroupInstance,
) -> Result<oneshot::Receiver<GroupJoinPayload>, group_call_service::GroupCallError> {
    let (sender, receiver) = oneshot::channel();
    instance
        .emit_join_payload(move |offer| {
            let _ = sender.send(offer);
        })
        .await?;
    Ok(receiver)
}

pub async fn receive_offer(receiver: oneshot::Receiver<GroupJoinPayload>) -> GroupJoinPayload {
    tokio::time::timeout(Duration::from_secs(10), receiver)
        .await
        .expect("join payload timed out")
        .expect("join payload completion dropped")
}

/// Runs the negotiation to completion with `participants` as the initial list.
pub async fn negotiate(harness: &Harness, participants: Vec<GroupParticipantDescription>) {
    let offer = request_offer(&harness.instance).await.unwrap();
    receive_offer(offer).await;
    harness
        .instance
        .set_join_response_payload(join_response(), participants)
        .await
        .unwrap();
}

pub fn join_response() -> GroupJoinResponsePayload {
    GroupJoinResponsePayload {
        ufrag: "srvU".to_owned(),
        pwd: "serverPasswordServerPassword".to_owned(),
        fingerprints: vec![GroupJoinPayloadFingerprint {
            hash: "sha-256".to_owned(),
            setup: "passive".to_owned(),
            fingerprint: "AB:CD:EF".to_owned(),
        }],
        candidates: vec![
            GroupJoinResponseCandidate {
                port: "3478".to_owned(),
                protocol: "udp".to_owned(),
                network: "1".to_owned(),
                generation: "0".to_owned(),
                id: "1".to_owned(),
                component: "1".to_owned(),
                foundation: "1".to_owned(),
                priority: "2130706431".to_owned(),
                ip: "192.0.2.10".to_owned(),
                candidate_type: "host".to_owned(),
                ..Default::default()
            },
            GroupJoinResponseCandidate {
                id: "broken".to_owned(),
                port: "not a port".to_owned(),
                ..Default::default()
            },
        ],
    }
}

pub fn with_video(endpoint_id: &str, audio: u32, video: &[u32]) -> GroupParticipantDescription {
    GroupParticipantDescription::new(endpoint_id, audio)
        .with_video_source_group(GroupJoinPayloadVideoSourceGroup::new(video, "SIM"))
}

pub struct StaticCapture(pub Vec<GroupJoinPayloadVideoSourceGroup>);

impl VideoCapture for StaticCapture {
    fn source_groups(&self) -> Vec<GroupJoinPayloadVideoSourceGroup> {
        self.0.clone()
    }
}

/// Polls `condition` until it holds, failing after a few seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
