mod common;

use std::sync::Arc;

use common::*;
use group_call_service::{GroupInstance, GroupInstanceDescriptor, NullMediaEngine};
use lib_common_groupcall::types::GroupParticipantDescription;
use tokio::sync::oneshot;

#[tokio::test]
async fn stop_twice_is_a_no_op() {
    let harness = start(FakeEngine::new());
    negotiate(&harness, vec![GroupParticipantDescription::new("A", 100)]).await;

    harness.instance.stop().await;
    let after_first = harness.engine.calls();
    assert!(harness.instance.is_stopped());
    assert_eq!(after_first.shutdowns, 1);

    harness.instance.stop().await;
    let after_second = harness.engine.calls();
    assert_eq!(after_second.shutdowns, 1);
    assert_eq!(after_second.removed, after_first.removed);
    assert!(harness.instance.participants().await.is_empty());
}

#[tokio::test]
async fn operations_after_stop_succeed_without_effect() {
    let harness = start(FakeEngine::new());
    harness.instance.stop().await;
    let before = harness.engine.calls();

    let (sender, receiver) = oneshot::channel();
    harness
        .instance
        .emit_join_payload(move |offer| {
            let _ = sender.send(offer);
        })
        .await
        .unwrap();
    harness
        .instance
        .set_join_response_payload(join_response(), Vec::new())
        .await
        .unwrap();
    harness
        .instance
        .add_participants(vec![GroupParticipantDescription::new("A", 100)])
        .await;
    harness.instance.remove_ssrcs(vec![100]).await;
    harness.instance.set_is_muted(true).await;
    harness.instance.set_audio_input_device("usb-mic").await;
    harness.instance.set_audio_output_device("speakers").await;
    harness.instance.set_volume(100, 0.5).await;
    harness.instance.set_full_size_video_ssrc(Some(100)).await;
    harness.instance.set_video_capture(None, |_| {}).await;

    assert!(receiver.await.is_err());
    assert!(harness.instance.participants().await.is_empty());
    let after = harness.engine.calls();
    assert_eq!(after.audio_send_enabled, before.audio_send_enabled);
    assert_eq!(after.input_devices, before.input_devices);
    assert_eq!(after.volumes, before.volumes);
    assert_eq!(after.video_captures, before.video_captures);
    assert!(after.remote_transport.is_none());
}

#[tokio::test]
async fn pending_join_completion_is_dropped_on_stop() {
    let (engine, gate) = FakeEngine::gated();
    let harness = start(engine);

    let offer = request_offer(&harness.instance).await.unwrap();
    harness.instance.stop().await;

    assert!(offer.await.is_err());
    assert_eq!(harness.engine.calls().shutdowns, 1);
    gate.open();
}

#[tokio::test]
async fn pending_capture_completion_is_dropped_on_stop() {
    let (engine, gate) = FakeEngine::gated();
    let harness = start(engine);

    let (sender, receiver) = oneshot::channel();
    harness
        .instance
        .set_video_capture(None, move |offer| {
            let _ = sender.send(offer);
        })
        .await;
    harness.instance.stop().await;

    assert!(receiver.await.is_err());
    gate.open();
}

#[tokio::test]
async fn dropping_the_handle_tears_the_session_down() {
    let engine = FakeEngine::new();
    let harness = start(Arc::clone(&engine));
    harness
        .instance
        .add_participants(vec![GroupParticipantDescription::new("A", 100)])
        .await;

    drop(harness.instance);

    eventually(|| engine.calls().shutdowns == 1).await;
}

#[tokio::test]
async fn engine_events_after_stop_are_discarded() {
    let harness = start(FakeEngine::new());
    let events = harness.engine.events();
    harness.instance.stop().await;

    events.network_state_changed(true);
    events.unknown_ssrc(42);

    assert!(harness.recorder.network().is_empty());
    assert!(harness.recorder.descriptions_required().is_empty());
}

#[tokio::test]
async fn sessions_are_independent() {
    let first = GroupInstance::new(GroupInstanceDescriptor::new(
        test_config(),
        NullMediaEngine::factory(),
    ))
    .unwrap();
    let second = start(FakeEngine::new());

    first.stop().await;
    second
        .instance
        .add_participants(vec![GroupParticipantDescription::new("A", 100)])
        .await;
    assert_eq!(second.instance.participants().await.len(), 1);
    second.instance.stop().await;
}
