//! Demo host: joins a group call without media.
//!
//! Prints the join payload as one JSON line, reads the join response as one JSON
//! line from stdin and keeps the session up until Ctrl-C.

use std::io::{self, BufRead};

use anyhow::Context;
use group_call_service::common::logging::setup_tracing_subscriber;
use group_call_service::{
    AudioDeviceType, GroupConfig, GroupInstance, GroupInstanceDescriptor, NullMediaEngine,
};
use lib_common_groupcall::types::GroupJoinResponsePayload;
use tokio::signal;
use tokio::sync::oneshot;

fn main() {
    let config = match GroupConfig::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ::std::process::exit(2);
        }
    };
    let code = {
        if let Err(e) = run(config) {
            eprintln!("ERROR: {e:#}");
            1
        } else {
            0
        }
    };
    ::std::process::exit(code);
}

#[tokio::main]
async fn run(config: GroupConfig) -> anyhow::Result<()> {
    setup_tracing_subscriber(&config)?;
    for device in GroupInstance::audio_devices(AudioDeviceType::Input) {
        tracing::info!("Input device: {}", device.name);
    }
    for device in GroupInstance::audio_devices(AudioDeviceType::Output) {
        tracing::info!("Output device: {}", device.name);
    }

    let descriptor = GroupInstanceDescriptor::new(config, NullMediaEngine::factory())
        .with_network_state_updated(|connected| tracing::info!("Network connected: {connected}"))
        .with_audio_levels_updated(|levels| {
            tracing::trace!("Levels for {} sources", levels.updates.len())
        })
        .with_incoming_video_sources_updated(|ssrcs| {
            tracing::info!("Incoming video sources: {ssrcs:?}")
        })
        .with_participant_descriptions_required(|ssrcs| {
            tracing::info!("Participant descriptions required for {ssrcs:?}")
        });
    let instance = GroupInstance::new(descriptor)?;

    let (offer_sender, offer) = oneshot::channel();
    instance
        .emit_join_payload(move |payload| {
            let _ = offer_sender.send(payload);
        })
        .await?;
    let offer = offer
        .await
        .context("session stopped before the join payload was ready")?;
    println!("{}", serde_json::to_string(&offer)?);

    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).map(|_| line)
    })
    .await?
    .context("cannot read the join response")?;
    let response: GroupJoinResponsePayload =
        serde_json::from_str(line.trim()).context("invalid join response")?;
    instance.set_join_response_payload(response, Vec::new()).await?;

    match signal::ctrl_c().await {
        Ok(()) => tracing::info!("Interrupt detected!"),
        Err(e) => tracing::error!("Cannot listen for interrupt, leaving: {e}"),
    }
    instance.stop().await;
    Ok(())
}
