use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::Context;
use tracing::Dispatch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

use crate::common::app_config::{GroupConfig, LogFormat};

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

fn file_layer(config: &GroupConfig) -> anyhow::Result<Option<BoxedLayer>> {
    let Some(path) = config.log_file() else {
        return Ok(None);
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;
    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(false)
        .with_writer(Arc::new(file))
        .with_filter(LevelFilter::from_level(config.get_log_level()));
    Ok(Some(layer.boxed()))
}

fn stdout_layer(config: &GroupConfig) -> BoxedLayer {
    // RUST_LOG directives win over the configured level.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.get_log_level()).into())
        .from_env_lossy();
    match config.log_format {
        LogFormat::Full => tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// Installs the process wide subscriber used by the demo host.
pub fn setup_tracing_subscriber(config: &GroupConfig) -> anyhow::Result<()> {
    let mut layers = vec![stdout_layer(config)];
    layers.extend(file_layer(config)?);
    let registry = tracing_subscriber::registry().with(layers);

    tracing::subscriber::set_global_default(registry)
        .context("a global tracing subscriber is already installed")?;

    tracing::debug!("Set up tracing subscriber");
    Ok(())
}

/// Subscriber for a single session's task, writing to the configured log path.
///
/// Returns `None` when no log path is configured; the session then logs through
/// whatever subscriber the host installed.
pub fn session_dispatch(config: &GroupConfig) -> anyhow::Result<Option<Dispatch>> {
    let Some(file_layer) = file_layer(config)? else {
        return Ok(None);
    };
    let registry = tracing_subscriber::registry().with(file_layer);
    Ok(Some(Dispatch::new(registry)))
}
