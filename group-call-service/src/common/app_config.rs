use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap_serde_derive::{
    ClapSerde,
    clap::{self, Parser},
};
use serde::{Deserialize, Serialize};
use tracing::Level;

#[cfg(test)]
pub const CONFIG_PATH_ENV: &'static str = "TEST_GROUP_CALL_CONFIG_PATH";

#[cfg(not(test))]
pub const CONFIG_PATH_ENV: &'static str = "GROUP_CALL_CONFIG_PATH";

/// Shortest level reporting cadence accepted. `tokio::time::interval` panics on zero.
const MIN_AUDIO_LEVEL_INTERVAL: Duration = Duration::from_millis(1);

/// Command line of the demo host.
#[derive(Parser, Deserialize, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct GroupConfigArgs {
    /// Path pointing to config.yaml
    #[clap(long = "config", default_value = "config.yaml")]
    pub config_path: std::path::PathBuf,

    #[command(flatten)]
    pub config: <GroupConfig as ClapSerde>::Opt,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, derive_more::FromStr, PartialEq)]
#[from_str(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// Startup parameters of a group call session.
#[derive(ClapSerde, Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// trace, debug, info, warn or error
    #[clap(short, long)]
    #[default("info".to_string())]
    pub log_level: String,

    #[clap(long = "log-format")]
    pub log_format: LogFormat,

    /// File receiving this session's logs. Empty disables the session log sink.
    #[clap(long = "log-path")]
    pub log_path: PathBuf,

    /// Microphone to open on start. Empty selects the system default.
    #[clap(long = "input-device")]
    pub initial_input_device_id: String,

    /// Speaker to open on start. Empty selects the system default.
    #[clap(long = "output-device")]
    pub initial_output_device_id: String,

    /// Stop asking signaling for descriptions of unknown ssrcs
    #[clap(long = "ignore-missing-ssrcs")]
    pub debug_ignore_missing_ssrcs: bool,

    /// Audio level reporting cadence in milliseconds
    #[clap(long = "level-interval")]
    #[default(100)]
    pub audio_level_interval_ms: u64,
}

impl std::fmt::Debug for ClapSerdeOptionalGroupConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClapSerdeOptionalGroupConfig")
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("log_path", &self.log_path)
            .field("initial_input_device_id", &self.initial_input_device_id)
            .field("initial_output_device_id", &self.initial_output_device_id)
            .field("debug_ignore_missing_ssrcs", &self.debug_ignore_missing_ssrcs)
            .field("audio_level_interval_ms", &self.audio_level_interval_ms)
            .finish()
    }
}
/// derive doesn't work on the generated struct
impl Clone for ClapSerdeOptionalGroupConfig {
    fn clone(&self) -> Self {
        Self {
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
            log_path: self.log_path.clone(),
            initial_input_device_id: self.initial_input_device_id.clone(),
            initial_output_device_id: self.initial_output_device_id.clone(),
            debug_ignore_missing_ssrcs: self.debug_ignore_missing_ssrcs.clone(),
            audio_level_interval_ms: self.audio_level_interval_ms.clone(),
        }
    }
}

impl GroupConfig {
    /// Config takes priority from:
    /// 1. CLI options (eg. `--level-interval 50` wins over config.yaml)
    /// 2. YAML config from ENV GROUP_CALL_CONFIG_PATH
    /// 3. YAML config from CLI if no env is provided (--config)
    /// 4. Default config YAML file - ./config.yaml
    pub fn new() -> anyhow::Result<Self> {
        let mut args = GroupConfigArgs::try_parse()?;
        Self::from_args(&mut args)
    }

    /// Testable constructor: accepts pre-built args so tests can bypass real CLI parsing.
    pub fn from_args(args: &mut GroupConfigArgs) -> anyhow::Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            args.config_path = path.into();
        }
        let file = File::open(&args.config_path)
            .with_context(|| format!("cannot open config {}", args.config_path.display()))?;
        let file_config = serde_yaml::from_reader::<_, GroupConfig>(BufReader::new(file))
            .with_context(|| format!("invalid config {}", args.config_path.display()))?;
        Ok(file_config.merge(&mut args.config))
    }

    pub fn get_log_level(&self) -> Level {
        match self.log_level.as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    pub fn log_file(&self) -> Option<&Path> {
        if self.log_path.as_os_str().is_empty() {
            None
        } else {
            Some(&self.log_path)
        }
    }

    pub fn audio_level_interval(&self) -> Duration {
        Duration::from_millis(self.audio_level_interval_ms).max(MIN_AUDIO_LEVEL_INTERVAL)
    }
}
