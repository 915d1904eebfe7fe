//! Periodic voice activity snapshots.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GroupLevelValue {
    /// 0.0 (silence) to 1.0
    pub level: f32,
    pub voice: bool,
}

impl GroupLevelValue {
    pub fn new(level: f32, voice: bool) -> Self {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        Self { level, voice }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupLevelUpdate {
    pub ssrc: u32,
    pub value: GroupLevelValue,
}

impl GroupLevelUpdate {
    pub fn new(ssrc: u32, level: f32, voice: bool) -> Self {
        Self {
            ssrc,
            value: GroupLevelValue::new(level, voice),
        }
    }

    pub fn silent(ssrc: u32) -> Self {
        Self {
            ssrc,
            value: GroupLevelValue::default(),
        }
    }
}

/// Everything measured during one tick: local source first, then remote sources ascending.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupLevelsUpdate {
    pub updates: Vec<GroupLevelUpdate>,
}

impl GroupLevelsUpdate {
    pub fn get(&self, ssrc: u32) -> Option<&GroupLevelValue> {
        self.updates
            .iter()
            .find(|update| update.ssrc == ssrc)
            .map(|update| &update.value)
    }

    pub fn ssrcs(&self) -> Vec<u32> {
        self.updates.iter().map(|update| update.ssrc).collect()
    }
}

/// Turns raw engine samples into one snapshot per tick covering exactly the live sources.
#[derive(Debug, Clone)]
pub struct AudioLevelAggregator {
    local_ssrc: u32,
    interval: Duration,
}

impl AudioLevelAggregator {
    pub fn new(local_ssrc: u32, interval: Duration) -> Self {
        Self {
            local_ssrc,
            interval,
        }
    }

    /// First tick fires one full interval from now. Late ticks are not bunched up.
    pub fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// `remote_audio` must be the registry's live remote audio ssrcs. Samples for any other
    /// ssrc are dropped; live sources without a sample are reported silent.
    pub fn collect(
        &self,
        samples: Vec<GroupLevelUpdate>,
        remote_audio: &[u32],
        muted: bool,
    ) -> GroupLevelsUpdate {
        let mut latest: HashMap<u32, GroupLevelValue> = HashMap::with_capacity(samples.len());
        for sample in samples {
            latest.insert(sample.ssrc, GroupLevelValue::new(sample.value.level, sample.value.voice));
        }

        let mut updates = Vec::with_capacity(remote_audio.len() + 1);
        let local = match latest.remove(&self.local_ssrc) {
            Some(value) if !muted => value,
            _ => GroupLevelValue::default(),
        };
        updates.push(GroupLevelUpdate {
            ssrc: self.local_ssrc,
            value: local,
        });
        for &ssrc in remote_audio {
            let value = latest.remove(&ssrc).unwrap_or_default();
            updates.push(GroupLevelUpdate { ssrc, value });
        }
        if !latest.is_empty() {
            tracing::trace!("Dropped {} level samples for unknown ssrcs", latest.len());
        }
        GroupLevelsUpdate { updates }
    }
}
