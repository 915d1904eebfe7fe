//! Weakly held renderers for remote video sources.
//!
//! A sink registered for an ssrc that is not live yet waits in `pending` until
//! the source shows up. Sinks dropped by the host are forgotten the next time
//! they are looked at.

use std::collections::{BTreeSet, HashMap};
use std::sync::Weak;

use crate::engine::{VideoFrame, VideoSink};

#[derive(Default)]
pub struct VideoOutputs {
    active: HashMap<u32, Weak<dyn VideoSink>>,
    pending: HashMap<u32, Weak<dyn VideoSink>>,
}

impl std::fmt::Debug for VideoOutputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoOutputs")
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VideoOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sink` for `ssrc`, replacing any previous sink for it.
    pub fn add(&mut self, ssrc: u32, sink: Weak<dyn VideoSink>, live: bool) {
        if live {
            self.pending.remove(&ssrc);
            self.active.insert(ssrc, sink);
        } else {
            tracing::debug!("Queueing video output for unknown ssrc {ssrc}");
            self.active.remove(&ssrc);
            self.pending.insert(ssrc, sink);
        }
    }

    /// Moves sinks between pending and active after the live video set changed.
    /// Returns the ssrcs that just got a sink attached.
    pub fn sync_live(&mut self, live: &BTreeSet<u32>) -> Vec<u32> {
        let gone: Vec<u32> = self
            .active
            .keys()
            .filter(|ssrc| !live.contains(*ssrc))
            .copied()
            .collect();
        for ssrc in gone {
            if let Some(sink) = self.active.remove(&ssrc) {
                if sink.strong_count() > 0 {
                    self.pending.insert(ssrc, sink);
                }
            }
        }

        self.pending.retain(|_, sink| sink.strong_count() > 0);
        let mut attached: Vec<u32> = self
            .pending
            .keys()
            .filter(|ssrc| live.contains(*ssrc))
            .copied()
            .collect();
        attached.sort_unstable();
        for ssrc in &attached {
            if let Some(sink) = self.pending.remove(ssrc) {
                self.active.insert(*ssrc, sink);
            }
        }
        attached
    }

    /// Hands `frame` to the sink of `ssrc`. Returns false when nobody rendered it.
    pub fn deliver(&mut self, ssrc: u32, frame: &VideoFrame) -> bool {
        let Some(sink) = self.active.get(&ssrc) else {
            return false;
        };
        match sink.upgrade() {
            Some(sink) => {
                sink.on_frame(ssrc, frame);
                true
            }
            None => {
                tracing::trace!("Video sink for {ssrc} released, detaching");
                self.active.remove(&ssrc);
                false
            }
        }
    }

    pub fn is_active(&self, ssrc: u32) -> bool {
        self.active.contains_key(&ssrc)
    }

    pub fn is_pending(&self, ssrc: u32) -> bool {
        self.pending.contains_key(&ssrc)
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.pending.clear();
    }
}
