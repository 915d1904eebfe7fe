//! This module contains the ParticipantRegistry struct.
//! It is the authoritative map of who is in the call and which ssrcs each
//! participant sends on. Every ssrc has at most one live owner, and ssrcs used
//! by the local endpoint are never handed to a remote participant.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use lib_common_groupcall::types::GroupParticipantDescription;

/// One step of a registry mutation, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    Added(GroupParticipantDescription),
    Removed(GroupParticipantDescription),
}

#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    /// Live participants grouped by endpoint id
    participants: BTreeMap<String, GroupParticipantDescription>,
    ssrc_owners: HashMap<u32, String>,
    /// Endpoint ids retired by an `is_removed` entry
    removed_endpoints: HashSet<String>,
    local_ssrcs: HashSet<u32>,
    /// ssrcs seen without a participant description
    missing_ssrcs: BTreeSet<u32>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a signaling batch, entries applied in order, last writer wins.
    pub fn add_participants(
        &mut self,
        batch: Vec<GroupParticipantDescription>,
    ) -> Vec<RegistryChange> {
        let mut changes = Vec::new();
        for entry in batch {
            if entry.is_removed {
                self.apply_removal(&entry, &mut changes);
            } else {
                self.apply_upsert(entry, &mut changes);
            }
        }
        changes
    }

    /// Deletes the participant named by the entry's endpoint id. When no live
    /// participant goes by that id, the owner of the entry's audio ssrc is deleted.
    fn apply_removal(
        &mut self,
        entry: &GroupParticipantDescription,
        changes: &mut Vec<RegistryChange>,
    ) {
        self.missing_ssrcs.remove(&entry.audio_ssrc);
        if !entry.endpoint_id.is_empty() {
            self.removed_endpoints.insert(entry.endpoint_id.clone());
        }

        let endpoint_id = if self.participants.contains_key(&entry.endpoint_id) {
            Some(entry.endpoint_id.clone())
        } else {
            self.audio_owner(entry.audio_ssrc)
        };
        let Some(endpoint_id) = endpoint_id else {
            tracing::debug!(
                "Removal of unknown participant {:?} (ssrc {}) ignored",
                entry.endpoint_id,
                entry.audio_ssrc
            );
            return;
        };
        if let Some(removed) = self.take(&endpoint_id) {
            tracing::info!("Participant {endpoint_id} left");
            changes.push(RegistryChange::Removed(removed));
        }
        self.removed_endpoints.insert(endpoint_id);
    }

    /// Endpoint id of the live participant whose audio ssrc is `ssrc`.
    fn audio_owner(&self, ssrc: u32) -> Option<String> {
        if ssrc == 0 {
            return None;
        }
        self.owner(ssrc)
            .filter(|participant| participant.audio_ssrc == ssrc)
            .map(|participant| participant.endpoint_id.clone())
    }

    fn apply_upsert(
        &mut self,
        entry: GroupParticipantDescription,
        changes: &mut Vec<RegistryChange>,
    ) {
        if entry.endpoint_id.is_empty() {
            if self.note_missing(entry.audio_ssrc) {
                tracing::debug!("ssrc {} announced without endpoint id", entry.audio_ssrc);
            }
            return;
        }
        if self.removed_endpoints.contains(&entry.endpoint_id) {
            tracing::warn!("Ignoring reuse of removed endpoint {}", entry.endpoint_id);
            return;
        }
        let ssrcs = entry.ssrcs();
        if let Some(ssrc) = ssrcs.iter().find(|ssrc| self.local_ssrcs.contains(*ssrc)) {
            tracing::warn!(
                "Rejecting participant {}: ssrc {ssrc} belongs to the local endpoint",
                entry.endpoint_id
            );
            return;
        }

        if let Some(previous) = self.take(&entry.endpoint_id) {
            changes.push(RegistryChange::Removed(previous));
        }
        for ssrc in &ssrcs {
            if let Some(owner) = self.ssrc_owners.get(ssrc).cloned() {
                tracing::warn!(
                    "ssrc {ssrc} moved from {owner} to {}, evicting {owner}",
                    entry.endpoint_id
                );
                if let Some(evicted) = self.take(&owner) {
                    changes.push(RegistryChange::Removed(evicted));
                }
            }
        }

        for ssrc in ssrcs {
            self.ssrc_owners.insert(ssrc, entry.endpoint_id.clone());
            self.missing_ssrcs.remove(&ssrc);
        }
        tracing::debug!(
            "Participant {} audio ssrc {} with {} video groups",
            entry.endpoint_id,
            entry.audio_ssrc,
            entry.video_source_groups.len()
        );
        self.participants
            .insert(entry.endpoint_id.clone(), entry.clone());
        changes.push(RegistryChange::Added(entry));
    }

    /// Drops every participant owning one of `ssrcs`. Endpoint ids stay reusable.
    pub fn remove_ssrcs(&mut self, ssrcs: &[u32]) -> Vec<RegistryChange> {
        let mut changes = Vec::new();
        for ssrc in ssrcs {
            self.missing_ssrcs.remove(ssrc);
            if let Some(owner) = self.ssrc_owners.get(ssrc).cloned() {
                if let Some(removed) = self.take(&owner) {
                    tracing::info!("Participant {owner} removed with ssrc {ssrc}");
                    changes.push(RegistryChange::Removed(removed));
                }
            }
        }
        changes
    }

    /// Removes all live participants, keeping tombstones and local ssrcs.
    pub fn reset(&mut self) -> Vec<RegistryChange> {
        let endpoints: Vec<String> = self.participants.keys().cloned().collect();
        endpoints
            .iter()
            .filter_map(|endpoint_id| self.take(endpoint_id))
            .map(RegistryChange::Removed)
            .collect()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Replaces the set of ssrcs the local endpoint sends on. Remote participants
    /// claiming one of them are evicted.
    pub fn set_local_ssrcs(&mut self, ssrcs: impl IntoIterator<Item = u32>) -> Vec<RegistryChange> {
        self.local_ssrcs = ssrcs.into_iter().filter(|ssrc| *ssrc != 0).collect();
        let mut changes = Vec::new();
        let local: Vec<u32> = self.local_ssrcs.iter().copied().collect();
        for ssrc in local {
            self.missing_ssrcs.remove(&ssrc);
            if let Some(owner) = self.ssrc_owners.get(&ssrc).cloned() {
                tracing::warn!("Local ssrc {ssrc} was claimed by {owner}, evicting");
                if let Some(evicted) = self.take(&owner) {
                    changes.push(RegistryChange::Removed(evicted));
                }
            }
        }
        changes
    }

    /// Records `ssrc` as lacking a description. Returns true when it was not known yet.
    pub fn note_missing(&mut self, ssrc: u32) -> bool {
        if ssrc == 0 || self.contains_ssrc(ssrc) || self.local_ssrcs.contains(&ssrc) {
            return false;
        }
        self.missing_ssrcs.insert(ssrc)
    }

    pub fn missing_ssrcs(&self) -> Vec<u32> {
        self.missing_ssrcs.iter().copied().collect()
    }

    fn take(&mut self, endpoint_id: &str) -> Option<GroupParticipantDescription> {
        let participant = self.participants.remove(endpoint_id)?;
        for ssrc in participant.ssrcs() {
            if self.ssrc_owners.get(&ssrc).is_some_and(|owner| owner == endpoint_id) {
                self.ssrc_owners.remove(&ssrc);
            }
        }
        Some(participant)
    }

    pub fn contains_ssrc(&self, ssrc: u32) -> bool {
        self.ssrc_owners.contains_key(&ssrc)
    }

    pub fn is_video_ssrc(&self, ssrc: u32) -> bool {
        self.owner(ssrc)
            .is_some_and(|participant| participant.video_ssrcs().contains(&ssrc))
    }

    pub fn is_audio_ssrc(&self, ssrc: u32) -> bool {
        ssrc != 0 && self.owner(ssrc).is_some_and(|participant| participant.audio_ssrc == ssrc)
    }

    pub fn owner(&self, ssrc: u32) -> Option<&GroupParticipantDescription> {
        self.ssrc_owners
            .get(&ssrc)
            .and_then(|endpoint_id| self.participants.get(endpoint_id))
    }

    pub fn participant(&self, endpoint_id: &str) -> Option<&GroupParticipantDescription> {
        self.participants.get(endpoint_id)
    }

    /// Live participants ordered by endpoint id.
    pub fn participants(&self) -> impl Iterator<Item = &GroupParticipantDescription> {
        self.participants.values()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn is_removed_endpoint(&self, endpoint_id: &str) -> bool {
        self.removed_endpoints.contains(endpoint_id)
    }

    pub fn live_ssrcs(&self) -> BTreeSet<u32> {
        self.ssrc_owners.keys().copied().collect()
    }

    /// Remote audio ssrcs, ascending.
    pub fn audio_ssrcs(&self) -> Vec<u32> {
        let ssrcs: BTreeSet<u32> = self
            .participants
            .values()
            .map(|participant| participant.audio_ssrc)
            .filter(|ssrc| *ssrc != 0)
            .collect();
        ssrcs.into_iter().collect()
    }

    /// Remote video ssrcs, deduplicated and ascending.
    pub fn incoming_video_ssrcs(&self) -> Vec<u32> {
        let ssrcs: BTreeSet<u32> = self
            .participants
            .values()
            .flat_map(|participant| participant.video_ssrcs())
            .collect();
        ssrcs.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use lib_common_groupcall::types::GroupJoinPayloadVideoSourceGroup;

    use super::*;

    fn with_video(endpoint_id: &str, audio: u32, video: &[u32]) -> GroupParticipantDescription {
        GroupParticipantDescription::new(endpoint_id, audio)
            .with_video_source_group(GroupJoinPayloadVideoSourceGroup::new(video, "SIM"))
    }

    #[test]
    fn add_then_remove_by_ssrc() {
        let mut registry = ParticipantRegistry::new();
        registry.add_participants(vec![GroupParticipantDescription::new("A", 100)]);
        assert!(registry.contains_ssrc(100));
        assert!(registry.is_audio_ssrc(100));

        let changes = registry.remove_ssrcs(&[100]);
        assert_eq!(
            changes,
            vec![RegistryChange::Removed(GroupParticipantDescription::new("A", 100))]
        );
        assert!(registry.is_empty());
        assert!(registry.incoming_video_ssrcs().is_empty());

        // remove_ssrcs does not retire the endpoint id
        registry.add_participants(vec![GroupParticipantDescription::new("A", 101)]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn removing_a_video_ssrc_removes_the_participant() {
        let mut registry = ParticipantRegistry::new();
        registry.add_participants(vec![with_video("A", 100, &[200, 201])]);
        assert_eq!(registry.incoming_video_ssrcs(), vec![200, 201]);
        assert!(registry.is_video_ssrc(201));

        registry.remove_ssrcs(&[201]);
        assert!(!registry.contains_ssrc(100));
        assert!(registry.live_ssrcs().is_empty());
    }

    #[test]
    fn last_writer_wins_within_a_batch() {
        let mut registry = ParticipantRegistry::new();
        let changes = registry.add_participants(vec![
            with_video("A", 100, &[200]),
            with_video("A", 100, &[300, 301]),
        ]);

        assert_eq!(changes.len(), 3);
        assert!(matches!(changes[1], RegistryChange::Removed(_)));
        assert_eq!(registry.incoming_video_ssrcs(), vec![300, 301]);
        assert!(!registry.contains_ssrc(200));
    }

    #[test]
    fn conflicting_ssrc_evicts_previous_owner() {
        let mut registry = ParticipantRegistry::new();
        registry.add_participants(vec![GroupParticipantDescription::new("A", 100)]);
        registry.add_participants(vec![with_video("B", 101, &[100])]);

        assert!(registry.participant("A").is_none());
        assert_eq!(registry.owner(100).unwrap().endpoint_id, "B");
        assert_eq!(registry.live_ssrcs().into_iter().collect::<Vec<_>>(), vec![100, 101]);
    }

    #[test]
    fn removed_endpoint_cannot_come_back() {
        let mut registry = ParticipantRegistry::new();
        registry.add_participants(vec![GroupParticipantDescription::new("A", 100)]);
        registry.add_participants(vec![GroupParticipantDescription::removed("A", 100)]);
        assert!(registry.is_removed_endpoint("A"));

        let changes = registry.add_participants(vec![GroupParticipantDescription::new("A", 102)]);
        assert!(changes.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn removal_by_audio_ssrc_without_endpoint() {
        let mut registry = ParticipantRegistry::new();
        registry.add_participants(vec![GroupParticipantDescription::new("A", 100)]);
        registry.add_participants(vec![GroupParticipantDescription::removed("", 100)]);

        assert!(registry.is_empty());
        assert!(registry.is_removed_endpoint("A"));
    }

    #[test]
    fn removal_falls_back_to_the_audio_ssrc_owner() {
        let mut registry = ParticipantRegistry::new();
        registry.add_participants(vec![GroupParticipantDescription::new("A", 100)]);
        let changes = registry.add_participants(vec![GroupParticipantDescription::removed("X", 100)]);

        assert_eq!(
            changes,
            vec![RegistryChange::Removed(GroupParticipantDescription::new("A", 100))]
        );
        assert!(!registry.contains_ssrc(100));
        assert!(registry.is_removed_endpoint("A"));
        assert!(registry.is_removed_endpoint("X"));
    }

    #[test]
    fn removal_by_endpoint_spares_the_audio_ssrc_owner() {
        let mut registry = ParticipantRegistry::new();
        registry.add_participants(vec![
            GroupParticipantDescription::new("A", 100),
            GroupParticipantDescription::new("B", 101),
        ]);
        registry.add_participants(vec![GroupParticipantDescription::removed("A", 101)]);

        assert!(registry.participant("A").is_none());
        assert_eq!(registry.owner(101).unwrap().endpoint_id, "B");
        assert!(!registry.is_removed_endpoint("B"));
    }

    #[test]
    fn removal_does_not_match_a_video_ssrc() {
        let mut registry = ParticipantRegistry::new();
        registry.add_participants(vec![with_video("A", 100, &[200])]);
        let changes = registry.add_participants(vec![GroupParticipantDescription::removed("X", 200)]);

        assert!(changes.is_empty());
        assert!(registry.contains_ssrc(200));
    }

    #[test]
    fn removal_of_unknown_participant_is_ignored() {
        let mut registry = ParticipantRegistry::new();
        let changes = registry.add_participants(vec![GroupParticipantDescription::removed("Z", 9)]);
        assert!(changes.is_empty());
        assert!(registry.is_removed_endpoint("Z"));
    }

    #[test]
    fn local_ssrcs_are_reserved() {
        let mut registry = ParticipantRegistry::new();
        registry.add_participants(vec![GroupParticipantDescription::new("A", 500)]);
        let changes = registry.set_local_ssrcs([500, 0]);
        assert_eq!(changes.len(), 1);

        registry.add_participants(vec![GroupParticipantDescription::new("B", 500)]);
        assert!(registry.is_empty());
        assert!(!registry.note_missing(500));
    }

    #[test]
    fn missing_descriptions_are_tracked_until_resolved() {
        let mut registry = ParticipantRegistry::new();
        assert!(registry.note_missing(700));
        assert!(!registry.note_missing(700));
        registry.add_participants(vec![GroupParticipantDescription::new("", 701)]);
        assert_eq!(registry.missing_ssrcs(), vec![700, 701]);

        registry.add_participants(vec![GroupParticipantDescription::new("A", 700)]);
        registry.remove_ssrcs(&[701]);
        assert!(registry.missing_ssrcs().is_empty());
    }

    #[test]
    fn reset_keeps_tombstones() {
        let mut registry = ParticipantRegistry::new();
        registry.add_participants(vec![
            GroupParticipantDescription::new("A", 100),
            GroupParticipantDescription::new("B", 101),
            GroupParticipantDescription::removed("C", 102),
        ]);
        assert_eq!(registry.reset().len(), 2);
        assert!(registry.is_empty());
        assert!(registry.is_removed_endpoint("C"));

        registry.clear();
        assert!(!registry.is_removed_endpoint("C"));
    }
}
