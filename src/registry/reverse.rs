//! Reverse index: referenced artifact → referrers, partitioned by referrer kind

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::artifact::{Artifact, ArtifactKind, ArtifactRef};

/// One (target, referrer kind) slot of the reverse index
#[derive(Debug, Clone)]
pub struct ReverseEntry {
    pub target: ArtifactRef,
    pub referrer_kind: ArtifactKind,
    pub referrers: Vec<Artifact>,
}

/// Inverted references for walking the graph backwards
///
/// Entries exist for every name some descriptor references, whether or not a
/// descriptor for that name was ever constructed.
#[derive(Debug, Default)]
pub struct ReverseIndex {
    entries: RwLock<HashMap<ArtifactRef, HashMap<ArtifactKind, HashSet<Artifact>>>>,
}

impl ReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `referrer` as referring to `target`; idempotent
    pub fn insert(&self, target: ArtifactRef, referrer: Artifact) -> bool {
        self.entries
            .write()
            .entry(target)
            .or_default()
            .entry(referrer.kind())
            .or_default()
            .insert(referrer)
    }

    /// Referrers of `target` that are of `referrer_kind`, ordered by id
    pub fn referrers(&self, target: &ArtifactRef, referrer_kind: ArtifactKind) -> Vec<Artifact> {
        let entries = self.entries.read();
        let mut found: Vec<Artifact> = entries
            .get(target)
            .and_then(|by_kind| by_kind.get(&referrer_kind))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        sort_artifacts(&mut found);
        found
    }

    /// Referrers of `target` of every kind, ordered by kind then id
    pub fn all_referrers(&self, target: &ArtifactRef) -> Vec<Artifact> {
        let entries = self.entries.read();
        let mut found: Vec<Artifact> = entries
            .get(target)
            .map(|by_kind| by_kind.values().flatten().cloned().collect())
            .unwrap_or_default();
        sort_artifacts(&mut found);
        found
    }

    pub fn contains(&self, target: &ArtifactRef, referrer: &Artifact) -> bool {
        self.entries
            .read()
            .get(target)
            .and_then(|by_kind| by_kind.get(&referrer.kind()))
            .map(|set| set.contains(referrer))
            .unwrap_or(false)
    }

    /// Remove every trace of `referrer`, dropping slots that become empty
    pub fn withdraw(&self, referrer: &Artifact) {
        let kind = referrer.kind();
        let mut entries = self.entries.write();
        entries.retain(|_, by_kind| {
            if let Some(set) = by_kind.get_mut(&kind) {
                set.remove(referrer);
                if set.is_empty() {
                    by_kind.remove(&kind);
                }
            }
            !by_kind.is_empty()
        });
    }

    /// Number of referenced targets
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of every slot, for report rendering
    pub fn entries(&self) -> Vec<ReverseEntry> {
        let entries = self.entries.read();
        let mut snapshot: Vec<ReverseEntry> = entries
            .iter()
            .flat_map(|(target, by_kind)| {
                by_kind.iter().map(move |(kind, set)| {
                    let mut referrers: Vec<Artifact> = set.iter().cloned().collect();
                    sort_artifacts(&mut referrers);
                    ReverseEntry {
                        target: target.clone(),
                        referrer_kind: *kind,
                        referrers,
                    }
                })
            })
            .collect();
        snapshot.sort_by(|a, b| {
            (a.target.kind(), a.target.id(), a.referrer_kind)
                .cmp(&(b.target.kind(), b.target.id(), b.referrer_kind))
        });
        snapshot
    }
}

pub(crate) fn sort_artifacts(artifacts: &mut [Artifact]) {
    artifacts.sort_by_cached_key(|a| (a.kind(), a.unique_id()));
}
