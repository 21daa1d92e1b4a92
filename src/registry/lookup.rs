//! Read-only queries over already-materialized descriptors.
//!
//! Nothing here constructs descriptors: an artifact that no accessor has
//! asked for yet is invisible to these lookups.

use chrono::{DateTime, Utc};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};

use super::{reverse::sort_artifacts, ArtifactRegistry};
use crate::artifact::{Artifact, ArtifactKind, ArtifactSummary};

/// Fuzzy search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub artifact: ArtifactSummary,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCount {
    pub kind: ArtifactKind,
    pub count: usize,
}

/// Registry summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStats {
    pub namespace: String,
    pub built_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_digest: Option<String>,
    pub counts: Vec<KindCount>,
    pub total: usize,
    /// Number of distinct referenced targets
    pub reverse_entries: usize,
}

impl RegistryStats {
    pub fn count(&self, kind: ArtifactKind) -> usize {
        self.counts
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.count)
            .unwrap_or(0)
    }
}

impl ArtifactRegistry {
    /// Descriptors whose forward-map key contains `fragment` (case-sensitive)
    ///
    /// Scans entities, services, forms, screens, and controller requests and
    /// views. Event rules are keyed by rule identity rather than by a name and
    /// are never matched.
    pub fn find_by_partial_name(&self, fragment: &str) -> Vec<Artifact> {
        let partial = self.sees_partial();
        let mut found: Vec<Artifact> = Vec::new();
        found.extend(
            self.entities
                .keys_containing(fragment, partial)
                .into_iter()
                .map(Artifact::Entity),
        );
        found.extend(
            self.services
                .keys_containing(fragment, partial)
                .into_iter()
                .map(Artifact::Service),
        );
        found.extend(
            self.forms
                .keys_containing(fragment, partial)
                .into_iter()
                .map(Artifact::FormWidget),
        );
        found.extend(
            self.screens
                .keys_containing(fragment, partial)
                .into_iter()
                .map(Artifact::ScreenWidget),
        );
        found.extend(
            self.requests
                .keys_containing(fragment, partial)
                .into_iter()
                .map(Artifact::ControllerRequest),
        );
        found.extend(
            self.views
                .keys_containing(fragment, partial)
                .into_iter()
                .map(Artifact::ControllerView),
        );
        sort_artifacts(&mut found);
        found
    }

    /// Rank materialized descriptors against `query`, best first
    ///
    /// The display name is tried first, then the full id.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let matcher = SkimMatcherV2::default();
        let mut hits: Vec<(i64, Artifact)> = Vec::new();

        for artifact in self.all_artifacts() {
            let score = matcher
                .fuzzy_match(artifact.display_name(), query)
                .or_else(|| matcher.fuzzy_match(&artifact.unique_id(), query));
            if let Some(score) = score {
                hits.push((score, artifact));
            }
        }

        // all_artifacts is ordered, and the sort is stable, so ties keep kind/id order
        hits.sort_by(|a, b| b.0.cmp(&a.0));

        hits.into_iter()
            .take(limit)
            .map(|(score, artifact)| SearchHit {
                artifact: artifact.summary(),
                score,
            })
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let counts: Vec<KindCount> = ArtifactKind::ALL
            .into_iter()
            .map(|kind| KindCount {
                kind,
                count: self.count(kind),
            })
            .collect();
        RegistryStats {
            namespace: self.namespace.clone(),
            built_at: self.built_at,
            source_digest: self.providers.source_digest.clone(),
            total: counts.iter().map(|c| c.count).sum(),
            counts,
            reverse_entries: self.reverse.len(),
        }
    }
}
