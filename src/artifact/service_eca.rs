use std::sync::Arc;

use super::{Artifact, ArtifactKind, ArtifactRef, Descriptor, ForwardSet, Populate};
use crate::error::Result;
use crate::metadata::ServiceEcaRule;
use crate::registry::ArtifactRegistry;

/// Descriptor of an event rule attached to a service
///
/// Keyed by the rule allocation itself. The ordinal is the rule's position
/// among its service's rules, handed down by the service that attaches it,
/// and only serves to make ids readable and unique.
#[derive(Debug)]
pub struct ServiceEcaArtifact {
    rule: Arc<ServiceEcaRule>,
    ordinal: usize,
    label: String,
    references: ForwardSet,
}

impl ServiceEcaArtifact {
    pub(crate) fn new(rule: &Arc<ServiceEcaRule>, ordinal: usize) -> Self {
        Self {
            rule: rule.clone(),
            ordinal,
            label: rule.label(),
            references: ForwardSet::default(),
        }
    }

    pub fn rule(&self) -> &Arc<ServiceEcaRule> {
        &self.rule
    }

    /// Position among the triggering service's rules
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Service whose event triggers this rule
    pub fn triggering_service(&self) -> &str {
        &self.rule.service_name
    }

    /// Services invoked by the rule's actions, in action order
    pub fn services_called(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for action in &self.rule.actions {
            if !names.contains(&action.service.as_str()) {
                names.push(action.service.as_str());
            }
        }
        names
    }
}

impl Descriptor for ServiceEcaArtifact {
    const KIND: ArtifactKind = ArtifactKind::ServiceEca;

    fn unique_id(&self) -> String {
        format!("{}#{}", self.label, self.ordinal)
    }

    fn display_name(&self) -> &str {
        &self.label
    }

    fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::service_eca(&self.rule)
    }

    fn references(&self) -> &[ArtifactRef] {
        self.references.get()
    }

    fn is_populated(&self) -> bool {
        self.references.is_set()
    }

    fn into_artifact(self: Arc<Self>) -> Artifact {
        Artifact::ServiceEca(self)
    }

    fn from_artifact(artifact: &Artifact) -> Option<&Arc<Self>> {
        match artifact {
            Artifact::ServiceEca(d) => Some(d),
            _ => None,
        }
    }
}

impl Populate for ServiceEcaArtifact {
    fn populate(self: &Arc<Self>, registry: &ArtifactRegistry) -> Result<()> {
        let called = self.services_called();
        let refs = registry.link(
            &self.clone().into_artifact(),
            called.iter().map(|name| ArtifactRef::service(*name)),
        );

        for name in called {
            registry.service(name)?;
        }

        self.references.set(refs);
        Ok(())
    }
}
