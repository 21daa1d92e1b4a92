use std::sync::Arc;

use super::{Artifact, ArtifactKind, ArtifactRef, Descriptor, ForwardSet, Populate};
use crate::error::Result;
use crate::metadata::{ServiceEcaRule, ServiceMetadata};
use crate::registry::ArtifactRegistry;

/// Descriptor of a callable service
///
/// Forward references: entities it reads or writes (including the default
/// entity and entity-derived parameters), services it calls or implements,
/// and the event rules attached to it. The attached rules are constructed
/// during population, which in turn constructs the services their actions
/// invoke; that chain is what can lead back to this service.
#[derive(Debug)]
pub struct ServiceArtifact {
    metadata: Arc<ServiceMetadata>,
    eca_rules: Vec<Arc<ServiceEcaRule>>,
    references: ForwardSet,
}

impl ServiceArtifact {
    pub(crate) fn load(name: &str, registry: &ArtifactRegistry) -> Result<Self> {
        let providers = registry.providers();
        let metadata = providers.services.service(name)?;
        let eca_rules = providers.rules.service_rules(name)?;
        Ok(Self {
            metadata,
            eca_rules,
            references: ForwardSet::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    /// Event rules triggered by this service
    pub fn eca_rules(&self) -> &[Arc<ServiceEcaRule>] {
        &self.eca_rules
    }

    /// Names of entities this service uses, sorted
    pub fn entities_used(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .metadata
            .default_entity
            .iter()
            .chain(self.metadata.entities.iter())
            .map(String::as_str)
            .chain(
                self.metadata
                    .parameters
                    .iter()
                    .filter_map(|p| p.entity_name.as_deref()),
            )
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Names of services this service calls or implements, sorted
    pub fn services_called(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .metadata
            .services
            .iter()
            .chain(self.metadata.implements.iter())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl Descriptor for ServiceArtifact {
    const KIND: ArtifactKind = ArtifactKind::Service;

    fn unique_id(&self) -> String {
        self.metadata.name.clone()
    }

    fn display_name(&self) -> &str {
        &self.metadata.name
    }

    fn location(&self) -> Option<&str> {
        self.metadata.location.as_deref()
    }

    fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::service(self.name())
    }

    fn references(&self) -> &[ArtifactRef] {
        self.references.get()
    }

    fn is_populated(&self) -> bool {
        self.references.is_set()
    }

    fn into_artifact(self: Arc<Self>) -> Artifact {
        Artifact::Service(self)
    }

    fn from_artifact(artifact: &Artifact) -> Option<&Arc<Self>> {
        match artifact {
            Artifact::Service(d) => Some(d),
            _ => None,
        }
    }
}

impl Populate for ServiceArtifact {
    fn populate(self: &Arc<Self>, registry: &ArtifactRegistry) -> Result<()> {
        let entities = self.entities_used().into_iter().map(ArtifactRef::entity);
        let services = self.services_called().into_iter().map(ArtifactRef::service);
        let rules = self.eca_rules.iter().map(ArtifactRef::service_eca);

        let refs = registry.link(&self.clone().into_artifact(), entities.chain(services).chain(rules));

        for (ordinal, rule) in self.eca_rules.iter().enumerate() {
            registry.attach_service_eca(rule, ordinal)?;
        }

        self.references.set(refs);
        Ok(())
    }
}
