use std::sync::Arc;

use super::{Artifact, ArtifactKind, ArtifactRef, Descriptor, ForwardSet, Populate};
use crate::error::Result;
use crate::metadata::{EntityEcaRule, EntityMetadata, RelationType};
use crate::registry::ArtifactRegistry;

/// Descriptor of a data-model entity
///
/// Forward references: relation targets and view members (entities), and the
/// services invoked by the entity's own event rules. Referenced descriptors
/// are not dereferenced; the eager pass builds every entity and service anyway.
#[derive(Debug)]
pub struct EntityArtifact {
    metadata: Arc<EntityMetadata>,
    eca_rules: Vec<Arc<EntityEcaRule>>,
    references: ForwardSet,
}

impl EntityArtifact {
    pub(crate) fn load(name: &str, registry: &ArtifactRegistry) -> Result<Self> {
        let providers = registry.providers();
        let metadata = providers.entities.entity(name)?;
        let eca_rules = providers.rules.entity_rules(name)?;
        Ok(Self {
            metadata,
            eca_rules,
            references: ForwardSet::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    /// Event rules triggered by operations on this entity
    pub fn eca_rules(&self) -> &[Arc<EntityEcaRule>] {
        &self.eca_rules
    }

    /// Entities reached through one-to-one relations
    pub fn related_one(&self) -> Vec<&str> {
        self.related(|t| matches!(t, RelationType::One | RelationType::OneNofk))
    }

    /// Entities reached through one-to-many relations
    pub fn related_many(&self) -> Vec<&str> {
        self.related(|t| t == RelationType::Many)
    }

    fn related(&self, filter: impl Fn(RelationType) -> bool) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .metadata
            .relations
            .iter()
            .filter(|r| filter(r.rel_type))
            .map(|r| r.rel_entity.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl Descriptor for EntityArtifact {
    const KIND: ArtifactKind = ArtifactKind::Entity;

    fn unique_id(&self) -> String {
        self.metadata.name.clone()
    }

    fn display_name(&self) -> &str {
        &self.metadata.name
    }

    fn location(&self) -> Option<&str> {
        self.metadata.package.as_deref()
    }

    fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::entity(self.name())
    }

    fn references(&self) -> &[ArtifactRef] {
        self.references.get()
    }

    fn is_populated(&self) -> bool {
        self.references.is_set()
    }

    fn into_artifact(self: Arc<Self>) -> Artifact {
        Artifact::Entity(self)
    }

    fn from_artifact(artifact: &Artifact) -> Option<&Arc<Self>> {
        match artifact {
            Artifact::Entity(d) => Some(d),
            _ => None,
        }
    }
}

impl Populate for EntityArtifact {
    fn populate(self: &Arc<Self>, registry: &ArtifactRegistry) -> Result<()> {
        let entities = self
            .metadata
            .relations
            .iter()
            .map(|r| r.rel_entity.as_str())
            .chain(self.metadata.member_entities.iter().map(String::as_str))
            .map(ArtifactRef::entity);

        let services = self
            .eca_rules
            .iter()
            .flat_map(|rule| rule.actions.iter())
            .map(|action| ArtifactRef::service(action.service.as_str()));

        let refs = registry.link(&self.clone().into_artifact(), entities.chain(services));
        self.references.set(refs);
        Ok(())
    }
}
