//! Form and screen descriptors, keyed by `location#name`.
//!
//! Neither kind is enumerated by the eager pass, and neither dereferences the
//! artifacts it references: embedded forms and sub-screens only get a
//! descriptor when someone asks for them.

use std::sync::Arc;

use super::{Artifact, ArtifactKind, ArtifactRef, Descriptor, ForwardSet, Populate};
use crate::error::Result;
use crate::metadata::{FormMetadata, ScreenMetadata};
use crate::registry::ArtifactRegistry;

#[derive(Debug)]
pub struct FormArtifact {
    location: String,
    metadata: Arc<FormMetadata>,
    references: ForwardSet,
}

impl FormArtifact {
    pub(crate) fn load(location: &str, name: &str, registry: &ArtifactRegistry) -> Result<Self> {
        let metadata = registry.providers().widgets.form(location, name)?;
        Ok(Self {
            location: location.to_string(),
            metadata,
            references: ForwardSet::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &FormMetadata {
        &self.metadata
    }

    /// Request URI the form submits to
    pub fn target(&self) -> Option<&str> {
        self.metadata.target.as_deref()
    }

    pub fn entities_used(&self) -> Vec<&str> {
        let m = &self.metadata;
        let mut names: Vec<&str> = m
            .default_entity
            .iter()
            .chain(m.auto_fields_entities.iter())
            .map(String::as_str)
            .chain(m.fields.iter().filter_map(|f| f.entity_name.as_deref()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn services_called(&self) -> Vec<&str> {
        let m = &self.metadata;
        let mut names: Vec<&str> = m
            .default_service
            .iter()
            .chain(m.auto_fields_services.iter())
            .map(String::as_str)
            .chain(m.fields.iter().filter_map(|f| f.service_name.as_deref()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl Descriptor for FormArtifact {
    const KIND: ArtifactKind = ArtifactKind::FormWidget;

    fn unique_id(&self) -> String {
        format!("{}#{}", self.location, self.metadata.name)
    }

    fn display_name(&self) -> &str {
        &self.metadata.name
    }

    fn location(&self) -> Option<&str> {
        Some(&self.location)
    }

    fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::form(&self.location, self.name())
    }

    fn references(&self) -> &[ArtifactRef] {
        self.references.get()
    }

    fn is_populated(&self) -> bool {
        self.references.is_set()
    }

    fn into_artifact(self: Arc<Self>) -> Artifact {
        Artifact::FormWidget(self)
    }

    fn from_artifact(artifact: &Artifact) -> Option<&Arc<Self>> {
        match artifact {
            Artifact::FormWidget(d) => Some(d),
            _ => None,
        }
    }
}

impl Populate for FormArtifact {
    fn populate(self: &Arc<Self>, registry: &ArtifactRegistry) -> Result<()> {
        let entities = self.entities_used().into_iter().map(ArtifactRef::entity);
        let services = self.services_called().into_iter().map(ArtifactRef::service);
        let refs = registry.link(&self.clone().into_artifact(), entities.chain(services));
        self.references.set(refs);
        Ok(())
    }
}

#[derive(Debug)]
pub struct ScreenArtifact {
    location: String,
    metadata: Arc<ScreenMetadata>,
    references: ForwardSet,
}

impl ScreenArtifact {
    pub(crate) fn load(location: &str, name: &str, registry: &ArtifactRegistry) -> Result<Self> {
        let metadata = registry.providers().widgets.screen(location, name)?;
        Ok(Self {
            location: location.to_string(),
            metadata,
            references: ForwardSet::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &ScreenMetadata {
        &self.metadata
    }

    /// `location#name` ids of embedded forms
    pub fn forms_included(&self) -> Vec<String> {
        self.metadata.forms.iter().map(|w| w.unique_id()).collect()
    }

    /// `location#name` ids of included sub-screens
    pub fn screens_included(&self) -> Vec<String> {
        self.metadata.screens.iter().map(|w| w.unique_id()).collect()
    }
}

impl Descriptor for ScreenArtifact {
    const KIND: ArtifactKind = ArtifactKind::ScreenWidget;

    fn unique_id(&self) -> String {
        format!("{}#{}", self.location, self.metadata.name)
    }

    fn display_name(&self) -> &str {
        &self.metadata.name
    }

    fn location(&self) -> Option<&str> {
        Some(&self.location)
    }

    fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::screen(&self.location, self.name())
    }

    fn references(&self) -> &[ArtifactRef] {
        self.references.get()
    }

    fn is_populated(&self) -> bool {
        self.references.is_set()
    }

    fn into_artifact(self: Arc<Self>) -> Artifact {
        Artifact::ScreenWidget(self)
    }

    fn from_artifact(artifact: &Artifact) -> Option<&Arc<Self>> {
        match artifact {
            Artifact::ScreenWidget(d) => Some(d),
            _ => None,
        }
    }
}

impl Populate for ScreenArtifact {
    fn populate(self: &Arc<Self>, registry: &ArtifactRegistry) -> Result<()> {
        let m = &self.metadata;
        let refs = m
            .entities
            .iter()
            .map(|e| ArtifactRef::entity(e.as_str()))
            .chain(m.services.iter().map(|s| ArtifactRef::service(s.as_str())))
            .chain(m.forms.iter().map(|w| ArtifactRef::form(&w.location, &w.name)))
            .chain(m.screens.iter().map(|w| ArtifactRef::screen(&w.location, &w.name)));

        let refs = registry.link(&self.clone().into_artifact(), refs);
        self.references.set(refs);
        Ok(())
    }
}
