//! Artifact descriptors
//!
//! Every artifact kind has its own descriptor type; [`Artifact`] is the closed
//! set of them. A descriptor holds its identity, kind-specific display metadata
//! read from its provider, and its forward reference set.
//!
//! Descriptors are created by the registry's accessors. The forward set is
//! filled in by the descriptor's population step after the descriptor has
//! been published in its forward map, so a descriptor caught in a reference
//! cycle may briefly be observed with [`Descriptor::is_populated`] returning
//! `false` by the thread constructing it.

pub mod controller;
pub mod entity;
pub mod service;
pub mod service_eca;
pub mod widget;

pub use controller::{ControllerRequestArtifact, ControllerViewArtifact};
pub use entity::EntityArtifact;
pub use service::ServiceArtifact;
pub use service_eca::ServiceEcaArtifact;
pub use widget::{FormArtifact, ScreenArtifact};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::error::Result;
use crate::metadata::ServiceEcaRule;
use crate::registry::ArtifactRegistry;

/// The artifact kinds held by a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Entity,
    Service,
    ServiceEca,
    FormWidget,
    ScreenWidget,
    ControllerRequest,
    ControllerView,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::Entity,
        ArtifactKind::Service,
        ArtifactKind::ServiceEca,
        ArtifactKind::FormWidget,
        ArtifactKind::ScreenWidget,
        ArtifactKind::ControllerRequest,
        ArtifactKind::ControllerView,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Entity => "entity",
            ArtifactKind::Service => "service",
            ArtifactKind::ServiceEca => "service-eca",
            ArtifactKind::FormWidget => "form-widget",
            ArtifactKind::ScreenWidget => "screen-widget",
            ArtifactKind::ControllerRequest => "controller-request",
            ArtifactKind::ControllerView => "controller-view",
        }
    }

    /// Whether the eager pass enumerates this kind
    pub fn is_eager(&self) -> bool {
        matches!(self, ArtifactKind::Entity | ArtifactKind::Service)
    }

    /// Whether identities of this kind are `location#name` composites
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            ArtifactKind::FormWidget
                | ArtifactKind::ScreenWidget
                | ArtifactKind::ControllerRequest
                | ArtifactKind::ControllerView
        )
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ArtifactKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .or(match s {
                "form" => Some(ArtifactKind::FormWidget),
                "screen" => Some(ArtifactKind::ScreenWidget),
                "request" => Some(ArtifactKind::ControllerRequest),
                "view" => Some(ArtifactKind::ControllerView),
                "eca" | "seca" => Some(ArtifactKind::ServiceEca),
                _ => None,
            })
            .ok_or_else(|| format!("unknown artifact kind '{}'", s))
    }
}

/// Identity-compared handle to an event rule definition
#[derive(Debug, Clone)]
pub struct RuleHandle(pub Arc<ServiceEcaRule>);

impl RuleHandle {
    pub fn rule(&self) -> &ServiceEcaRule {
        &self.0
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for RuleHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for RuleHandle {}

impl Hash for RuleHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

/// A (kind, identity) pair naming an artifact, whether or not it has a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactRef {
    Entity(String),
    Service(String),
    ServiceEca(RuleHandle),
    FormWidget(String),
    ScreenWidget(String),
    ControllerRequest(String),
    ControllerView(String),
}

impl ArtifactRef {
    pub fn entity(name: impl Into<String>) -> Self {
        ArtifactRef::Entity(name.into())
    }

    pub fn service(name: impl Into<String>) -> Self {
        ArtifactRef::Service(name.into())
    }

    pub fn service_eca(rule: &Arc<ServiceEcaRule>) -> Self {
        ArtifactRef::ServiceEca(RuleHandle(rule.clone()))
    }

    pub fn form(location: &str, name: &str) -> Self {
        ArtifactRef::FormWidget(format!("{location}#{name}"))
    }

    pub fn screen(location: &str, name: &str) -> Self {
        ArtifactRef::ScreenWidget(format!("{location}#{name}"))
    }

    pub fn controller_request(controller: &str, uri: &str) -> Self {
        ArtifactRef::ControllerRequest(format!("{controller}#{uri}"))
    }

    pub fn controller_view(controller: &str, uri: &str) -> Self {
        ArtifactRef::ControllerView(format!("{controller}#{uri}"))
    }

    /// Build a reference from a kind and a name-keyed identity
    ///
    /// Returns `None` for event rules, which have no name key.
    pub fn named(kind: ArtifactKind, id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        Some(match kind {
            ArtifactKind::Entity => ArtifactRef::Entity(id),
            ArtifactKind::Service => ArtifactRef::Service(id),
            ArtifactKind::ServiceEca => return None,
            ArtifactKind::FormWidget => ArtifactRef::FormWidget(id),
            ArtifactKind::ScreenWidget => ArtifactRef::ScreenWidget(id),
            ArtifactKind::ControllerRequest => ArtifactRef::ControllerRequest(id),
            ArtifactKind::ControllerView => ArtifactRef::ControllerView(id),
        })
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactRef::Entity(_) => ArtifactKind::Entity,
            ArtifactRef::Service(_) => ArtifactKind::Service,
            ArtifactRef::ServiceEca(_) => ArtifactKind::ServiceEca,
            ArtifactRef::FormWidget(_) => ArtifactKind::FormWidget,
            ArtifactRef::ScreenWidget(_) => ArtifactKind::ScreenWidget,
            ArtifactRef::ControllerRequest(_) => ArtifactKind::ControllerRequest,
            ArtifactRef::ControllerView(_) => ArtifactKind::ControllerView,
        }
    }

    /// Identity string; event rules render their (non-unique) label
    pub fn id(&self) -> String {
        match self {
            ArtifactRef::ServiceEca(handle) => handle.rule().label(),
            ArtifactRef::Entity(id)
            | ArtifactRef::Service(id)
            | ArtifactRef::FormWidget(id)
            | ArtifactRef::ScreenWidget(id)
            | ArtifactRef::ControllerRequest(id)
            | ArtifactRef::ControllerView(id) => id.clone(),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Capabilities shared by every descriptor kind
pub trait Descriptor: Send + Sync + 'static {
    const KIND: ArtifactKind;

    /// Identity within the registry
    fn unique_id(&self) -> String;

    fn display_name(&self) -> &str;

    /// Source location, for kinds that have one
    fn location(&self) -> Option<&str> {
        None
    }

    /// The reference to this artifact
    fn artifact_ref(&self) -> ArtifactRef;

    /// Forward reference set; empty until population completes
    fn references(&self) -> &[ArtifactRef];

    fn is_populated(&self) -> bool;

    fn into_artifact(self: Arc<Self>) -> Artifact;

    fn from_artifact(artifact: &Artifact) -> Option<&Arc<Self>>;
}

/// Reference-population step, run by the registry right after publication
pub(crate) trait Populate: Descriptor {
    fn populate(self: &Arc<Self>, registry: &ArtifactRegistry) -> Result<()>;
}

/// Write-once forward set shared by the descriptor types
#[derive(Debug, Default)]
pub(crate) struct ForwardSet(OnceLock<Vec<ArtifactRef>>);

impl ForwardSet {
    pub(crate) fn get(&self) -> &[ArtifactRef] {
        self.0.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    pub(crate) fn set(&self, refs: Vec<ArtifactRef>) {
        // Population runs once per descriptor under the construction lock.
        let _ = self.0.set(refs);
    }
}

/// Collect references in first-seen order without duplicates
pub(crate) fn dedup_refs(refs: impl IntoIterator<Item = ArtifactRef>) -> Vec<ArtifactRef> {
    let mut seen = HashSet::new();
    refs.into_iter().filter(|r| seen.insert(r.clone())).collect()
}

/// Any descriptor held by a registry
///
/// Equality and hashing follow descriptor identity (the shared allocation),
/// which within one registry coincides with artifact identity.
#[derive(Debug, Clone)]
pub enum Artifact {
    Entity(Arc<EntityArtifact>),
    Service(Arc<ServiceArtifact>),
    ServiceEca(Arc<ServiceEcaArtifact>),
    FormWidget(Arc<FormArtifact>),
    ScreenWidget(Arc<ScreenArtifact>),
    ControllerRequest(Arc<ControllerRequestArtifact>),
    ControllerView(Arc<ControllerViewArtifact>),
}

macro_rules! each_artifact {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Artifact::Entity($inner) => $body,
            Artifact::Service($inner) => $body,
            Artifact::ServiceEca($inner) => $body,
            Artifact::FormWidget($inner) => $body,
            Artifact::ScreenWidget($inner) => $body,
            Artifact::ControllerRequest($inner) => $body,
            Artifact::ControllerView($inner) => $body,
        }
    };
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Entity(_) => ArtifactKind::Entity,
            Artifact::Service(_) => ArtifactKind::Service,
            Artifact::ServiceEca(_) => ArtifactKind::ServiceEca,
            Artifact::FormWidget(_) => ArtifactKind::FormWidget,
            Artifact::ScreenWidget(_) => ArtifactKind::ScreenWidget,
            Artifact::ControllerRequest(_) => ArtifactKind::ControllerRequest,
            Artifact::ControllerView(_) => ArtifactKind::ControllerView,
        }
    }

    pub fn unique_id(&self) -> String {
        each_artifact!(self, d => d.unique_id())
    }

    pub fn display_name(&self) -> &str {
        each_artifact!(self, d => d.display_name())
    }

    pub fn location(&self) -> Option<&str> {
        each_artifact!(self, d => d.location())
    }

    pub fn artifact_ref(&self) -> ArtifactRef {
        each_artifact!(self, d => d.artifact_ref())
    }

    pub fn references(&self) -> &[ArtifactRef] {
        each_artifact!(self, d => d.references())
    }

    pub fn is_populated(&self) -> bool {
        each_artifact!(self, d => d.is_populated())
    }

    pub fn downcast<D: Descriptor>(&self) -> Option<&Arc<D>> {
        D::from_artifact(self)
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            kind: self.kind(),
            id: self.unique_id(),
            name: self.display_name().to_string(),
            location: self.location().map(str::to_string),
        }
    }

    fn addr(&self) -> usize {
        each_artifact!(self, d => Arc::as_ptr(d) as *const () as usize)
    }
}

impl PartialEq for Artifact {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.addr() == other.addr()
    }
}

impl Eq for Artifact {}

impl Hash for Artifact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        self.addr().hash(state);
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.unique_id())
    }
}

/// Serializable view of a descriptor for reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub kind: ArtifactKind,
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Split a `location#name` composite; the name is everything after the last `#`
pub(crate) fn split_composite(kind: ArtifactKind, id: &str) -> Result<(&str, &str)> {
    match id.rsplit_once('#') {
        Some((location, name)) if !location.is_empty() && !name.is_empty() => Ok((location, name)),
        _ => Err(crate::error::ArtifactError::InvalidIdentity {
            kind,
            id: id.to_string(),
        }),
    }
}
