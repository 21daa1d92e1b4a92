//! Metadata Providers
//!
//! The registry never parses artifact definitions itself. It consumes the
//! structured descriptions produced by these readers:
//!
//! - [`EntityModelReader`]: entity names and entity definitions
//! - [`DispatchContext`]: service names and service definitions
//! - [`EventRuleSource`]: service-triggered and entity-triggered event rules
//! - [`WidgetLoader`]: form and screen definitions by `location` + `name`
//! - [`ControllerLoader`]: request/view maps of a front-controller location
//!
//! A [`MetadataProviders`] bundle groups one of each for a namespace, and a
//! [`NamespaceSource`] maps namespace identifiers to bundles.

pub mod fs;
pub mod memory;
pub mod model;

pub use fs::FsMetadataSource;
pub use memory::InMemoryMetadata;
pub use model::*;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::Result;

/// Namespace used when a caller passes an empty identifier
pub const DEFAULT_NAMESPACE: &str = "default";

/// Normalize a namespace identifier (empty selects the default)
pub fn normalize_namespace(namespace: &str) -> &str {
    if namespace.is_empty() {
        DEFAULT_NAMESPACE
    } else {
        namespace
    }
}

pub trait EntityModelReader: Send + Sync {
    fn entity_names(&self) -> Result<BTreeSet<String>>;

    fn entity(&self, name: &str) -> Result<Arc<EntityMetadata>>;
}

pub trait DispatchContext: Send + Sync {
    fn service_names(&self) -> Result<BTreeSet<String>>;

    fn service(&self, name: &str) -> Result<Arc<ServiceMetadata>>;
}

/// Event rules attached to services and entities
///
/// Implementations must hand out the same `Arc` for the same rule on every
/// call; rule artifacts are keyed by that allocation.
pub trait EventRuleSource: Send + Sync {
    fn service_rules(&self, service_name: &str) -> Result<Vec<Arc<ServiceEcaRule>>>;

    fn entity_rules(&self, entity_name: &str) -> Result<Vec<Arc<EntityEcaRule>>>;
}

pub trait WidgetLoader: Send + Sync {
    fn form(&self, location: &str, name: &str) -> Result<Arc<FormMetadata>>;

    fn screen(&self, location: &str, name: &str) -> Result<Arc<ScreenMetadata>>;
}

pub trait ControllerLoader: Send + Sync {
    fn controller(&self, location: &str) -> Result<Arc<ControllerConfig>>;
}

/// The readers a registry captures when it is built
#[derive(Clone)]
pub struct MetadataProviders {
    pub entities: Arc<dyn EntityModelReader>,
    pub services: Arc<dyn DispatchContext>,
    pub rules: Arc<dyn EventRuleSource>,
    pub widgets: Arc<dyn WidgetLoader>,
    pub controllers: Arc<dyn ControllerLoader>,
    /// Fingerprint of the underlying definitions, if the source computes one
    pub source_digest: Option<String>,
}

impl MetadataProviders {
    /// Use one value for every provider role
    pub fn from_source<S>(source: Arc<S>) -> Self
    where
        S: EntityModelReader
            + DispatchContext
            + EventRuleSource
            + WidgetLoader
            + ControllerLoader
            + 'static,
    {
        Self {
            entities: source.clone(),
            services: source.clone(),
            rules: source.clone(),
            widgets: source.clone(),
            controllers: source,
            source_digest: None,
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.source_digest = Some(digest.into());
        self
    }
}

impl std::fmt::Debug for MetadataProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataProviders")
            .field("source_digest", &self.source_digest)
            .finish_non_exhaustive()
    }
}

/// Maps a namespace identifier to the providers serving it
pub trait NamespaceSource: Send + Sync {
    fn open(&self, namespace: &str) -> Result<MetadataProviders>;

    /// Namespace that an empty identifier selects
    fn default_namespace(&self) -> &str {
        DEFAULT_NAMESPACE
    }
}

impl<F> NamespaceSource for F
where
    F: Fn(&str) -> Result<MetadataProviders> + Send + Sync,
{
    fn open(&self, namespace: &str) -> Result<MetadataProviders> {
        self(namespace)
    }
}
