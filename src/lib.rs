//! Artifact Dependency Graph
//!
//! An in-memory graph of the artifacts that make up an application platform:
//! entities, services, service-triggered event rules, form and screen
//! widgets, and front-controller requests and views. Each artifact gets a
//! descriptor holding its forward references; the registry keeps reverse
//! indices so callers can ask both "what does X use?" and "what uses X?".
//!
//! ## Features
//!
//! - **Lazy construction**: descriptors are built on first request, with an
//!   eager pass over every entity and service when a namespace is loaded
//! - **Cycle safety**: descriptors are published before their references are
//!   resolved, so mutually referencing artifacts terminate
//! - **Per-namespace caching**: one fully built registry per namespace, built
//!   at most once under concurrent first use
//! - **Impact analysis**: petgraph snapshots for transitive dependents and
//!   cycle groups
//!
//! ## Architecture
//!
//! ```text
//! NamespaceSource ──open──▶ MetadataProviders ──▶ ArtifactRegistry ──▶ DependencyGraph
//!        ▲                  (entities, services,    │ forward maps
//!   GraphConfig              rules, widgets,         │ reverse index
//!   (metadata dirs)          controllers)            ▼
//!                                             RegistryCache (namespace → registry)
//! ```

pub mod artifact;
pub mod cache;
pub mod config;
pub mod digest;
pub mod error;
pub mod graph;
pub mod metadata;
pub mod registry;

pub use artifact::{
    Artifact, ArtifactKind, ArtifactRef, ArtifactSummary, ControllerRequestArtifact,
    ControllerViewArtifact, Descriptor, EntityArtifact, FormArtifact, RuleHandle, ScreenArtifact,
    ServiceArtifact, ServiceEcaArtifact,
};
pub use cache::RegistryCache;
pub use config::GraphConfig;
pub use digest::SourceDigest;
pub use error::{ArtifactError, Result};
pub use graph::{ClosureNode, Cycle, DependencyGraph};
pub use metadata::{
    FsMetadataSource, InMemoryMetadata, MetadataProviders, NamespaceSource, DEFAULT_NAMESPACE,
};
pub use registry::{describe_failure, ArtifactRegistry, RegistryStats, ReverseEntry, SearchHit};
