//! Artifact Registry
//!
//! Owns one forward map per artifact kind (identity → descriptor) and the
//! reverse index (referenced artifact → referrers). Every kind is reached
//! through a get-or-create accessor:
//!
//! 1. a hit on a fully populated descriptor returns it immediately;
//! 2. otherwise the caller takes the registry's construction lock, looks
//!    again, and on a miss reads the identity-level metadata, publishes the
//!    new descriptor in its forward map, and only then runs its population
//!    step (reverse-index registration, optional construction of referenced
//!    descriptors).
//!
//! Publishing before populating is what makes reference cycles terminate: a
//! re-entrant lookup of an identity still under construction finds it and
//! returns the partially populated instance instead of recursing. The
//! construction lock is re-entrant, so only the constructing thread can
//! observe such an instance; other threads wait for the outermost
//! construction to finish. Snapshots, searches and reverse lookups follow the
//! same rule: a thread that does not hold the construction lock only ever
//! sees populated descriptors.
//!
//! A descriptor whose population fails is withdrawn from its forward map and
//! from the reverse index before the error propagates, so the next lookup
//! retries from scratch.

mod lookup;
mod reverse;

pub use lookup::{KindCount, RegistryStats, SearchHit};
pub use reverse::{ReverseEntry, ReverseIndex};

use chrono::{DateTime, Utc};
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use crate::artifact::{
    split_composite, Artifact, ArtifactKind, ArtifactRef, ControllerRequestArtifact,
    ControllerViewArtifact, Descriptor, EntityArtifact, FormArtifact, Populate, RuleHandle,
    ScreenArtifact, ServiceArtifact, ServiceEcaArtifact,
};
use crate::error::{ArtifactError, Result};
use crate::metadata::{normalize_namespace, MetadataProviders, ServiceEcaRule};

/// Forward map of one artifact kind
struct KindMap<K, D> {
    items: RwLock<HashMap<K, Arc<D>>>,
}

impl<K: Eq + Hash + Clone, D: Descriptor> KindMap<K, D> {
    fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Descriptor under `key`; one still being populated only when `partial`
    fn get(&self, key: &K, partial: bool) -> Option<Arc<D>> {
        self.items
            .read()
            .get(key)
            .filter(|d| partial || d.is_populated())
            .cloned()
    }

    fn insert(&self, key: K, value: Arc<D>) {
        self.items.write().insert(key, value);
    }

    fn remove(&self, key: &K) {
        self.items.write().remove(key);
    }

    fn len(&self, partial: bool) -> usize {
        self.items
            .read()
            .values()
            .filter(|d| partial || d.is_populated())
            .count()
    }

    fn values(&self, partial: bool) -> Vec<Arc<D>> {
        self.items
            .read()
            .values()
            .filter(|d| partial || d.is_populated())
            .cloned()
            .collect()
    }
}

impl<D: Descriptor> KindMap<String, D> {
    fn keys_containing(&self, fragment: &str, partial: bool) -> Vec<Arc<D>> {
        self.items
            .read()
            .iter()
            .filter(|(key, value)| key.contains(fragment) && (partial || value.is_populated()))
            .map(|(_, value)| value.clone())
            .collect()
    }
}

/// Dependency graph over the artifacts of one namespace
pub struct ArtifactRegistry {
    namespace: String,
    providers: MetadataProviders,
    built_at: DateTime<Utc>,
    construction: ReentrantMutex<()>,

    entities: KindMap<String, EntityArtifact>,
    services: KindMap<String, ServiceArtifact>,
    service_ecas: KindMap<RuleHandle, ServiceEcaArtifact>,
    forms: KindMap<String, FormArtifact>,
    screens: KindMap<String, ScreenArtifact>,
    requests: KindMap<String, ControllerRequestArtifact>,
    views: KindMap<String, ControllerViewArtifact>,

    reverse: ReverseIndex,
}

impl ArtifactRegistry {
    /// Create an empty registry over `providers` without running the eager pass
    pub fn new(namespace: &str, providers: MetadataProviders) -> Self {
        Self {
            namespace: normalize_namespace(namespace).to_string(),
            providers,
            built_at: Utc::now(),
            construction: ReentrantMutex::new(()),
            entities: KindMap::new(),
            services: KindMap::new(),
            service_ecas: KindMap::new(),
            forms: KindMap::new(),
            screens: KindMap::new(),
            requests: KindMap::new(),
            views: KindMap::new(),
            reverse: ReverseIndex::new(),
        }
    }

    /// Create a registry and run the eager pass
    pub fn build(namespace: &str, providers: MetadataProviders) -> Result<Self> {
        let registry = Self::new(namespace, providers);
        registry.prepare_all()?;
        Ok(registry)
    }

    /// Eager pass: construct every entity, then every service
    ///
    /// Event rules are discovered through their services. Forms, screens and
    /// controller artifacts have no enumeration source and stay lazy. The
    /// pass stops at the first failure; descriptors built before it stay.
    pub fn prepare_all(&self) -> Result<()> {
        let started = Instant::now();

        let entity_names = self.providers.entities.entity_names()?;
        for name in &entity_names {
            self.entity(name)?;
        }

        let service_names = self.providers.services.service_names()?;
        for name in &service_names {
            self.service(name)?;
        }

        tracing::info!(
            namespace = %self.namespace,
            entities = self.count(ArtifactKind::Entity),
            services = self.count(ArtifactKind::Service),
            service_ecas = self.count(ArtifactKind::ServiceEca),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "artifact registry prepared"
        );
        Ok(())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn providers(&self) -> &MetadataProviders {
        &self.providers
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// The raw reverse index, including referrers other threads are still populating
    pub fn reverse_index(&self) -> &ReverseIndex {
        &self.reverse
    }

    /// Every reverse-index slot, ordered by target then referrer kind
    pub fn reverse_entries(&self) -> Vec<ReverseEntry> {
        let partial = self.sees_partial();
        self.reverse
            .entries()
            .into_iter()
            .filter_map(|mut entry| {
                entry.referrers.retain(|a| partial || a.is_populated());
                (!entry.referrers.is_empty()).then_some(entry)
            })
            .collect()
    }

    /// True while this thread holds the construction lock, i.e. it may be
    /// looking at descriptors it is still populating further up its stack
    fn sees_partial(&self) -> bool {
        self.construction.is_owned_by_current_thread()
    }

    // ========== Get-or-create accessors ==========

    pub fn entity(&self, name: &str) -> Result<Arc<EntityArtifact>> {
        self.get_or_create(&self.entities, &name.to_string(), || {
            EntityArtifact::load(name, self)
        })
    }

    pub fn service(&self, name: &str) -> Result<Arc<ServiceArtifact>> {
        self.get_or_create(&self.services, &name.to_string(), || {
            ServiceArtifact::load(name, self)
        })
    }

    /// Event rule descriptor, reached through its triggering service
    ///
    /// A rule that its service does not list is unavailable.
    pub fn service_eca(&self, rule: &Arc<ServiceEcaRule>) -> Result<Arc<ServiceEcaArtifact>> {
        let handle = RuleHandle(rule.clone());
        if let Some(found) = self.service_ecas.get(&handle, self.sees_partial()) {
            return Ok(found);
        }

        let service = self.service(&rule.service_name)?;
        let ordinal = service
            .eca_rules()
            .iter()
            .position(|r| Arc::ptr_eq(r, rule))
            .ok_or_else(|| {
                ArtifactError::unavailable(
                    ArtifactKind::ServiceEca,
                    rule.label(),
                    format!("rule is not attached to service '{}'", rule.service_name),
                )
            })?;
        self.attach_service_eca(rule, ordinal)
    }

    /// Get or create the descriptor of the `ordinal`-th rule of its service
    pub(crate) fn attach_service_eca(
        &self,
        rule: &Arc<ServiceEcaRule>,
        ordinal: usize,
    ) -> Result<Arc<ServiceEcaArtifact>> {
        self.get_or_create(&self.service_ecas, &RuleHandle(rule.clone()), || {
            Ok(ServiceEcaArtifact::new(rule, ordinal))
        })
    }

    pub fn form(&self, location: &str, name: &str) -> Result<Arc<FormArtifact>> {
        self.get_or_create(&self.forms, &format!("{location}#{name}"), || {
            FormArtifact::load(location, name, self)
        })
    }

    /// Form by `location#name`
    pub fn form_by_id(&self, id: &str) -> Result<Arc<FormArtifact>> {
        let (location, name) = split_composite(ArtifactKind::FormWidget, id)?;
        self.form(location, name)
    }

    pub fn screen(&self, location: &str, name: &str) -> Result<Arc<ScreenArtifact>> {
        self.get_or_create(&self.screens, &format!("{location}#{name}"), || {
            ScreenArtifact::load(location, name, self)
        })
    }

    /// Screen by `location#name`
    pub fn screen_by_id(&self, id: &str) -> Result<Arc<ScreenArtifact>> {
        let (location, name) = split_composite(ArtifactKind::ScreenWidget, id)?;
        self.screen(location, name)
    }

    pub fn controller_request(&self, controller: &str, uri: &str) -> Result<Arc<ControllerRequestArtifact>> {
        self.get_or_create(&self.requests, &format!("{controller}#{uri}"), || {
            ControllerRequestArtifact::load(controller, uri, self)
        })
    }

    /// Controller request by `controller#uri`
    pub fn controller_request_by_id(&self, id: &str) -> Result<Arc<ControllerRequestArtifact>> {
        let (controller, uri) = split_composite(ArtifactKind::ControllerRequest, id)?;
        self.controller_request(controller, uri)
    }

    pub fn controller_view(&self, controller: &str, uri: &str) -> Result<Arc<ControllerViewArtifact>> {
        self.get_or_create(&self.views, &format!("{controller}#{uri}"), || {
            ControllerViewArtifact::load(controller, uri, self)
        })
    }

    /// Controller view by `controller#uri`
    pub fn controller_view_by_id(&self, id: &str) -> Result<Arc<ControllerViewArtifact>> {
        let (controller, uri) = split_composite(ArtifactKind::ControllerView, id)?;
        self.controller_view(controller, uri)
    }

    /// Resolve any reference through the accessor of its kind
    pub fn artifact(&self, target: &ArtifactRef) -> Result<Artifact> {
        Ok(match target {
            ArtifactRef::Entity(name) => Artifact::Entity(self.entity(name)?),
            ArtifactRef::Service(name) => Artifact::Service(self.service(name)?),
            ArtifactRef::ServiceEca(handle) => Artifact::ServiceEca(self.service_eca(&handle.0)?),
            ArtifactRef::FormWidget(id) => Artifact::FormWidget(self.form_by_id(id)?),
            ArtifactRef::ScreenWidget(id) => Artifact::ScreenWidget(self.screen_by_id(id)?),
            ArtifactRef::ControllerRequest(id) => {
                Artifact::ControllerRequest(self.controller_request_by_id(id)?)
            }
            ArtifactRef::ControllerView(id) => Artifact::ControllerView(self.controller_view_by_id(id)?),
        })
    }

    /// Already-constructed descriptor for `target`, without constructing anything
    pub fn existing(&self, target: &ArtifactRef) -> Option<Artifact> {
        let partial = self.sees_partial();
        match target {
            ArtifactRef::Entity(name) => self.entities.get(name, partial).map(Artifact::Entity),
            ArtifactRef::Service(name) => self.services.get(name, partial).map(Artifact::Service),
            ArtifactRef::ServiceEca(handle) => {
                self.service_ecas.get(handle, partial).map(Artifact::ServiceEca)
            }
            ArtifactRef::FormWidget(id) => self.forms.get(id, partial).map(Artifact::FormWidget),
            ArtifactRef::ScreenWidget(id) => self.screens.get(id, partial).map(Artifact::ScreenWidget),
            ArtifactRef::ControllerRequest(id) => {
                self.requests.get(id, partial).map(Artifact::ControllerRequest)
            }
            ArtifactRef::ControllerView(id) => self.views.get(id, partial).map(Artifact::ControllerView),
        }
    }

    fn get_or_create<K, D>(
        &self,
        map: &KindMap<K, D>,
        key: &K,
        load: impl FnOnce() -> Result<D>,
    ) -> Result<Arc<D>>
    where
        K: Eq + Hash + Clone,
        D: Populate,
    {
        if let Some(found) = map.get(key, false) {
            return Ok(found);
        }

        let _guard = self.construction.lock();

        // Either finished by another thread while we waited, or still being
        // populated further up this thread's own call stack.
        if let Some(found) = map.get(key, true) {
            return Ok(found);
        }

        let kind = D::KIND;
        let descriptor = Arc::new(load()?);
        map.insert(key.clone(), descriptor.clone());
        tracing::debug!(
            namespace = %self.namespace,
            kind = %kind,
            id = %descriptor.unique_id(),
            "constructing artifact"
        );

        if let Err(err) = descriptor.populate(self) {
            map.remove(key);
            self.reverse.withdraw(&descriptor.clone().into_artifact());
            tracing::warn!(
                namespace = %self.namespace,
                kind = %kind,
                id = %descriptor.unique_id(),
                error = %err,
                "artifact construction failed, descriptor withdrawn"
            );
            return Err(err);
        }

        Ok(descriptor)
    }

    /// Register `referrer` in the reverse index under each reference and
    /// return the deduplicated forward set
    pub(crate) fn link(
        &self,
        referrer: &Artifact,
        refs: impl IntoIterator<Item = ArtifactRef>,
    ) -> Vec<ArtifactRef> {
        let refs = crate::artifact::dedup_refs(refs);
        for target in &refs {
            self.reverse.insert(target.clone(), referrer.clone());
        }
        refs
    }

    // ========== Forward map iteration ==========

    pub fn all_entities(&self) -> Vec<Arc<EntityArtifact>> {
        sorted(self.entities.values(self.sees_partial()))
    }

    pub fn all_services(&self) -> Vec<Arc<ServiceArtifact>> {
        sorted(self.services.values(self.sees_partial()))
    }

    pub fn all_service_ecas(&self) -> Vec<Arc<ServiceEcaArtifact>> {
        sorted(self.service_ecas.values(self.sees_partial()))
    }

    pub fn all_forms(&self) -> Vec<Arc<FormArtifact>> {
        sorted(self.forms.values(self.sees_partial()))
    }

    pub fn all_screens(&self) -> Vec<Arc<ScreenArtifact>> {
        sorted(self.screens.values(self.sees_partial()))
    }

    pub fn all_controller_requests(&self) -> Vec<Arc<ControllerRequestArtifact>> {
        sorted(self.requests.values(self.sees_partial()))
    }

    pub fn all_controller_views(&self) -> Vec<Arc<ControllerViewArtifact>> {
        sorted(self.views.values(self.sees_partial()))
    }

    /// Every constructed descriptor, ordered by kind then id
    pub fn all_artifacts(&self) -> Vec<Artifact> {
        let partial = self.sees_partial();
        let mut all: Vec<Artifact> = Vec::new();
        all.extend(self.entities.values(partial).into_iter().map(Artifact::Entity));
        all.extend(self.services.values(partial).into_iter().map(Artifact::Service));
        all.extend(self.service_ecas.values(partial).into_iter().map(Artifact::ServiceEca));
        all.extend(self.forms.values(partial).into_iter().map(Artifact::FormWidget));
        all.extend(self.screens.values(partial).into_iter().map(Artifact::ScreenWidget));
        all.extend(self.requests.values(partial).into_iter().map(Artifact::ControllerRequest));
        all.extend(self.views.values(partial).into_iter().map(Artifact::ControllerView));
        reverse::sort_artifacts(&mut all);
        all
    }

    pub fn count(&self, kind: ArtifactKind) -> usize {
        let partial = self.sees_partial();
        match kind {
            ArtifactKind::Entity => self.entities.len(partial),
            ArtifactKind::Service => self.services.len(partial),
            ArtifactKind::ServiceEca => self.service_ecas.len(partial),
            ArtifactKind::FormWidget => self.forms.len(partial),
            ArtifactKind::ScreenWidget => self.screens.len(partial),
            ArtifactKind::ControllerRequest => self.requests.len(partial),
            ArtifactKind::ControllerView => self.views.len(partial),
        }
    }

    // ========== Reverse lookups ==========

    /// Referrers of `target` of descriptor type `D`
    pub fn referrers<D: Descriptor>(&self, target: &ArtifactRef) -> Vec<Arc<D>> {
        let partial = self.sees_partial();
        self.reverse
            .referrers(target, D::KIND)
            .iter()
            .filter(|a| partial || a.is_populated())
            .filter_map(|a| D::from_artifact(a).cloned())
            .collect()
    }

    /// Referrers of `target` of every kind
    pub fn all_referrers(&self, target: &ArtifactRef) -> Vec<Artifact> {
        let partial = self.sees_partial();
        let mut found = self.reverse.all_referrers(target);
        found.retain(|a| partial || a.is_populated());
        found
    }

    pub fn entities_referring_to_entity(&self, name: &str) -> Vec<Arc<EntityArtifact>> {
        self.referrers(&ArtifactRef::entity(name))
    }

    pub fn entities_referring_to_service(&self, name: &str) -> Vec<Arc<EntityArtifact>> {
        self.referrers(&ArtifactRef::service(name))
    }

    pub fn services_referring_to_entity(&self, name: &str) -> Vec<Arc<ServiceArtifact>> {
        self.referrers(&ArtifactRef::entity(name))
    }

    pub fn services_referring_to_service(&self, name: &str) -> Vec<Arc<ServiceArtifact>> {
        self.referrers(&ArtifactRef::service(name))
    }

    pub fn services_referring_to_service_eca(&self, rule: &Arc<ServiceEcaRule>) -> Vec<Arc<ServiceArtifact>> {
        self.referrers(&ArtifactRef::service_eca(rule))
    }

    pub fn service_ecas_referring_to_service(&self, name: &str) -> Vec<Arc<ServiceEcaArtifact>> {
        self.referrers(&ArtifactRef::service(name))
    }

    pub fn forms_referring_to_entity(&self, name: &str) -> Vec<Arc<FormArtifact>> {
        self.referrers(&ArtifactRef::entity(name))
    }

    pub fn forms_referring_to_service(&self, name: &str) -> Vec<Arc<FormArtifact>> {
        self.referrers(&ArtifactRef::service(name))
    }

    pub fn screens_referring_to_entity(&self, name: &str) -> Vec<Arc<ScreenArtifact>> {
        self.referrers(&ArtifactRef::entity(name))
    }

    pub fn screens_referring_to_service(&self, name: &str) -> Vec<Arc<ScreenArtifact>> {
        self.referrers(&ArtifactRef::service(name))
    }

    pub fn screens_referring_to_form(&self, location: &str, name: &str) -> Vec<Arc<ScreenArtifact>> {
        self.referrers(&ArtifactRef::form(location, name))
    }

    pub fn screens_referring_to_screen(&self, location: &str, name: &str) -> Vec<Arc<ScreenArtifact>> {
        self.referrers(&ArtifactRef::screen(location, name))
    }

    pub fn requests_referring_to_request(&self, controller: &str, uri: &str) -> Vec<Arc<ControllerRequestArtifact>> {
        self.referrers(&ArtifactRef::controller_request(controller, uri))
    }

    pub fn requests_referring_to_view(&self, controller: &str, uri: &str) -> Vec<Arc<ControllerRequestArtifact>> {
        self.referrers(&ArtifactRef::controller_view(controller, uri))
    }

    pub fn requests_referring_to_service(&self, name: &str) -> Vec<Arc<ControllerRequestArtifact>> {
        self.referrers(&ArtifactRef::service(name))
    }

    pub fn views_referring_to_screen(&self, location: &str, name: &str) -> Vec<Arc<ControllerViewArtifact>> {
        self.referrers(&ArtifactRef::screen(location, name))
    }
}

impl std::fmt::Debug for ArtifactRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactRegistry")
            .field("namespace", &self.namespace)
            .field("entities", &self.count(ArtifactKind::Entity))
            .field("services", &self.count(ArtifactKind::Service))
            .field("service_ecas", &self.count(ArtifactKind::ServiceEca))
            .field("reverse_entries", &self.reverse.len())
            .finish_non_exhaustive()
    }
}

fn sorted<D: Descriptor>(mut items: Vec<Arc<D>>) -> Vec<Arc<D>> {
    items.sort_by_cached_key(|d| d.unique_id());
    items
}

/// Surface a construction failure the way callers should report it
pub fn describe_failure(target: &ArtifactRef, err: &ArtifactError) -> String {
    format!("could not build dependency graph for artifact {}: {}", target, err)
}
