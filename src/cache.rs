//! Registry Cache
//!
//! Process-wide map from namespace identifier to its fully built
//! [`ArtifactRegistry`]. Each namespace gets its own build slot, so different
//! namespaces build concurrently while concurrent requests for the same
//! namespace wait for a single build.
//!
//! A build that fails leaves its slot empty: the error goes to the caller that
//! ran the build, and the next caller (including one that was waiting) runs
//! the build again.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::metadata::NamespaceSource;
use crate::registry::ArtifactRegistry;

type Slot = Arc<Mutex<Option<Arc<ArtifactRegistry>>>>;

pub struct RegistryCache {
    source: Box<dyn NamespaceSource>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl RegistryCache {
    pub fn new(source: impl NamespaceSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Registry for `namespace`, building it (eager pass included) on first use
    ///
    /// An empty identifier selects the source's default namespace.
    pub fn get(&self, namespace: &str) -> Result<Arc<ArtifactRegistry>> {
        let namespace = self.resolve(namespace);
        let slot = self.slot(namespace);

        // Held for the whole build so other callers for this namespace wait
        let mut built = slot.lock();
        if let Some(registry) = built.as_ref() {
            tracing::debug!(namespace, "artifact registry cache hit");
            return Ok(registry.clone());
        }

        let started = Instant::now();
        tracing::info!(namespace, "building artifact registry");

        let registry = match self
            .source
            .open(namespace)
            .and_then(|providers| ArtifactRegistry::build(namespace, providers))
        {
            Ok(registry) => Arc::new(registry),
            Err(err) => {
                tracing::error!(namespace, error = %err, "artifact registry build failed");
                return Err(err);
            }
        };

        tracing::info!(
            namespace,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "artifact registry cached"
        );
        *built = Some(registry.clone());
        Ok(registry)
    }

    /// Drop the cached registry for `namespace`; returns whether one was cached
    ///
    /// Holders of the evicted registry keep using it. The next
    /// [`get`](Self::get) builds a fresh one.
    pub fn evict(&self, namespace: &str) -> bool {
        let namespace = self.resolve(namespace);
        let removed = self.slots.lock().remove(namespace);
        let was_built = removed.map(|slot| slot.lock().is_some()).unwrap_or(false);
        if was_built {
            tracing::info!(namespace, "artifact registry evicted");
        }
        was_built
    }

    /// Whether a built registry is cached for `namespace`
    pub fn contains(&self, namespace: &str) -> bool {
        let namespace = self.resolve(namespace);
        let slot = self.slots.lock().get(namespace).cloned();
        slot.map(|slot| slot.lock().is_some()).unwrap_or(false)
    }

    /// Namespaces with a built registry, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let slots: Vec<(String, Slot)> = self
            .slots
            .lock()
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();
        let mut names: Vec<String> = slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().is_some())
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    fn resolve<'a>(&'a self, namespace: &'a str) -> &'a str {
        if namespace.is_empty() {
            self.source.default_namespace()
        } else {
            namespace
        }
    }

    fn slot(&self, namespace: &str) -> Slot {
        self.slots
            .lock()
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }
}

impl std::fmt::Debug for RegistryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCache")
            .field("namespaces", &self.namespaces())
            .finish_non_exhaustive()
    }
}
