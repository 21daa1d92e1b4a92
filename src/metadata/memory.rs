//! In-memory metadata source.
//!
//! Definitions are registered up front (or added later through `&self`
//! inserts) and served from shared maps. Handy for embedding and for tests.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use super::{
    ControllerConfig, ControllerLoader, DispatchContext, EntityEcaRule, EntityMetadata,
    EntityModelReader, EventRuleSource, FormMetadata, MetadataProviders, ScreenMetadata,
    ServiceEcaRule, ServiceMetadata, WidgetLoader,
};
use crate::artifact::ArtifactKind;
use crate::error::{ArtifactError, Result};

#[derive(Default)]
struct Definitions {
    entities: BTreeMap<String, Arc<EntityMetadata>>,
    services: BTreeMap<String, Arc<ServiceMetadata>>,
    service_rules: HashMap<String, Vec<Arc<ServiceEcaRule>>>,
    entity_rules: HashMap<String, Vec<Arc<EntityEcaRule>>>,
    forms: HashMap<(String, String), Arc<FormMetadata>>,
    screens: HashMap<(String, String), Arc<ScreenMetadata>>,
    controllers: HashMap<String, Arc<ControllerConfig>>,
}

/// Metadata held entirely in memory
#[derive(Default)]
pub struct InMemoryMetadata {
    defs: RwLock<Definitions>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(self, entity: EntityMetadata) -> Self {
        self.insert_entity(entity);
        self
    }

    pub fn with_service(self, service: ServiceMetadata) -> Self {
        self.insert_service(service);
        self
    }

    pub fn with_service_rule(self, rule: ServiceEcaRule) -> Self {
        self.insert_service_rule(rule);
        self
    }

    pub fn with_entity_rule(self, rule: EntityEcaRule) -> Self {
        self.defs
            .write()
            .entity_rules
            .entry(rule.entity_name.clone())
            .or_default()
            .push(Arc::new(rule));
        self
    }

    pub fn with_form(self, location: impl Into<String>, form: FormMetadata) -> Self {
        let key = (location.into(), form.name.clone());
        self.defs.write().forms.insert(key, Arc::new(form));
        self
    }

    pub fn with_screen(self, location: impl Into<String>, screen: ScreenMetadata) -> Self {
        let key = (location.into(), screen.name.clone());
        self.defs.write().screens.insert(key, Arc::new(screen));
        self
    }

    pub fn with_controller(self, location: impl Into<String>, config: ControllerConfig) -> Self {
        self.defs.write().controllers.insert(location.into(), Arc::new(config));
        self
    }

    pub fn insert_entity(&self, entity: EntityMetadata) {
        self.defs.write().entities.insert(entity.name.clone(), Arc::new(entity));
    }

    pub fn insert_service(&self, service: ServiceMetadata) {
        self.defs.write().services.insert(service.name.clone(), Arc::new(service));
    }

    /// Attach a rule to its service; returns the shared handle the registry will key on
    pub fn insert_service_rule(&self, rule: ServiceEcaRule) -> Arc<ServiceEcaRule> {
        let rule = Arc::new(rule);
        self.defs
            .write()
            .service_rules
            .entry(rule.service_name.clone())
            .or_default()
            .push(rule.clone());
        rule
    }

    /// Wrap into a provider bundle serving every role
    pub fn into_providers(self) -> MetadataProviders {
        MetadataProviders::from_source(Arc::new(self))
    }
}

impl EntityModelReader for InMemoryMetadata {
    fn entity_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.defs.read().entities.keys().cloned().collect())
    }

    fn entity(&self, name: &str) -> Result<Arc<EntityMetadata>> {
        self.defs
            .read()
            .entities
            .get(name)
            .cloned()
            .ok_or_else(|| ArtifactError::unavailable(ArtifactKind::Entity, name, "no entity definition"))
    }
}

impl DispatchContext for InMemoryMetadata {
    fn service_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.defs.read().services.keys().cloned().collect())
    }

    fn service(&self, name: &str) -> Result<Arc<ServiceMetadata>> {
        self.defs
            .read()
            .services
            .get(name)
            .cloned()
            .ok_or_else(|| ArtifactError::unavailable(ArtifactKind::Service, name, "no service definition"))
    }
}

impl EventRuleSource for InMemoryMetadata {
    fn service_rules(&self, service_name: &str) -> Result<Vec<Arc<ServiceEcaRule>>> {
        Ok(self
            .defs
            .read()
            .service_rules
            .get(service_name)
            .cloned()
            .unwrap_or_default())
    }

    fn entity_rules(&self, entity_name: &str) -> Result<Vec<Arc<EntityEcaRule>>> {
        Ok(self
            .defs
            .read()
            .entity_rules
            .get(entity_name)
            .cloned()
            .unwrap_or_default())
    }
}

impl WidgetLoader for InMemoryMetadata {
    fn form(&self, location: &str, name: &str) -> Result<Arc<FormMetadata>> {
        self.defs
            .read()
            .forms
            .get(&(location.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                ArtifactError::unavailable(
                    ArtifactKind::FormWidget,
                    format!("{location}#{name}"),
                    "no form definition at location",
                )
            })
    }

    fn screen(&self, location: &str, name: &str) -> Result<Arc<ScreenMetadata>> {
        self.defs
            .read()
            .screens
            .get(&(location.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                ArtifactError::unavailable(
                    ArtifactKind::ScreenWidget,
                    format!("{location}#{name}"),
                    "no screen definition at location",
                )
            })
    }
}

impl ControllerLoader for InMemoryMetadata {
    fn controller(&self, location: &str) -> Result<Arc<ControllerConfig>> {
        self.defs
            .read()
            .controllers
            .get(location)
            .cloned()
            .ok_or_else(|| ArtifactError::Provider(format!("no controller configuration at {location}")))
    }
}
