//! Registry behavior against in-memory metadata

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use artifact_graph::metadata::{
    ControllerConfig, EntityEcaRule, EntityMetadata, EntityModelReader, EventRuleSource,
    FormMetadata, RelationType, RequestEvent, RequestMapping, RequestResponse, ResponseType,
    ScreenMetadata, ServiceEcaRule, ServiceMetadata, ViewMapping, WidgetRef,
};
use artifact_graph::{
    ArtifactError, ArtifactKind, ArtifactRef, ArtifactRegistry, DependencyGraph, Descriptor,
    InMemoryMetadata, MetadataProviders, RegistryCache, Result,
};

const FORMS: &str = "party/widget/PartyForms.json";
const SCREENS: &str = "party/widget/PartyScreens.json";
const CONTROLLER: &str = "party/webapp/controller.json";

fn controller() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.requests.insert(
        "createParty".into(),
        RequestMapping {
            event: Some(RequestEvent {
                event_type: "service".into(),
                path: None,
                invoke: "createParty".into(),
            }),
            responses: vec![
                RequestResponse {
                    name: "success".into(),
                    response_type: ResponseType::View,
                    value: "EditParty".into(),
                },
                RequestResponse {
                    name: "error".into(),
                    response_type: ResponseType::Request,
                    value: "main".into(),
                },
            ],
            https: true,
            auth: true,
        },
    );
    config.requests.insert("main".into(), RequestMapping::default());
    config.views.insert(
        "EditParty".into(),
        ViewMapping {
            view_type: "screen".into(),
            page: format!("{SCREENS}#EditParty"),
        },
    );
    config
}

fn party_metadata() -> InMemoryMetadata {
    InMemoryMetadata::new()
        .with_entity(EntityMetadata::new("Party").with_relation(RelationType::Many, "PartyRole"))
        .with_entity(EntityMetadata::new("PartyRole").with_relation(RelationType::One, "Party"))
        .with_entity(EntityMetadata::new("Person"))
        .with_service(ServiceMetadata::new("createParty").using_entity("Party"))
        .with_service(ServiceMetadata::new("createPartyRelationship").using_entity("PartyRole"))
        .with_form(
            FORMS,
            FormMetadata {
                name: "EditParty".into(),
                default_entity: Some("Party".into()),
                default_service: Some("createParty".into()),
                target: Some("createParty".into()),
                ..Default::default()
            },
        )
        .with_screen(
            SCREENS,
            ScreenMetadata {
                name: "EditParty".into(),
                entities: vec!["Party".into()],
                forms: vec![WidgetRef::new(FORMS, "EditParty")],
                screens: vec![WidgetRef::new("common/CommonScreens.json", "main-decorator")],
                ..Default::default()
            },
        )
        .with_controller(CONTROLLER, controller())
}

fn ping_pong() -> Arc<InMemoryMetadata> {
    Arc::new(
        InMemoryMetadata::new()
            .with_service(ServiceMetadata::new("A"))
            .with_service(ServiceMetadata::new("B"))
            .with_service_rule(ServiceEcaRule::new("A", "commit").with_action("B"))
            .with_service_rule(ServiceEcaRule::new("B", "commit").with_action("A")),
    )
}

#[test]
fn test_repeated_lookups_return_same_instance() {
    let registry = ArtifactRegistry::build("test", party_metadata().into_providers()).unwrap();

    assert!(Arc::ptr_eq(&registry.entity("Party").unwrap(), &registry.entity("Party").unwrap()));
    assert!(Arc::ptr_eq(
        &registry.service("createParty").unwrap(),
        &registry.service("createParty").unwrap()
    ));

    let form = registry.form(FORMS, "EditParty").unwrap();
    assert!(Arc::ptr_eq(&form, &registry.form_by_id(&format!("{FORMS}#EditParty")).unwrap()));

    let request = registry.controller_request(CONTROLLER, "createParty").unwrap();
    assert!(Arc::ptr_eq(&request, &registry.controller_request(CONTROLLER, "createParty").unwrap()));
}

#[test]
fn test_eager_pass_covers_entities_and_services() {
    let registry = ArtifactRegistry::build("test", party_metadata().into_providers()).unwrap();

    let entities: Vec<String> = registry.all_entities().iter().map(|e| e.name().to_string()).collect();
    assert_eq!(entities, vec!["Party", "PartyRole", "Person"]);

    let services: Vec<String> = registry.all_services().iter().map(|s| s.name().to_string()).collect();
    assert_eq!(services, vec!["createParty", "createPartyRelationship"]);

    let users = registry.services_referring_to_entity("Party");
    assert_eq!(users.len(), 1);
    assert!(Arc::ptr_eq(&users[0], &registry.service("createParty").unwrap()));
}

#[test]
fn test_lazy_kinds_wait_for_a_request() {
    let registry = ArtifactRegistry::build("test", party_metadata().into_providers()).unwrap();
    assert!(registry.all_forms().is_empty());
    assert!(registry.all_screens().is_empty());
    assert!(registry.all_controller_requests().is_empty());
    assert!(registry.all_controller_views().is_empty());

    let screen = registry.screen(SCREENS, "EditParty").unwrap();
    assert_eq!(screen.forms_included(), vec![format!("{FORMS}#EditParty")]);

    // The screen references its form but does not construct it
    assert!(registry.all_forms().is_empty());
    assert_eq!(registry.screens_referring_to_form(FORMS, "EditParty").len(), 1);
    assert_eq!(registry.screens_referring_to_entity("Party").len(), 1);
    assert_eq!(
        registry.screens_referring_to_screen("common/CommonScreens.json", "main-decorator").len(),
        1
    );
}

#[test]
fn test_controller_artifacts() {
    let registry = ArtifactRegistry::build("test", party_metadata().into_providers()).unwrap();

    let request = registry.controller_request(CONTROLLER, "createParty").unwrap();
    assert_eq!(request.service_called(), Some("createParty"));
    assert_eq!(request.views_rendered(), vec!["EditParty"]);
    assert_eq!(request.requests_chained(), vec!["main"]);
    assert_eq!(
        request.references(),
        &[
            ArtifactRef::controller_view(CONTROLLER, "EditParty"),
            ArtifactRef::controller_request(CONTROLLER, "main"),
            ArtifactRef::service("createParty"),
        ]
    );
    assert_eq!(registry.requests_referring_to_service("createParty").len(), 1);
    assert_eq!(registry.requests_referring_to_view(CONTROLLER, "EditParty").len(), 1);
    assert_eq!(registry.requests_referring_to_request(CONTROLLER, "main").len(), 1);

    let view = registry.controller_view_by_id(&format!("{CONTROLLER}#EditParty")).unwrap();
    assert_eq!(view.screen(), Some(WidgetRef::new(SCREENS, "EditParty")));
    assert_eq!(registry.views_referring_to_screen(SCREENS, "EditParty").len(), 1);

    let missing = registry.controller_request(CONTROLLER, "deleteParty").unwrap_err();
    assert!(missing.is_metadata_unavailable());
}

#[test]
fn test_missing_composite_artifacts_are_unavailable() {
    let registry = ArtifactRegistry::new("test", party_metadata().into_providers());

    let err = registry.form(FORMS, "NoSuchForm").unwrap_err();
    assert!(matches!(err, ArtifactError::MetadataUnavailable { kind: ArtifactKind::FormWidget, .. }));
    assert!(registry.screen("nowhere.json", "EditParty").unwrap_err().is_metadata_unavailable());
    assert!(registry.all_artifacts().is_empty());
}

#[test]
fn test_every_forward_reference_is_indexed() {
    let registry = ArtifactRegistry::build("test", party_metadata().into_providers()).unwrap();
    registry.controller_request(CONTROLLER, "createParty").unwrap();
    registry.controller_view(CONTROLLER, "EditParty").unwrap();
    registry.screen(SCREENS, "EditParty").unwrap();
    registry.form(FORMS, "EditParty").unwrap();

    let artifacts = registry.all_artifacts();
    assert_eq!(artifacts.len(), 9);
    for artifact in &artifacts {
        assert!(artifact.is_populated(), "{} not populated", artifact);
        for target in artifact.references() {
            assert!(
                registry.reverse_index().contains(target, artifact),
                "{} -> {} missing from reverse index",
                artifact,
                target
            );
        }
    }

    // Reverse entries exist for referenced names nobody constructed
    let decorator = ArtifactRef::screen("common/CommonScreens.json", "main-decorator");
    assert!(registry.existing(&decorator).is_none());
    assert_eq!(registry.all_referrers(&decorator).len(), 1);

    let slots = registry.reverse_entries();
    assert!(slots
        .iter()
        .any(|e| e.target == decorator && e.referrer_kind == ArtifactKind::ScreenWidget));
}

#[test]
fn test_mutually_triggering_services_terminate() {
    let metadata = ping_pong();
    let registry = ArtifactRegistry::new("test", MetadataProviders::from_source(metadata));

    let a = registry.service("A").unwrap();
    assert!(a.is_populated());

    let b = registry.service("B").unwrap();
    assert!(b.is_populated());
    assert_eq!(registry.all_service_ecas().len(), 2);

    // A's rule targets B and B's rule targets A
    let into_b = registry.service_ecas_referring_to_service("B");
    assert_eq!(into_b.len(), 1);
    assert_eq!(into_b[0].triggering_service(), "A");

    let into_a = registry.service_ecas_referring_to_service("A");
    assert_eq!(into_a.len(), 1);
    assert_eq!(into_a[0].triggering_service(), "B");

    let owners = registry.services_referring_to_service_eca(into_b[0].rule());
    assert!(Arc::ptr_eq(&owners[0], &a));
}

#[test]
fn test_concurrent_lookups_share_one_descriptor() {
    let metadata = ping_pong();
    let registry = ArtifactRegistry::new("test", MetadataProviders::from_source(metadata));

    let found = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = &registry;
                scope.spawn(move || {
                    let name = if i % 2 == 0 { "A" } else { "B" };
                    let service = registry.service(name).unwrap();
                    assert!(service.is_populated());
                    service
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
    });

    for pair in found.chunks(2).collect::<Vec<_>>().windows(2) {
        assert!(Arc::ptr_eq(&pair[0][0], &pair[1][0]));
        assert!(Arc::ptr_eq(&pair[0][1], &pair[1][1]));
    }
    assert_eq!(registry.all_services().len(), 2);
    assert_eq!(registry.all_service_ecas().len(), 2);
}

#[test]
fn test_namespaces_are_isolated() {
    let cache = RegistryCache::new(|_: &str| -> Result<MetadataProviders> {
        Ok(party_metadata().into_providers())
    });

    let default = cache.get("").unwrap();
    let tenant = cache.get("tenant2").unwrap();
    assert!(!Arc::ptr_eq(&default, &tenant));

    let party_default = default.entity("Party").unwrap();
    let party_tenant = tenant.entity("Party").unwrap();
    assert!(!Arc::ptr_eq(&party_default, &party_tenant));

    let users = tenant.services_referring_to_entity("Party");
    assert!(Arc::ptr_eq(&users[0], &tenant.service("createParty").unwrap()));
    assert!(!Arc::ptr_eq(&users[0], &default.service("createParty").unwrap()));
}

#[test]
fn test_partial_name_search() {
    let registry = ArtifactRegistry::build("test", party_metadata().into_providers()).unwrap();
    let found: BTreeSet<String> = registry
        .find_by_partial_name("Part")
        .iter()
        .map(|a| a.to_string())
        .collect();

    assert!(found.contains("entity:Party"));
    assert!(found.contains("service:createPartyRelationship"));
    assert!(!found.contains("entity:Person"));

    // Unconstructed forms are not found
    assert!(found.iter().all(|id| !id.starts_with("form-widget:")));
}

/// Entity reader that fails to load "Bad" a fixed number of times
struct FlakyEntities {
    inner: InMemoryMetadata,
    failures_left: AtomicUsize,
    bad_loads: AtomicUsize,
}

impl EntityModelReader for FlakyEntities {
    fn entity_names(&self) -> Result<BTreeSet<String>> {
        self.inner.entity_names()
    }

    fn entity(&self, name: &str) -> Result<Arc<EntityMetadata>> {
        if name == "Bad" {
            self.bad_loads.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(ArtifactError::Provider("entity store timed out".into()));
            }
        }
        self.inner.entity(name)
    }
}

#[test]
fn test_failed_load_keeps_earlier_entities_and_retries() {
    let flaky = Arc::new(FlakyEntities {
        inner: InMemoryMetadata::new()
            .with_entity(EntityMetadata::new("Alpha"))
            .with_entity(EntityMetadata::new("Bad"))
            .with_entity(EntityMetadata::new("Zed")),
        failures_left: AtomicUsize::new(1),
        bad_loads: AtomicUsize::new(0),
    });
    let mut providers = InMemoryMetadata::new()
        .with_service(ServiceMetadata::new("createAlpha").using_entity("Alpha"))
        .into_providers();
    providers.entities = flaky.clone();

    let registry = ArtifactRegistry::new("test", providers);
    let err = registry.prepare_all().unwrap_err();
    assert!(matches!(err, ArtifactError::Provider(_)));

    // Alpha was built before the failure, nothing after it was
    assert!(registry.existing(&ArtifactRef::entity("Alpha")).is_some());
    assert!(registry.existing(&ArtifactRef::entity("Bad")).is_none());
    assert!(registry.existing(&ArtifactRef::entity("Zed")).is_none());
    assert!(registry.all_services().is_empty());

    // The failure was not cached
    let bad = registry.entity("Bad").unwrap();
    assert_eq!(bad.name(), "Bad");
    assert_eq!(flaky.bad_loads.load(Ordering::SeqCst), 2);

    registry.prepare_all().unwrap();
    assert_eq!(registry.all_entities().len(), 3);
    assert_eq!(registry.all_services().len(), 1);
}

#[test]
fn test_failed_population_withdraws_descriptor() {
    let metadata = Arc::new(
        InMemoryMetadata::new()
            .with_entity(EntityMetadata::new("Party"))
            .with_service(ServiceMetadata::new("createParty").using_entity("Party"))
            .with_service_rule(ServiceEcaRule::new("createParty", "commit").with_action("notifyParty")),
    );
    let registry = ArtifactRegistry::new("test", MetadataProviders::from_source(metadata.clone()));

    let err = registry.service("createParty").unwrap_err();
    assert!(matches!(err, ArtifactError::MetadataUnavailable { kind: ArtifactKind::Service, .. }));
    assert!(registry.existing(&ArtifactRef::service("createParty")).is_none());
    assert!(registry.all_service_ecas().is_empty());
    assert!(registry.services_referring_to_entity("Party").is_empty());

    // Once the missing service exists, the next request builds everything
    metadata.insert_service(ServiceMetadata::new("notifyParty"));
    let service = registry.service("createParty").unwrap();
    assert!(service.is_populated());
    assert_eq!(registry.all_service_ecas().len(), 1);
    assert_eq!(registry.service_ecas_referring_to_service("notifyParty").len(), 1);
}

#[test]
fn test_rule_handles_are_stable() {
    let metadata = Arc::new(InMemoryMetadata::new().with_service(ServiceMetadata::new("createParty")));
    let first = metadata.insert_service_rule(ServiceEcaRule::new("createParty", "commit"));
    let second = metadata.insert_service_rule(ServiceEcaRule::new("createParty", "commit"));
    let registry = ArtifactRegistry::build("test", MetadataProviders::from_source(metadata)).unwrap();

    let a = registry.service_eca(&first).unwrap();
    let b = registry.service_eca(&second).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.unique_id(), "createParty#commit#0");
    assert_eq!(b.unique_id(), "createParty#commit#1");
    assert_eq!(registry.service("createParty").unwrap().eca_rules().len(), 2);
}

#[test]
fn test_rules_outside_their_service_are_unavailable() {
    let metadata = Arc::new(InMemoryMetadata::new().with_service(ServiceMetadata::new("createParty")));
    let attached = metadata.insert_service_rule(ServiceEcaRule::new("createParty", "commit"));
    let registry = ArtifactRegistry::build("test", MetadataProviders::from_source(metadata)).unwrap();

    // Same value as the attached rule, but a different allocation
    let stray = Arc::new(ServiceEcaRule::new("createParty", "commit"));
    let err = registry.service_eca(&stray).unwrap_err();
    assert!(matches!(err, ArtifactError::MetadataUnavailable { kind: ArtifactKind::ServiceEca, .. }));
    assert_eq!(registry.all_service_ecas().len(), 1);
    assert_eq!(registry.service_eca(&attached).unwrap().ordinal(), 0);
}

#[test]
fn test_entity_rules_and_view_members() {
    let view = EntityMetadata {
        name: "PartyAndPerson".into(),
        member_entities: vec!["Party".into(), "Person".into()],
        ..Default::default()
    };
    let providers = InMemoryMetadata::new()
        .with_entity(EntityMetadata::new("Party"))
        .with_entity(EntityMetadata::new("Person"))
        .with_entity(view)
        .with_service(ServiceMetadata::new("indexParty"))
        .with_entity_rule(EntityEcaRule::new("Party", "create", "return").with_action("indexParty"))
        .into_providers();
    let registry = ArtifactRegistry::build("test", providers).unwrap();

    let party = registry.entity("Party").unwrap();
    assert_eq!(party.eca_rules().len(), 1);
    assert_eq!(party.references().to_vec(), vec![ArtifactRef::service("indexParty")]);

    let triggers = registry.entities_referring_to_service("indexParty");
    assert_eq!(triggers.len(), 1);
    assert!(Arc::ptr_eq(&triggers[0], &party));

    let members = registry.entity("PartyAndPerson").unwrap();
    assert!(members.metadata().is_view());
    assert_eq!(
        members.references().to_vec(),
        vec![ArtifactRef::entity("Party"), ArtifactRef::entity("Person")]
    );

    let views: Vec<String> = registry
        .entities_referring_to_entity("Person")
        .iter()
        .map(|e| e.name().to_string())
        .collect();
    assert_eq!(views, vec!["PartyAndPerson"]);
    assert!(registry.entities_referring_to_entity("PartyAndPerson").is_empty());
}

/// Rule source that parks the first lookup of one service's rules until released
struct GatedRules {
    inner: Arc<InMemoryMetadata>,
    service: &'static str,
    armed: AtomicBool,
    entered: Barrier,
    release: Barrier,
}

impl EventRuleSource for GatedRules {
    fn service_rules(&self, service_name: &str) -> Result<Vec<Arc<ServiceEcaRule>>> {
        if service_name == self.service && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
        self.inner.service_rules(service_name)
    }

    fn entity_rules(&self, entity_name: &str) -> Result<Vec<Arc<EntityEcaRule>>> {
        self.inner.entity_rules(entity_name)
    }
}

#[test]
fn test_other_threads_never_see_partial_descriptors() {
    let metadata = ping_pong();
    let gated = Arc::new(GatedRules {
        inner: metadata.clone(),
        service: "B",
        armed: AtomicBool::new(true),
        entered: Barrier::new(2),
        release: Barrier::new(2),
    });
    let mut providers = MetadataProviders::from_source(metadata);
    providers.rules = gated.clone();
    let registry = ArtifactRegistry::new("test", providers);

    std::thread::scope(|scope| {
        // Parks while loading B, with service A and its rule published but
        // not yet populated
        let builder = scope.spawn(|| registry.service("A").map(|a| a.references().len()));
        gated.entered.wait();

        assert!(registry.existing(&ArtifactRef::service("A")).is_none());
        assert!(registry.all_services().is_empty());
        assert!(registry.all_service_ecas().is_empty());
        assert!(registry.all_artifacts().is_empty());
        assert_eq!(registry.count(ArtifactKind::Service), 0);
        assert!(registry.find_by_partial_name("A").is_empty());
        assert!(registry.search("A", 10).is_empty());
        assert!(registry.service_ecas_referring_to_service("B").is_empty());
        assert!(registry.reverse_entries().is_empty());
        assert_eq!(DependencyGraph::from_registry(&registry).node_count(), 0);

        gated.release.wait();
        assert_eq!(builder.join().unwrap().unwrap(), 1);
    });

    let a = registry.existing(&ArtifactRef::service("A")).unwrap();
    assert!(a.is_populated());
    assert_eq!(registry.find_by_partial_name("A").len(), 1);
    assert_eq!(DependencyGraph::from_registry(&registry).edge_count(), 4);
}
