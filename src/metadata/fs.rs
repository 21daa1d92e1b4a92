//! Directory-backed metadata source
//!
//! One directory per namespace:
//!
//! ```text
//! <namespace>/
//! ├── entitymodel/**/*.json   [EntityMetadata, ...]
//! ├── servicedef/**/*.json    [ServiceMetadata, ...]
//! ├── secas/**/*.json         [ServiceEcaRule, ...]
//! ├── eecas/**/*.json         [EntityEcaRule, ...]
//! ├── <widget location>       { "forms": [...], "screens": [...] }
//! └── <controller location>   { "requests": {...}, "views": {...} }
//! ```
//!
//! Entity, service and rule definitions are read when the source opens.
//! Widget and controller files are parsed on first request and kept per
//! location.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use super::{
    ControllerConfig, ControllerLoader, DispatchContext, EntityEcaRule, EntityMetadata,
    EntityModelReader, EventRuleSource, FormMetadata, MetadataProviders, ScreenMetadata,
    ServiceEcaRule, ServiceMetadata, WidgetLoader,
};
use crate::artifact::ArtifactKind;
use crate::digest::SourceDigest;
use crate::error::{ArtifactError, Result};

const ENTITY_DIR: &str = "entitymodel";
const SERVICE_DIR: &str = "servicedef";
const SERVICE_ECA_DIR: &str = "secas";
const ENTITY_ECA_DIR: &str = "eecas";

#[derive(Debug, Default, Deserialize)]
struct WidgetFile {
    #[serde(default)]
    forms: Vec<FormMetadata>,
    #[serde(default)]
    screens: Vec<ScreenMetadata>,
}

#[derive(Debug, Default)]
struct WidgetIndex {
    forms: HashMap<String, Arc<FormMetadata>>,
    screens: HashMap<String, Arc<ScreenMetadata>>,
}

/// Metadata read from a namespace directory
pub struct FsMetadataSource {
    root: PathBuf,
    entities: BTreeMap<String, Arc<EntityMetadata>>,
    services: BTreeMap<String, Arc<ServiceMetadata>>,
    service_rules: HashMap<String, Vec<Arc<ServiceEcaRule>>>,
    entity_rules: HashMap<String, Vec<Arc<EntityEcaRule>>>,
    widgets: RwLock<HashMap<String, Arc<WidgetIndex>>>,
    controllers: RwLock<HashMap<String, Arc<ControllerConfig>>>,
    digest: SourceDigest,
}

impl FsMetadataSource {
    /// Read every entity, service and rule definition under `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(ArtifactError::Provider(format!(
                "metadata directory {} does not exist",
                root.display()
            )));
        }

        let mut raw_files: Vec<(String, Vec<u8>)> = Vec::new();

        let mut entities = BTreeMap::new();
        for entity in read_definitions::<EntityMetadata>(&root, ENTITY_DIR, &mut raw_files)? {
            if entities.contains_key(&entity.name) {
                tracing::warn!(entity = %entity.name, "duplicate entity definition, last one wins");
            }
            entities.insert(entity.name.clone(), Arc::new(entity));
        }

        let mut services = BTreeMap::new();
        for service in read_definitions::<ServiceMetadata>(&root, SERVICE_DIR, &mut raw_files)? {
            if services.contains_key(&service.name) {
                tracing::warn!(service = %service.name, "duplicate service definition, last one wins");
            }
            services.insert(service.name.clone(), Arc::new(service));
        }

        let mut service_rules: HashMap<String, Vec<Arc<ServiceEcaRule>>> = HashMap::new();
        for rule in read_definitions::<ServiceEcaRule>(&root, SERVICE_ECA_DIR, &mut raw_files)? {
            service_rules
                .entry(rule.service_name.clone())
                .or_default()
                .push(Arc::new(rule));
        }

        let mut entity_rules: HashMap<String, Vec<Arc<EntityEcaRule>>> = HashMap::new();
        for rule in read_definitions::<EntityEcaRule>(&root, ENTITY_ECA_DIR, &mut raw_files)? {
            entity_rules
                .entry(rule.entity_name.clone())
                .or_default()
                .push(Arc::new(rule));
        }

        let digest = SourceDigest::from_files(
            raw_files.iter().map(|(path, content)| (path.as_str(), content.as_slice())),
        );

        tracing::debug!(
            root = %root.display(),
            entities = entities.len(),
            services = services.len(),
            digest = digest.short(),
            "opened metadata directory"
        );

        Ok(Self {
            root,
            entities,
            services,
            service_rules,
            entity_rules,
            widgets: RwLock::new(HashMap::new()),
            controllers: RwLock::new(HashMap::new()),
            digest,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn digest(&self) -> &SourceDigest {
        &self.digest
    }

    /// Wrap into a provider bundle serving every role
    pub fn into_providers(self) -> MetadataProviders {
        let digest = self.digest.clone();
        MetadataProviders::from_source(Arc::new(self)).with_digest(digest)
    }

    /// Resolve a location to a file below the root; `None` when it escapes it
    fn resolve_location(&self, location: &str) -> Option<PathBuf> {
        let relative = Path::new(location);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if location.is_empty() || escapes {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn widget_index(&self, kind: ArtifactKind, location: &str, name: &str) -> Result<Arc<WidgetIndex>> {
        if let Some(index) = self.widgets.read().get(location) {
            return Ok(index.clone());
        }

        let path = self
            .resolve_location(location)
            .filter(|p| p.is_file())
            .ok_or_else(|| {
                ArtifactError::unavailable(kind, format!("{location}#{name}"), "widget location not found")
            })?;
        let file: WidgetFile = parse_file(&path)?;

        let index = Arc::new(WidgetIndex {
            forms: file
                .forms
                .into_iter()
                .map(|f| (f.name.clone(), Arc::new(f)))
                .collect(),
            screens: file
                .screens
                .into_iter()
                .map(|s| (s.name.clone(), Arc::new(s)))
                .collect(),
        });

        // A concurrent reader may have parsed the same file; keep the first copy.
        let mut widgets = self.widgets.write();
        Ok(widgets.entry(location.to_string()).or_insert(index).clone())
    }
}

/// Parse every `*.json` file below `root/dir` as an array of definitions
fn read_definitions<T: DeserializeOwned>(
    root: &Path,
    dir: &str,
    raw_files: &mut Vec<(String, Vec<u8>)>,
) -> Result<Vec<T>> {
    let base = root.join(dir);
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let mut definitions = Vec::new();
    for entry in WalkDir::new(&base).follow_links(true).sort_by_file_name() {
        // A walk error fails the whole namespace rather than dropping definitions
        let entry = entry.map_err(|e| {
            let at = e.path().unwrap_or(&base).display().to_string();
            ArtifactError::Provider(format!("failed to read {}: {}", at, e))
        })?;
        let path = entry.path();
        if !path.is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }

        let content = fs::read(path)?;
        let parsed: Vec<T> = serde_json::from_slice(&content).map_err(|e| {
            ArtifactError::Provider(format!("failed to parse {}: {}", path.display(), e))
        })?;
        definitions.extend(parsed);

        let relative = path.strip_prefix(root).unwrap_or(path).to_string_lossy().into_owned();
        raw_files.push((relative, content));
    }

    Ok(definitions)
}

fn parse_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read(path)?;
    serde_json::from_slice(&content)
        .map_err(|e| ArtifactError::Provider(format!("failed to parse {}: {}", path.display(), e)))
}

impl EntityModelReader for FsMetadataSource {
    fn entity_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.entities.keys().cloned().collect())
    }

    fn entity(&self, name: &str) -> Result<Arc<EntityMetadata>> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| ArtifactError::unavailable(ArtifactKind::Entity, name, "no entity definition"))
    }
}

impl DispatchContext for FsMetadataSource {
    fn service_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.services.keys().cloned().collect())
    }

    fn service(&self, name: &str) -> Result<Arc<ServiceMetadata>> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| ArtifactError::unavailable(ArtifactKind::Service, name, "no service definition"))
    }
}

impl EventRuleSource for FsMetadataSource {
    fn service_rules(&self, service_name: &str) -> Result<Vec<Arc<ServiceEcaRule>>> {
        Ok(self.service_rules.get(service_name).cloned().unwrap_or_default())
    }

    fn entity_rules(&self, entity_name: &str) -> Result<Vec<Arc<EntityEcaRule>>> {
        Ok(self.entity_rules.get(entity_name).cloned().unwrap_or_default())
    }
}

impl WidgetLoader for FsMetadataSource {
    fn form(&self, location: &str, name: &str) -> Result<Arc<FormMetadata>> {
        let index = self.widget_index(ArtifactKind::FormWidget, location, name)?;
        index.forms.get(name).cloned().ok_or_else(|| {
            ArtifactError::unavailable(
                ArtifactKind::FormWidget,
                format!("{location}#{name}"),
                "form not defined at location",
            )
        })
    }

    fn screen(&self, location: &str, name: &str) -> Result<Arc<ScreenMetadata>> {
        let index = self.widget_index(ArtifactKind::ScreenWidget, location, name)?;
        index.screens.get(name).cloned().ok_or_else(|| {
            ArtifactError::unavailable(
                ArtifactKind::ScreenWidget,
                format!("{location}#{name}"),
                "screen not defined at location",
            )
        })
    }
}

impl ControllerLoader for FsMetadataSource {
    fn controller(&self, location: &str) -> Result<Arc<ControllerConfig>> {
        if let Some(config) = self.controllers.read().get(location) {
            return Ok(config.clone());
        }

        let path = self
            .resolve_location(location)
            .filter(|p| p.is_file())
            .ok_or_else(|| ArtifactError::Provider(format!("controller configuration {location} not found")))?;
        let config: ControllerConfig = parse_file(&path)?;

        let mut controllers = self.controllers.write();
        Ok(controllers
            .entry(location.to_string())
            .or_insert_with(|| Arc::new(config))
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, value: serde_json::Value) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_open_reads_definitions() {
        let dir = tempdir().unwrap();
        write(dir.path(), "entitymodel/party.json", serde_json::json!([
            { "name": "Party", "relations": [{ "type": "many", "rel_entity": "Person" }] },
            { "name": "Person" }
        ]));
        write(dir.path(), "servicedef/party.json", serde_json::json!([
            { "name": "createParty", "engine": "java", "entities": ["Party"] }
        ]));
        write(dir.path(), "secas/party.json", serde_json::json!([
            { "service_name": "createParty", "event": "commit", "actions": [{ "service": "indexParty" }] }
        ]));

        let source = FsMetadataSource::open(dir.path()).unwrap();
        assert_eq!(source.entity_names().unwrap().len(), 2);
        assert_eq!(source.service("createParty").unwrap().entities, vec!["Party"]);

        let rules = source.service_rules("createParty").unwrap();
        assert_eq!(rules.len(), 1);
        assert!(Arc::ptr_eq(&rules[0], &source.service_rules("createParty").unwrap()[0]));
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_errors_are_provider_failures() {
        let dir = tempdir().unwrap();
        write(dir.path(), "entitymodel/party.json", serde_json::json!([{ "name": "Party" }]));
        std::os::unix::fs::symlink(
            dir.path().join("entitymodel/gone"),
            dir.path().join("entitymodel/shared"),
        )
        .unwrap();

        let err = FsMetadataSource::open(dir.path()).err().unwrap();
        assert!(matches!(err, ArtifactError::Provider(_)));
        assert!(err.to_string().contains("shared"));
    }

    #[test]
    fn test_missing_root_is_provider_failure() {
        let dir = tempdir().unwrap();
        let err = FsMetadataSource::open(dir.path().join("nope")).err().unwrap();
        assert!(matches!(err, ArtifactError::Provider(_)));
    }

    #[test]
    fn test_malformed_definition_file() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("entitymodel")).unwrap();
        fs::write(dir.path().join("entitymodel/bad.json"), "{ not json").unwrap();

        let err = FsMetadataSource::open(dir.path()).err().unwrap();
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_widgets_load_lazily() {
        let dir = tempdir().unwrap();
        write(dir.path(), "widget/PartyForms.json", serde_json::json!({
            "forms": [{ "name": "EditParty", "default_entity": "Party" }],
            "screens": [{ "name": "PartyScreen", "forms": [{ "location": "widget/PartyForms.json", "name": "EditParty" }] }]
        }));

        let source = FsMetadataSource::open(dir.path()).unwrap();
        let form = source.form("widget/PartyForms.json", "EditParty").unwrap();
        assert_eq!(form.default_entity.as_deref(), Some("Party"));
        assert_eq!(source.screen("widget/PartyForms.json", "PartyScreen").unwrap().forms.len(), 1);

        assert!(source.form("widget/PartyForms.json", "Missing").unwrap_err().is_metadata_unavailable());
        assert!(source.form("widget/Nope.json", "EditParty").unwrap_err().is_metadata_unavailable());
        assert!(source.form("../outside.json", "EditParty").unwrap_err().is_metadata_unavailable());
    }

    #[test]
    fn test_digest_is_stable() {
        let dir = tempdir().unwrap();
        write(dir.path(), "entitymodel/a.json", serde_json::json!([{ "name": "A" }]));

        let first = FsMetadataSource::open(dir.path()).unwrap();
        let second = FsMetadataSource::open(dir.path()).unwrap();
        assert_eq!(first.digest(), second.digest());

        write(dir.path(), "entitymodel/b.json", serde_json::json!([{ "name": "B" }]));
        let third = FsMetadataSource::open(dir.path()).unwrap();
        assert_ne!(first.digest(), third.digest());
    }
}
