//! Configuration management for the artifact graph tools
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (artifact-graph.toml)
//! - Environment variables (ARTIFACT_GRAPH__*)
//!
//! ## Example config file (artifact-graph.toml):
//! ```toml
//! [metadata]
//! root = "./metadata"
//! default_namespace = "default"
//!
//! [namespaces]
//! tenant2 = "/srv/tenants/tenant2/metadata"
//!
//! [search]
//! limit = 20
//!
//! [logging]
//! filter = "info"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ArtifactError, Result};
use crate::metadata::{FsMetadataSource, MetadataProviders, NamespaceSource, DEFAULT_NAMESPACE};

/// Main configuration for the artifact graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Metadata location settings
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Namespace → directory overrides
    #[serde(default)]
    pub namespaces: BTreeMap<String, PathBuf>,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Directory holding one subdirectory per namespace
    #[serde(default = "default_metadata_root")]
    pub root: PathBuf,

    /// Namespace used when none is given
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum fuzzy search results
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber` filter used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_metadata_root() -> PathBuf {
    PathBuf::from("./metadata")
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_search_limit() -> usize {
    20
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            root: default_metadata_root(),
            default_namespace: default_namespace(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl GraphConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering `config_path` (required when given) over
    /// the default locations
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "artifact-graph.toml",
            ".artifact-graph.toml",
            "config/artifact-graph.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(dirs) = directories::ProjectDirs::from("dev", "artifact-graph", "artifact-graph") {
            let xdg_config = dirs.config_dir().join("artifact-graph.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // ARTIFACT_GRAPH__SEARCH__LIMIT=50
        builder = builder.add_source(
            Environment::with_prefix("ARTIFACT_GRAPH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// The configured namespace when `namespace` is empty, `namespace` otherwise
    pub fn resolve_namespace<'a>(&'a self, namespace: &'a str) -> &'a str {
        if namespace.is_empty() {
            &self.metadata.default_namespace
        } else {
            namespace
        }
    }

    /// Directory holding a namespace's metadata (resolves relative paths)
    pub fn namespace_dir(&self, namespace: &str) -> PathBuf {
        let namespace = self.resolve_namespace(namespace);
        let dir = match self.namespaces.get(namespace) {
            Some(dir) => dir.clone(),
            None => self.metadata.root.join(namespace),
        };
        if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir().unwrap_or_default().join(dir)
        }
    }
}

impl NamespaceSource for GraphConfig {
    fn default_namespace(&self) -> &str {
        &self.metadata.default_namespace
    }

    fn open(&self, namespace: &str) -> Result<MetadataProviders> {
        let dir = self.namespace_dir(namespace);
        if !dir.is_dir() {
            return Err(ArtifactError::UnknownNamespace(format!(
                "{} (no metadata directory at {})",
                self.resolve_namespace(namespace),
                dir.display()
            )));
        }
        Ok(FsMetadataSource::open(dir)?.into_providers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = GraphConfig::default();
        assert_eq!(config.metadata.root, PathBuf::from("./metadata"));
        assert_eq!(config.metadata.default_namespace, "default");
        assert_eq!(config.search.limit, 20);
        assert!(config.namespaces.is_empty());
    }

    #[test]
    fn test_serialize_config() {
        let config = GraphConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[metadata]"));
        assert!(toml_str.contains("[search]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.toml");
        std::fs::write(
            &path,
            "[metadata]\nroot = \"/data/meta\"\n\n[namespaces]\ntenant2 = \"/srv/tenant2\"\n\n[search]\nlimit = 5\n",
        )
        .unwrap();

        let config = GraphConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.search.limit, 5);
        assert_eq!(config.namespace_dir(""), PathBuf::from("/data/meta/default"));
        assert_eq!(config.namespace_dir("tenant2"), PathBuf::from("/srv/tenant2"));
    }

    #[test]
    fn test_save_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.toml");
        let mut config = GraphConfig::default();
        config.logging.filter = "artifact_graph=debug".into();
        config.save(&path).unwrap();

        let loaded: GraphConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.logging.filter, "artifact_graph=debug");
    }

    #[test]
    fn test_open_unknown_namespace() {
        let dir = TempDir::new().unwrap();
        let mut config = GraphConfig::default();
        config.metadata.root = dir.path().to_path_buf();

        let err = config.open("missing").unwrap_err();
        assert!(matches!(err, ArtifactError::UnknownNamespace(_)));

        std::fs::create_dir(dir.path().join("default")).unwrap();
        let providers = config.open("").unwrap();
        assert!(providers.entities.entity_names().unwrap().is_empty());
        assert!(providers.source_digest.is_some());
    }
}
