//! Error types for the artifact registry

use thiserror::Error;

use crate::artifact::ArtifactKind;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Artifact registry errors
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Metadata unavailable for {kind} '{id}': {reason}")]
    MetadataUnavailable {
        kind: ArtifactKind,
        id: String,
        reason: String,
    },

    #[error("Metadata provider failure: {0}")]
    Provider(String),

    #[error("Invalid {kind} identity '{id}': expected 'location#name'")]
    InvalidIdentity { kind: ArtifactKind, id: String },

    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArtifactError {
    pub fn unavailable(kind: ArtifactKind, id: impl Into<String>, reason: impl Into<String>) -> Self {
        ArtifactError::MetadataUnavailable {
            kind,
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// True when the provider had no usable definition for the requested identity.
    pub fn is_metadata_unavailable(&self) -> bool {
        matches!(self, ArtifactError::MetadataUnavailable { .. })
    }
}
