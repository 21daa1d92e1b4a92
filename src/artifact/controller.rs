//! Front-controller request and view descriptors, keyed by `controller#uri`.

use std::sync::Arc;

use super::{Artifact, ArtifactKind, ArtifactRef, Descriptor, ForwardSet, Populate};
use crate::error::{ArtifactError, Result};
use crate::metadata::{RequestMapping, ResponseType, ViewMapping, WidgetRef};
use crate::registry::ArtifactRegistry;

/// Descriptor of a request mapping
///
/// Forward references: the views its responses render, the requests its
/// responses chain to (same controller), and the service its event invokes.
#[derive(Debug)]
pub struct ControllerRequestArtifact {
    controller: String,
    uri: String,
    mapping: RequestMapping,
    references: ForwardSet,
}

impl ControllerRequestArtifact {
    pub(crate) fn load(controller: &str, uri: &str, registry: &ArtifactRegistry) -> Result<Self> {
        let config = registry.providers().controllers.controller(controller)?;
        let mapping = config.requests.get(uri).cloned().ok_or_else(|| {
            ArtifactError::unavailable(
                ArtifactKind::ControllerRequest,
                format!("{controller}#{uri}"),
                "request not mapped by controller",
            )
        })?;
        Ok(Self {
            controller: controller.to_string(),
            uri: uri.to_string(),
            mapping,
            references: ForwardSet::default(),
        })
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn mapping(&self) -> &RequestMapping {
        &self.mapping
    }

    /// Service invoked by the request event, if it dispatches one
    pub fn service_called(&self) -> Option<&str> {
        self.mapping.event.as_ref().and_then(|e| e.service_name())
    }

    /// View names rendered by the responses
    pub fn views_rendered(&self) -> Vec<&str> {
        self.responses_of(|t| t == ResponseType::View)
    }

    /// Request URIs chained to by the responses
    pub fn requests_chained(&self) -> Vec<&str> {
        self.responses_of(|t| matches!(t, ResponseType::Request | ResponseType::RequestRedirect))
    }

    fn responses_of(&self, filter: impl Fn(ResponseType) -> bool) -> Vec<&str> {
        let mut values = Vec::new();
        for response in &self.mapping.responses {
            if filter(response.response_type) && !values.contains(&response.value.as_str()) {
                values.push(response.value.as_str());
            }
        }
        values
    }
}

impl Descriptor for ControllerRequestArtifact {
    const KIND: ArtifactKind = ArtifactKind::ControllerRequest;

    fn unique_id(&self) -> String {
        format!("{}#{}", self.controller, self.uri)
    }

    fn display_name(&self) -> &str {
        &self.uri
    }

    fn location(&self) -> Option<&str> {
        Some(&self.controller)
    }

    fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::controller_request(&self.controller, &self.uri)
    }

    fn references(&self) -> &[ArtifactRef] {
        self.references.get()
    }

    fn is_populated(&self) -> bool {
        self.references.is_set()
    }

    fn into_artifact(self: Arc<Self>) -> Artifact {
        Artifact::ControllerRequest(self)
    }

    fn from_artifact(artifact: &Artifact) -> Option<&Arc<Self>> {
        match artifact {
            Artifact::ControllerRequest(d) => Some(d),
            _ => None,
        }
    }
}

impl Populate for ControllerRequestArtifact {
    fn populate(self: &Arc<Self>, registry: &ArtifactRegistry) -> Result<()> {
        let views = self
            .views_rendered()
            .into_iter()
            .map(|v| ArtifactRef::controller_view(&self.controller, v));
        let requests = self
            .requests_chained()
            .into_iter()
            .map(|r| ArtifactRef::controller_request(&self.controller, r));
        let services = self.service_called().into_iter().map(ArtifactRef::service);

        let refs = registry.link(&self.clone().into_artifact(), views.chain(requests).chain(services));
        self.references.set(refs);
        Ok(())
    }
}

/// Descriptor of a view mapping
#[derive(Debug)]
pub struct ControllerViewArtifact {
    controller: String,
    uri: String,
    mapping: ViewMapping,
    references: ForwardSet,
}

impl ControllerViewArtifact {
    pub(crate) fn load(controller: &str, uri: &str, registry: &ArtifactRegistry) -> Result<Self> {
        let config = registry.providers().controllers.controller(controller)?;
        let mapping = config.views.get(uri).cloned().ok_or_else(|| {
            ArtifactError::unavailable(
                ArtifactKind::ControllerView,
                format!("{controller}#{uri}"),
                "view not mapped by controller",
            )
        })?;
        Ok(Self {
            controller: controller.to_string(),
            uri: uri.to_string(),
            mapping,
            references: ForwardSet::default(),
        })
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn mapping(&self) -> &ViewMapping {
        &self.mapping
    }

    /// Screen rendered by a `screen` view
    pub fn screen(&self) -> Option<WidgetRef> {
        self.mapping.screen()
    }
}

impl Descriptor for ControllerViewArtifact {
    const KIND: ArtifactKind = ArtifactKind::ControllerView;

    fn unique_id(&self) -> String {
        format!("{}#{}", self.controller, self.uri)
    }

    fn display_name(&self) -> &str {
        &self.uri
    }

    fn location(&self) -> Option<&str> {
        Some(&self.controller)
    }

    fn artifact_ref(&self) -> ArtifactRef {
        ArtifactRef::controller_view(&self.controller, &self.uri)
    }

    fn references(&self) -> &[ArtifactRef] {
        self.references.get()
    }

    fn is_populated(&self) -> bool {
        self.references.is_set()
    }

    fn into_artifact(self: Arc<Self>) -> Artifact {
        Artifact::ControllerView(self)
    }

    fn from_artifact(artifact: &Artifact) -> Option<&Arc<Self>> {
        match artifact {
            Artifact::ControllerView(d) => Some(d),
            _ => None,
        }
    }
}

impl Populate for ControllerViewArtifact {
    fn populate(self: &Arc<Self>, registry: &ArtifactRegistry) -> Result<()> {
        let screens = self.screen().map(|w| ArtifactRef::screen(&w.location, &w.name));
        let refs = registry.link(&self.clone().into_artifact(), screens);
        self.references.set(refs);
        Ok(())
    }
}
