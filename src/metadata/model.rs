//! Structured artifact descriptions as produced by the metadata readers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- Entity model ---

/// Entity definition from the entity-model reader
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldMetadata>,
    #[serde(default)]
    pub relations: Vec<RelationMetadata>,
    /// Member entities when this is a view entity
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member_entities: Vec<String>,
}

impl EntityMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_relation(mut self, rel_type: RelationType, rel_entity: impl Into<String>) -> Self {
        self.relations.push(RelationMetadata {
            rel_type,
            title: None,
            rel_entity: rel_entity.into(),
            key_maps: Vec::new(),
        });
        self
    }

    pub fn is_view(&self) -> bool {
        !self.member_entities.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationMetadata {
    #[serde(rename = "type")]
    pub rel_type: RelationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub rel_entity: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_maps: Vec<KeyMap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationType {
    One,
    OneNofk,
    Many,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMap {
    pub field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_field_name: Option<String>,
}

// --- Service model ---

/// Service definition from the dispatch context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub name: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_entity: Option<String>,
    /// Entities read or written by the implementation
    #[serde(default)]
    pub entities: Vec<String>,
    /// Services called by the implementation
    #[serde(default)]
    pub services: Vec<String>,
    /// Interfaces this service implements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterMetadata>,
}

impl ServiceMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine: "java".to_string(),
            ..Default::default()
        }
    }

    pub fn using_entity(mut self, entity: impl Into<String>) -> Self {
        self.entities.push(entity.into());
        self
    }

    pub fn calling_service(mut self, service: impl Into<String>) -> Self {
        self.services.push(service.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMetadata {
    pub name: String,
    pub mode: ParameterMode,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default)]
    pub optional: bool,
    /// Entity the parameter was auto-generated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterMode {
    In,
    Out,
    InOut,
}

// --- Event rules ---

/// Event rule triggered by a service lifecycle event
///
/// Rules are compared by identity, never by value: two structurally equal
/// rules attached to the same service are distinct artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceEcaRule {
    pub service_name: String,
    pub event: String,
    #[serde(default)]
    pub run_on_failure: bool,
    #[serde(default)]
    pub run_on_error: bool,
    #[serde(default)]
    pub conditions: Vec<EcaCondition>,
    #[serde(default)]
    pub actions: Vec<EcaAction>,
}

impl ServiceEcaRule {
    pub fn new(service_name: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            event: event.into(),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, service: impl Into<String>) -> Self {
        self.actions.push(EcaAction {
            service: service.into(),
            mode: ActionMode::Sync,
        });
        self
    }

    /// Human readable label, not unique
    pub fn label(&self) -> String {
        format!("{}#{}", self.service_name, self.event)
    }
}

/// Event rule triggered by an entity operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityEcaRule {
    pub entity_name: String,
    pub operation: String,
    pub event: String,
    #[serde(default)]
    pub conditions: Vec<EcaCondition>,
    #[serde(default)]
    pub actions: Vec<EcaAction>,
}

impl EntityEcaRule {
    pub fn new(
        entity_name: impl Into<String>,
        operation: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            entity_name: entity_name.into(),
            operation: operation.into(),
            event: event.into(),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, service: impl Into<String>) -> Self {
        self.actions.push(EcaAction {
            service: service.into(),
            mode: ActionMode::Sync,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcaCondition {
    pub field: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcaAction {
    pub service: String,
    #[serde(default = "default_action_mode")]
    pub mode: ActionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    Sync,
    Async,
}

fn default_action_mode() -> ActionMode { ActionMode::Sync }

// --- Widgets ---

/// Form definition loaded from a widget location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormMetadata {
    pub name: String,
    #[serde(rename = "type", default)]
    pub form_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_service: Option<String>,
    /// Request URI the form submits to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub auto_fields_entities: Vec<String>,
    #[serde(default)]
    pub auto_fields_services: Vec<String>,
    #[serde(default)]
    pub fields: Vec<FormFieldMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormFieldMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

/// Screen definition loaded from a widget location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenMetadata {
    pub name: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub forms: Vec<WidgetRef>,
    #[serde(default)]
    pub screens: Vec<WidgetRef>,
}

/// Location-qualified reference to a form or screen
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WidgetRef {
    pub location: String,
    pub name: String,
}

impl WidgetRef {
    pub fn new(location: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            name: name.into(),
        }
    }

    /// Parse `location#name`
    pub fn parse(composite: &str) -> Option<Self> {
        let (location, name) = composite.rsplit_once('#')?;
        if location.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(location, name))
    }

    pub fn unique_id(&self) -> String {
        format!("{}#{}", self.location, self.name)
    }
}

// --- Front controller ---

/// Parsed controller configuration of one controller location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub requests: BTreeMap<String, RequestMapping>,
    #[serde(default)]
    pub views: BTreeMap<String, ViewMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<RequestEvent>,
    #[serde(default)]
    pub responses: Vec<RequestResponse>,
    #[serde(default)]
    pub https: bool,
    #[serde(default)]
    pub auth: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub invoke: String,
}

impl RequestEvent {
    /// Service name when the event dispatches a service
    pub fn service_name(&self) -> Option<&str> {
        matches!(self.event_type.as_str(), "service" | "service-multi").then_some(self.invoke.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestResponse {
    pub name: String,
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseType {
    View,
    Request,
    RequestRedirect,
    Url,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewMapping {
    #[serde(rename = "type")]
    pub view_type: String,
    #[serde(default)]
    pub page: String,
}

impl ViewMapping {
    /// Screen rendered by this view, for `screen` views
    pub fn screen(&self) -> Option<WidgetRef> {
        if self.view_type == "screen" {
            WidgetRef::parse(&self.page)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widget_ref_parse() {
        let r = WidgetRef::parse("component://party/widget/PartyScreens.xml#EditParty").unwrap();
        assert_eq!(r.location, "component://party/widget/PartyScreens.xml");
        assert_eq!(r.name, "EditParty");
        assert_eq!(r.unique_id(), "component://party/widget/PartyScreens.xml#EditParty");

        assert!(WidgetRef::parse("no-separator").is_none());
        assert!(WidgetRef::parse("#name").is_none());
        assert!(WidgetRef::parse("location#").is_none());
    }

    #[test]
    fn test_request_event_service_name() {
        let event = RequestEvent {
            event_type: "service".to_string(),
            path: None,
            invoke: "createParty".to_string(),
        };
        assert_eq!(event.service_name(), Some("createParty"));

        let java = RequestEvent {
            event_type: "java".to_string(),
            path: Some("org.example.Events".to_string()),
            invoke: "login".to_string(),
        };
        assert_eq!(java.service_name(), None);
    }

    #[test]
    fn test_deserialize_controller_config() {
        let json = serde_json::json!({
            "requests": {
                "createParty": {
                    "event": { "type": "service", "invoke": "createParty" },
                    "responses": [
                        { "name": "success", "type": "view", "value": "EditParty" },
                        { "name": "error", "type": "request", "value": "main" }
                    ]
                }
            },
            "views": {
                "EditParty": { "type": "screen", "page": "component://party/widget/PartyScreens.xml#EditParty" }
            }
        });
        let config: ControllerConfig = serde_json::from_value(json).unwrap();
        let request = &config.requests["createParty"];
        assert_eq!(request.responses.len(), 2);
        assert_eq!(request.responses[1].response_type, ResponseType::Request);
        assert!(config.views["EditParty"].screen().is_some());
    }
}
