//! Graph Document
//!
//! Typed model of the authored flow graph. The raw definition is stored
//! untouched on the Flow entity; this module parses it at the load boundary
//! and re-checks the structural invariants the authoring surface enforces.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use wf_common::{MAX_OPTIONS, MIN_OPTIONS, OPTION_LABEL_LIMIT, TEXT_LIMIT};
use wf_transport::{MediaKind, TemplateParameter};

pub const TRIGGER_KEYWORD_LIMIT: usize = 64;
pub const EXPRESSION_LIMIT: usize = 500;
pub const ASSIGN_KEY_LIMIT: usize = 50;
pub const ASSIGN_VALUE_LIMIT: usize = 500;
pub const CAPTION_LIMIT: usize = 1024;
pub const HANDOFF_NOTE_LIMIT: usize = 500;

/// Condition/options arc handles.
pub const HANDLE_TRUE: &str = "true";
pub const HANDLE_FALSE: &str = "false";
pub const HANDLE_NO_MATCH: &str = "no-match";

pub fn option_handle(index: usize) -> String {
    format!("opt-{}", index)
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Graph failed to parse: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid graph: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub data: NodeData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

/// Per-type node payloads, tagged by the `type` field of the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NodeData {
    Trigger(TriggerData),
    Message(MessageData),
    Options(OptionsData),
    Delay(DelayData),
    Condition(ConditionData),
    Api(ApiData),
    Assign(AssignData),
    Media(MediaData),
    Handoff(HandoffData),
    Goto(GotoData),
    End(EndData),
    WhatsappFlow(WhatsappFlowData),
}

impl NodeData {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Trigger(_) => "trigger",
            Self::Message(_) => "message",
            Self::Options(_) => "options",
            Self::Delay(_) => "delay",
            Self::Condition(_) => "condition",
            Self::Api(_) => "api",
            Self::Assign(_) => "assign",
            Self::Media(_) => "media",
            Self::Handoff(_) => "handoff",
            Self::Goto(_) => "goto",
            Self::End(_) => "end",
            Self::WhatsappFlow(_) => "whatsapp_flow",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerData {
    pub keyword: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub use_template: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_language: Option<String>,
    #[serde(default)]
    pub template_parameters: Vec<TemplateParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsData {
    #[serde(default)]
    pub text: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayData {
    pub seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionData {
    pub expression: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl HttpMethod {
    pub fn has_body(&self) -> bool {
        !matches!(self, Self::GET)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GET => "GET",
            Self::POST => "POST",
            Self::PUT => "PUT",
            Self::PATCH => "PATCH",
            Self::DELETE => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiData {
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
    pub assign_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignData {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaData {
    #[serde(default)]
    pub media_type: MediaKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffData {
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoData {
    pub target_node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndData {
    #[serde(default = "default_end_reason")]
    pub reason: String,
}

fn default_end_reason() -> String {
    "end".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsappFlowData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    pub cta: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_token: Option<String>,
}

impl Graph {
    /// Parse a stored definition document into the typed model.
    pub fn parse(definition: &serde_json::Value) -> Result<Self, GraphError> {
        Ok(serde_json::from_value(definition.clone())?)
    }

    /// Parse and re-check the authoring invariants, the load-boundary entry
    /// point the engine uses.
    pub fn load(definition: &serde_json::Value) -> Result<Self, GraphError> {
        let graph = Self::parse(definition)?;
        graph.validate()?;
        Ok(graph)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn trigger_nodes(&self) -> impl Iterator<Item = (&Node, &TriggerData)> {
        self.nodes.iter().filter_map(|n| match &n.data {
            NodeData::Trigger(data) => Some((n, data)),
            _ => None,
        })
    }

    /// First outbound arc of a node, stable by edge insertion order.
    pub fn default_edge(&self, node_id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.source == node_id)
    }

    /// Outbound arc with a specific handle.
    pub fn edge_by_handle(&self, node_id: &str, handle: &str) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|e| e.source == node_id && e.source_handle.as_deref() == Some(handle))
    }

    fn outbound(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == node_id).collect()
    }

    fn inbound_count(&self, node_id: &str) -> usize {
        self.edges.iter().filter(|e| e.target == node_id).count()
    }

    /// Re-check the structural and schema invariants the authoring surface
    /// enforces. Every violation is collected before failing.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut issues: Vec<String> = Vec::new();

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                issues.push(format!("duplicate node id '{}'", node.id));
            }
        }

        let node_ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &self.edges {
            if !node_ids.contains(edge.source.as_str()) {
                issues.push(format!("edge '{}' has unknown source '{}'", edge.id, edge.source));
            }
            if !node_ids.contains(edge.target.as_str()) {
                issues.push(format!("edge '{}' has unknown target '{}'", edge.id, edge.target));
            }
        }

        if self.trigger_nodes().next().is_none() {
            issues.push("graph has no trigger node".to_string());
        }

        for node in &self.nodes {
            self.validate_node(node, &node_ids, &mut issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(GraphError::Invalid(issues.join("; ")))
        }
    }

    fn validate_node(&self, node: &Node, node_ids: &HashSet<&str>, issues: &mut Vec<String>) {
        let id = node.id.as_str();
        match &node.data {
            NodeData::Trigger(data) => {
                if data.keyword.is_empty() || data.keyword.chars().count() > TRIGGER_KEYWORD_LIMIT {
                    issues.push(format!("trigger '{}' keyword must be 1..={} chars", id, TRIGGER_KEYWORD_LIMIT));
                }
                if self.inbound_count(id) > 0 {
                    issues.push(format!("trigger '{}' must be a source only", id));
                }
            }
            NodeData::End(_) => {
                if !self.outbound(id).is_empty() {
                    issues.push(format!("end '{}' must be a sink only", id));
                }
            }
            NodeData::Options(data) => {
                let count = data.options.len();
                if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&count) {
                    issues.push(format!(
                        "options '{}' must declare {}..={} options, has {}",
                        id, MIN_OPTIONS, MAX_OPTIONS, count
                    ));
                }
                for (i, option) in data.options.iter().enumerate() {
                    if option.is_empty() || option.chars().count() > OPTION_LABEL_LIMIT {
                        issues.push(format!(
                            "options '{}' option {} must be 1..={} chars",
                            id, i, OPTION_LABEL_LIMIT
                        ));
                    }
                    if self.edge_by_handle(id, &option_handle(i)).is_none() {
                        issues.push(format!("options '{}' is missing arc '{}'", id, option_handle(i)));
                    }
                }
                if self.edge_by_handle(id, HANDLE_NO_MATCH).is_none() {
                    issues.push(format!("options '{}' is missing the '{}' arc", id, HANDLE_NO_MATCH));
                }
            }
            NodeData::Condition(data) => {
                if data.expression.is_empty() || data.expression.chars().count() > EXPRESSION_LIMIT {
                    issues.push(format!("condition '{}' expression must be 1..={} chars", id, EXPRESSION_LIMIT));
                }
                if self.edge_by_handle(id, HANDLE_TRUE).is_none()
                    || self.edge_by_handle(id, HANDLE_FALSE).is_none()
                {
                    issues.push(format!("condition '{}' needs both true and false arcs", id));
                }
            }
            NodeData::Message(data) => {
                if data.use_template {
                    if data.template_name.as_deref().unwrap_or("").is_empty() {
                        issues.push(format!("message '{}' uses a template but names none", id));
                    }
                } else if data.text.is_empty() || data.text.chars().count() > TEXT_LIMIT {
                    issues.push(format!("message '{}' text must be 1..={} chars", id, TEXT_LIMIT));
                }
            }
            NodeData::Delay(data) => {
                if !(1..=3600).contains(&data.seconds) {
                    issues.push(format!("delay '{}' seconds must be 1..=3600", id));
                }
            }
            NodeData::Api(data) => {
                if data.url.is_empty() {
                    issues.push(format!("api '{}' needs a url", id));
                }
                if data.assign_to.is_empty() {
                    issues.push(format!("api '{}' needs an assignTo key", id));
                }
            }
            NodeData::Assign(data) => {
                if data.key.is_empty() || data.key.chars().count() > ASSIGN_KEY_LIMIT {
                    issues.push(format!("assign '{}' key must be 1..={} chars", id, ASSIGN_KEY_LIMIT));
                }
                if data.value.chars().count() > ASSIGN_VALUE_LIMIT {
                    issues.push(format!("assign '{}' value exceeds {} chars", id, ASSIGN_VALUE_LIMIT));
                }
            }
            NodeData::Media(data) => {
                if data.url.is_empty() {
                    issues.push(format!("media '{}' needs a url", id));
                }
                if data.caption.as_deref().map_or(0, |c| c.chars().count()) > CAPTION_LIMIT {
                    issues.push(format!("media '{}' caption exceeds {} chars", id, CAPTION_LIMIT));
                }
            }
            NodeData::Handoff(data) => {
                if data.queue.is_empty() {
                    issues.push(format!("handoff '{}' needs a queue", id));
                }
                if data.note.as_deref().map_or(0, |n| n.chars().count()) > HANDOFF_NOTE_LIMIT {
                    issues.push(format!("handoff '{}' note exceeds {} chars", id, HANDOFF_NOTE_LIMIT));
                }
            }
            NodeData::Goto(data) => {
                if data.target_node_id.is_empty() {
                    issues.push(format!("goto '{}' needs a target node id", id));
                } else if !node_ids.contains(data.target_node_id.as_str()) {
                    issues.push(format!(
                        "goto '{}' targets unknown node '{}'",
                        id, data.target_node_id
                    ));
                }
            }
            NodeData::WhatsappFlow(data) => {
                if data.cta.is_empty() {
                    issues.push(format!("whatsapp_flow '{}' needs a cta", id));
                }
            }
        }

        // Linear nodes carry at most one default outbound arc.
        if !matches!(
            node.data,
            NodeData::Options(_) | NodeData::Condition(_) | NodeData::End(_)
        ) {
            let defaults = self
                .outbound(id)
                .iter()
                .filter(|e| e.source_handle.is_none())
                .count();
            if defaults > 1 {
                issues.push(format!("node '{}' has {} default arcs, at most one allowed", id, defaults));
            }
        }
    }
}
