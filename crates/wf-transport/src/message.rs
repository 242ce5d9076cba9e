//! Outbound message payloads
//!
//! Builds the provider wire shapes for every message kind the engine can
//! produce. Payload construction is pure; the transport only attaches the
//! recipient and posts it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Media kinds accepted by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl Default for MediaKind {
    fn default() -> Self {
        Self::Image
    }
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }
}

/// One interactive reply button.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyButton {
    pub id: String,
    pub title: String,
}

/// One positional template parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateParameter {
    /// Target component: "body", "header", or "button".
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub value: String,
}

/// An outbound message, one variant per provider payload kind.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Text {
        body: String,
    },
    Media {
        kind: MediaKind,
        link: String,
        caption: Option<String>,
    },
    Buttons {
        body: String,
        buttons: Vec<ReplyButton>,
    },
    Template {
        name: String,
        language: String,
        parameters: Vec<TemplateParameter>,
    },
    FlowInvite {
        header: Option<String>,
        body: String,
        footer: Option<String>,
        cta: String,
        flow_id: Option<String>,
        flow_token: Option<String>,
    },
}

impl OutboundMessage {
    /// Short kind tag for logging and the message log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Media { .. } => "media",
            Self::Buttons { .. } => "options",
            Self::Template { .. } => "template",
            Self::FlowInvite { .. } => "flow",
        }
    }

    /// Human-readable body excerpt for the message log.
    pub fn preview(&self) -> String {
        let body = match self {
            Self::Text { body } => body.as_str(),
            Self::Media { link, .. } => link.as_str(),
            Self::Buttons { body, .. } => body.as_str(),
            Self::Template { name, .. } => name.as_str(),
            Self::FlowInvite { body, .. } => body.as_str(),
        };
        body.chars().take(120).collect()
    }

    /// Render the full provider payload for a recipient.
    pub fn to_payload(&self, to: &str) -> Value {
        let mut payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
        });
        let root = payload.as_object_mut().expect("payload is an object");

        match self {
            Self::Text { body } => {
                root.insert("type".into(), json!("text"));
                root.insert("text".into(), json!({ "body": body, "preview_url": false }));
            }
            Self::Media { kind, link, caption } => {
                let mut media = json!({ "link": link });
                if let Some(caption) = caption {
                    media["caption"] = json!(caption);
                }
                root.insert("type".into(), json!(kind.as_str()));
                root.insert(kind.as_str().into(), media);
            }
            Self::Buttons { body, buttons } => {
                let buttons: Vec<Value> = buttons
                    .iter()
                    .map(|b| json!({ "type": "reply", "reply": { "id": b.id, "title": b.title } }))
                    .collect();
                root.insert("type".into(), json!("interactive"));
                root.insert(
                    "interactive".into(),
                    json!({
                        "type": "button",
                        "body": { "text": body },
                        "action": { "buttons": buttons },
                    }),
                );
            }
            Self::Template { name, language, parameters } => {
                root.insert("type".into(), json!("template"));
                root.insert(
                    "template".into(),
                    json!({
                        "name": name,
                        "language": { "code": language },
                        "components": template_components(parameters),
                    }),
                );
            }
            Self::FlowInvite { header, body, footer, cta, flow_id, flow_token } => {
                let mut action_params = json!({
                    "flow_message_version": "3",
                    "flow_cta": cta,
                });
                if let Some(flow_id) = flow_id {
                    action_params["flow_id"] = json!(flow_id);
                }
                if let Some(flow_token) = flow_token {
                    action_params["flow_token"] = json!(flow_token);
                }

                let mut interactive = json!({
                    "type": "flow",
                    "body": { "text": body },
                    "action": { "name": "flow", "parameters": action_params },
                });
                if let Some(header) = header {
                    interactive["header"] = json!({ "type": "text", "text": header });
                }
                if let Some(footer) = footer {
                    interactive["footer"] = json!({ "text": footer });
                }

                root.insert("type".into(), json!("interactive"));
                root.insert("interactive".into(), interactive);
            }
        }

        payload
    }
}

/// Group positional parameters into provider template components.
fn template_components(parameters: &[TemplateParameter]) -> Vec<Value> {
    let mut components: Vec<Value> = Vec::new();

    for component in ["header", "body", "button"] {
        let params: Vec<&TemplateParameter> = parameters
            .iter()
            .filter(|p| p.component.eq_ignore_ascii_case(component))
            .collect();
        if params.is_empty() {
            continue;
        }

        if component == "button" {
            // Button parameters are addressed individually by index.
            for p in params {
                components.push(json!({
                    "type": "button",
                    "sub_type": p.sub_type.clone().unwrap_or_else(|| "quick_reply".to_string()),
                    "index": p.index.unwrap_or(0).to_string(),
                    "parameters": [{ "type": "text", "text": p.value }],
                }));
            }
        } else {
            let values: Vec<Value> = params
                .iter()
                .map(|p| json!({ "type": "text", "text": p.value }))
                .collect();
            components.push(json!({ "type": component, "parameters": values }));
        }
    }

    components
}
