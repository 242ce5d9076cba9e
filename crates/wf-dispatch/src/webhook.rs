//! Inbound webhook payload model
//!
//! Tolerant serde model of the provider delivery shape. Everything defaults
//! so partial payloads deserialize; unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// Root object value the dispatcher accepts.
pub const EXPECTED_OBJECT: &str = "whatsapp_business_account";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<ContactProfile>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub statuses: Vec<StatusObject>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub phone_number_id: Option<String>,
    #[serde(default)]
    pub display_phone_number: Option<String>,
    #[serde(default)]
    pub whatsapp_business_account_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactProfile {
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub profile: Profile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub interactive: Option<Interactive>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Interactive {
    #[serde(default, rename = "type")]
    pub interactive_type: String,
    #[serde(default)]
    pub button_reply: Option<InteractiveReply>,
    #[serde(default)]
    pub list_reply: Option<InteractiveReply>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractiveReply {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl InboundMessage {
    /// The interactive reply, whichever kind it came as.
    pub fn interactive_reply(&self) -> Option<&InteractiveReply> {
        self.interactive
            .as_ref()
            .and_then(|i| i.button_reply.as_ref().or(i.list_reply.as_ref()))
    }

    /// The user-visible text: the text body, or the interactive reply title.
    pub fn visible_text(&self) -> Option<String> {
        if let Some(text) = &self.text {
            if !text.body.is_empty() {
                return Some(text.body.clone());
            }
        }
        self.interactive_reply()
            .filter(|r| !r.title.is_empty())
            .map(|r| r.title.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub conversation: Option<Conversation>,
    #[serde(default)]
    pub errors: Vec<StatusError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_data: Option<ErrorData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub details: Option<String>,
}

impl StatusError {
    /// Most specific available description, in provider precedence order.
    pub fn detail(&self) -> Option<String> {
        self.error_data
            .as_ref()
            .and_then(|d| d.details.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.title.clone())
            .or_else(|| self.code.map(|c| format!("error code {}", c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message_visible_text() {
        let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "value": {
                "metadata": { "phone_number_id": "123" },
                "messages": [{ "id": "m1", "from": "549", "type": "text", "text": { "body": "Hola" } }],
            }}]}],
        }))
        .unwrap();

        let message = &payload.entry[0].changes[0].value.messages[0];
        assert_eq!(message.visible_text().as_deref(), Some("Hola"));
    }

    #[test]
    fn test_interactive_reply_title_wins_when_no_text() {
        let message: InboundMessage = serde_json::from_value(serde_json::json!({
            "id": "m1", "from": "549", "type": "interactive",
            "interactive": { "type": "button", "button_reply": { "id": "opt-1", "title": "Ventas" } },
        }))
        .unwrap();

        assert_eq!(message.visible_text().as_deref(), Some("Ventas"));
    }

    #[test]
    fn test_media_message_has_no_visible_text() {
        let message: InboundMessage = serde_json::from_value(serde_json::json!({
            "id": "m1", "from": "549", "type": "image",
        }))
        .unwrap();

        assert_eq!(message.visible_text(), None);
    }

    #[test]
    fn test_status_error_detail_precedence() {
        let error: StatusError = serde_json::from_value(serde_json::json!({
            "code": 131026,
            "title": "Undeliverable",
            "message": "Message undeliverable",
            "error_data": { "details": "Recipient blocked the sender" },
        }))
        .unwrap();
        assert_eq!(error.detail().as_deref(), Some("Recipient blocked the sender"));

        let bare: StatusError =
            serde_json::from_value(serde_json::json!({ "code": 131026 })).unwrap();
        assert_eq!(bare.detail().as_deref(), Some("error code 131026"));
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let payload: Result<WebhookPayload, _> = serde_json::from_value(serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{ "id": "e", "time": 1700000000, "changes": [] }],
        }));
        assert!(payload.is_ok());
    }
}
