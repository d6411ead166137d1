use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Next,
    Continue,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationMode {
    pub kind: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationModeEnvelope {
    pub conversation_mode: ConversationMode,
}

impl Default for ConversationModeEnvelope {
    fn default() -> Self {
        Self {
            conversation_mode: ConversationMode {
                kind: "primary_assistant".to_string(),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutgoingAuthor {
    pub role: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutgoingContent {
    pub content_type: String,
    pub parts: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub author: OutgoingAuthor,
    pub content: OutgoingContent,
    pub id: String,
    pub metadata: Map<String, Value>,
}

impl OutgoingMessage {
    pub fn user_text(id: String, text: &str) -> Self {
        Self {
            author: OutgoingAuthor { role: "user".to_string() },
            content: OutgoingContent {
                content_type: "text".to_string(),
                parts: vec![text.to_string()],
            },
            id,
            metadata: Map::new(),
        }
    }
}

/// Body of `POST backend-api/conversation`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationPayload {
    pub action: Action,
    pub conversation_mode: ConversationModeEnvelope,
    pub conversation_id: Option<String>,
    pub arkose_token: Option<String>,
    pub force_paragen: bool,
    pub history_and_training_disabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<OutgoingMessage>,
    pub model: String,
    pub parent_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_offset_min: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websocket_request_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomInstructions {
    pub about_user_message: String,
    pub about_model_message: String,
    pub enabled: bool,
}
