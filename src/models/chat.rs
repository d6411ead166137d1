use crate::config::ModelKind;
use crate::transport::TransportMode;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Author {
    pub role: Role,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub content_type: Option<String>,
    pub parts: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    Stop,
    /// The backend cut the response off; a continuation request resumes it.
    MaxTokens,
    Other(String),
}

impl From<String> for FinishReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "stop" => FinishReason::Stop,
            "max_tokens" => FinishReason::MaxTokens,
            _ => FinishReason::Other(value),
        }
    }
}

impl From<FinishReason> for String {
    fn from(value: FinishReason) -> Self {
        match value {
            FinishReason::Stop => "stop".to_string(),
            FinishReason::MaxTokens => "max_tokens".to_string(),
            FinishReason::Other(other) => other,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinishDetails {
    #[serde(rename = "type")]
    pub reason: FinishReason,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub finish_details: Option<FinishDetails>,
    #[serde(default)]
    pub model_slug: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author: Author,
    pub content: Content,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    /// Text of the first content part. Non-text parts read as empty.
    pub fn text(&self) -> &str {
        self.content.parts
            .first()
            .and_then(|part| part.as_str())
            .unwrap_or("")
    }

    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.metadata.finish_details.as_ref().map(|details| &details.reason)
    }

    pub fn is_assistant(&self) -> bool {
        self.author.role == Role::Assistant
    }
}

/// One decoded `data:` line of a conversation stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerEvent {
    pub message: Message,
    pub conversation_id: String,
}

/// Unit yielded to the caller: only the text revealed since the previous event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDelta {
    pub content: String,
    pub message_id: String,
    pub parent_id: Option<String>,
    pub conversation_id: String,
}

/// Thread state owned by one engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Option<String>,
    pub parent_id: Option<String>,
    pub model: Option<ModelKind>,
    pub transport: TransportMode,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub update_time: Option<Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConversationList {
    #[serde(default)]
    pub items: Vec<ConversationSummary>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

/// Key of the most recently inserted entry of a fetched chat's `mapping`.
pub fn last_mapping_key(chat: &Value) -> Option<String> {
    chat.get("mapping")?
        .as_object()?
        .keys()
        .last()
        .cloned()
}

/// Model tag of the most recent assistant message in a fetched chat.
pub fn latest_model_slug(chat: &Value) -> Option<String> {
    let mapping = chat.get("mapping")?.as_object()?;
    mapping
        .values()
        .rev()
        .filter_map(|node| node.get("message"))
        .filter(|message| {
            message
                .pointer("/author/role")
                .and_then(|role| role.as_str()) == Some("assistant")
        })
        .find_map(|message| {
            message
                .pointer("/metadata/model_slug")
                .and_then(|slug| slug.as_str())
                .map(|slug| slug.to_string())
        })
}
