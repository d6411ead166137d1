use crate::config::ModelKind;
use crate::models::payload::{ Action, ConversationModeEnvelope, ConversationPayload, OutgoingMessage };
use crate::transport::TransportMode;
use uuid::Uuid;

/// Offset the web client reports on continuation requests.
pub const CONTINUATION_TIMEZONE_OFFSET_MIN: i32 = -300;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn request_id(mode: TransportMode) -> Option<String> {
    match mode {
        TransportMode::DuplexSocket => Some(new_id()),
        TransportMode::HttpStream => None,
    }
}

/// Payload for a fresh user message.
pub fn new_turn(
    text: &str,
    conversation_id: Option<&str>,
    parent_id: Option<&str>,
    model: ModelKind,
    challenge_token: Option<String>,
    mode: TransportMode
) -> ConversationPayload {
    ConversationPayload {
        action: Action::Next,
        conversation_mode: ConversationModeEnvelope::default(),
        conversation_id: conversation_id.map(str::to_string),
        arkose_token: challenge_token,
        force_paragen: false,
        history_and_training_disabled: false,
        messages: vec![OutgoingMessage::user_text(new_id(), text)],
        model: model.slug().to_string(),
        parent_message_id: Some(parent_id.map_or_else(new_id, str::to_string)),
        timezone_offset_min: None,
        websocket_request_id: request_id(mode),
    }
}

/// Payload resuming a response that stopped at the length limit.
pub fn continuation(
    conversation_id: Option<&str>,
    parent_id: Option<&str>,
    model: ModelKind,
    challenge_token: Option<String>,
    mode: TransportMode
) -> ConversationPayload {
    ConversationPayload {
        action: Action::Continue,
        conversation_mode: ConversationModeEnvelope::default(),
        conversation_id: conversation_id.map(str::to_string),
        arkose_token: challenge_token,
        force_paragen: false,
        history_and_training_disabled: false,
        messages: Vec::new(),
        model: model.slug().to_string(),
        parent_message_id: parent_id.map(str::to_string),
        timezone_offset_min: Some(CONTINUATION_TIMEZONE_OFFSET_MIN),
        websocket_request_id: request_id(mode),
    }
}
