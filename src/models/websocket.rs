use serde::{ Serialize, Deserialize };

/// Frame read from the shared socket. `body` is base64 of either SSE text or a control string.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WebSocketFrame {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub websocket_request_id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterWebSocketResponse {
    pub wss_url: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Reply to a conversation POST made in duplex mode; the answer streams over the socket.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConversationAck {
    pub websocket_request_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
}
