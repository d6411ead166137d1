use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(
        "Token not provided. Pass your '__Secure-next-auth.session-token' (or an access token) to the session."
    )]
    TokenNotProvided,

    #[error("Invalid session token provided.")]
    InvalidSessionToken,

    #[error("Exceeded maximum retries for website: {endpoint}")]
    RetryExhausted {
        endpoint: String,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Turn-level failure. `raw` holds everything the server sent during the turn.
    #[error("Unexpected response: {source}")]
    UnexpectedResponse {
        source: Box<ChatError>,
        raw: String,
    },

    #[error("Unknown model '{0}'. Available models: gpt-3.5, gpt-4")]
    UnknownModel(String),

    #[error("Message text must not be empty")]
    EmptyInput,

    #[error("Backend returned HTTP {status}: {body}")]
    Backend {
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Transport is closed")]
    TransportClosed,
}

impl ChatError {
    pub fn unexpected(source: ChatError, raw: impl Into<String>) -> Self {
        ChatError::UnexpectedResponse {
            source: Box::new(source),
            raw: raw.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        ChatError::MalformedResponse(message.into())
    }

    /// Raw server text attached to a turn-level failure, if any.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            ChatError::UnexpectedResponse { raw, .. } => Some(raw.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_keeps_cause_and_raw_text() {
        let err = ChatError::unexpected(ChatError::malformed("missing message"), "data: {}");
        assert_eq!(err.raw_response(), Some("data: {}"));
        assert!(err.to_string().contains("missing message"));
        match err {
            ChatError::UnexpectedResponse { source, .. } => {
                assert!(matches!(*source, ChatError::MalformedResponse(_)));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn retry_exhausted_names_endpoint() {
        let err = ChatError::RetryExhausted { endpoint: "https://mint.example/token".to_string() };
        assert!(err.to_string().contains("https://mint.example/token"));
    }
}
