pub mod http_stream;
pub mod sse;
pub mod websocket;

pub use http_stream::HttpStream;
pub use sse::SseLineDecoder;
pub use websocket::DuplexSocket;

use crate::client::BackendClient;
use crate::config::TransportPreference;
use crate::error::ChatResult;
use crate::models::payload::ConversationPayload;
use async_trait::async_trait;
use futures::Stream;
use log::{ info, warn };
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// Raw response bytes for one request, in arrival order. The stream ends at
/// the terminal sentinel.
pub type ResponseStream = Pin<Box<dyn Stream<Item = ChatResult<Vec<u8>>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    HttpStream,
    DuplexSocket,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::HttpStream => write!(f, "http-stream"),
            TransportMode::DuplexSocket => write!(f, "duplex-socket"),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn mode(&self) -> TransportMode;

    async fn send(&self, payload: &ConversationPayload) -> ChatResult<ResponseStream>;

    /// Stops background work and releases the connection. Idempotent.
    async fn close(&self);
}

/// Picks the delivery strategy once for a session.
pub async fn select_transport(
    client: Arc<BackendClient>,
    preference: TransportPreference
) -> ChatResult<Arc<dyn Transport>> {
    let use_socket = match preference {
        TransportPreference::Http => false,
        TransportPreference::WebSocket => true,
        TransportPreference::Auto =>
            match client.supports_shared_websocket().await {
                Ok(supported) => supported,
                Err(e) => {
                    warn!("Capability check failed, using HTTP streaming: {}", e);
                    false
                }
            }
    };

    let transport: Arc<dyn Transport> = if use_socket {
        Arc::new(DuplexSocket::connect(client).await?)
    } else {
        Arc::new(HttpStream::new(client))
    };
    info!("Transport selected: {}", transport.mode());
    Ok(transport)
}
