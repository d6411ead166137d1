use super::{ ResponseStream, Transport, TransportMode };
use crate::client::BackendClient;
use crate::error::{ ChatError, ChatResult };
use crate::models::payload::ConversationPayload;
use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One POST per send; a spawned producer forwards body chunks to the consumer.
pub struct HttpStream {
    client: Arc<BackendClient>,
}

impl HttpStream {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpStream {
    fn mode(&self) -> TransportMode {
        TransportMode::HttpStream
    }

    async fn send(&self, payload: &ConversationPayload) -> ChatResult<ResponseStream> {
        let (tx, rx) = mpsc::unbounded_channel::<ChatResult<Vec<u8>>>();
        let client = self.client.clone();
        let payload = payload.clone();

        tokio::spawn(async move {
            let response = match client.post_conversation(&payload).await {
                Ok(response) => response,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };

            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let item = chunk.map(|bytes| bytes.to_vec()).map_err(ChatError::from);
                let failed = item.is_err();
                if tx.send(item).is_err() {
                    debug!("Response consumer went away, dropping the rest of the body");
                    return;
                }
                if failed {
                    return;
                }
            }
            // Dropping `tx` is the end-of-body sentinel.
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn close(&self) {}
}
