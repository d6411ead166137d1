pub mod delta;
pub mod payload;

pub use delta::DeltaAssembler;

use crate::challenge::ChallengeTokenGenerator;
use crate::client::BackendClient;
use crate::config::ModelKind;
use crate::error::{ ChatError, ChatResult };
use crate::models::chat::{
    last_mapping_key,
    latest_model_slug,
    Conversation,
    FinishReason,
    ResponseDelta,
    ServerEvent,
};
use crate::models::payload::ConversationPayload;
use crate::transport::{ ResponseStream, SseLineDecoder, Transport };
use futures::{ Stream, StreamExt };
use log::{ debug, info };
use serde_json::{ json, Value };
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

pub type DeltaStream<'a> = Pin<Box<dyn Stream<Item = ChatResult<ResponseDelta>> + Send + 'a>>;

/// Owns one conversation's lineage and drives its turns.
pub struct ConversationEngine {
    client: Arc<BackendClient>,
    transport: Arc<dyn Transport>,
    tokens: Arc<ChallengeTokenGenerator>,
    always_challenge: bool,
    conversation_id: Option<String>,
    parent_id: Option<String>,
    model: Option<ModelKind>,
}

impl ConversationEngine {
    pub fn new(
        client: Arc<BackendClient>,
        transport: Arc<dyn Transport>,
        tokens: Arc<ChallengeTokenGenerator>,
        conversation_id: Option<String>,
        model: Option<ModelKind>
    ) -> Self {
        let always_challenge = client.config().generate_challenge_token;
        Self {
            client,
            transport,
            tokens,
            always_challenge,
            conversation_id,
            parent_id: None,
            model,
        }
    }

    /// Resume from a known lineage without fetching the chat.
    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn model(&self) -> Option<ModelKind> {
        self.model
    }

    pub fn snapshot(&self) -> Conversation {
        Conversation {
            id: self.conversation_id.clone(),
            parent_id: self.parent_id.clone(),
            model: self.model,
            transport: self.transport.mode(),
        }
    }

    /// Fetches the chat and backfills parent and model from it. `{}` when the
    /// conversation has no server identifier yet.
    pub async fn fetch_history(&mut self) -> ChatResult<Value> {
        let Some(conversation_id) = self.conversation_id.clone() else {
            return Ok(json!({}));
        };

        let raw = self.client.fetch_chat_raw(&conversation_id).await?;
        let (chat, parent_id, model) = resolve_history(&raw).map_err(|e| ChatError::unexpected(e, raw.as_str()))?;
        debug!("Backfilled conversation {} (parent {}, model {})", conversation_id, parent_id, model);
        self.parent_id = Some(parent_id);
        self.model = Some(model);
        Ok(chat)
    }

    /// Soft-deletes the conversation on the server and forgets its lineage.
    pub async fn delete(&mut self) -> ChatResult<()> {
        if let Some(conversation_id) = self.conversation_id.clone() {
            self.client.delete_conversation(&conversation_id).await?;
            info!("Deleted conversation {}", conversation_id);
            self.conversation_id = None;
            self.parent_id = None;
        }
        Ok(())
    }

    fn active_model(&self) -> ModelKind {
        self.model.unwrap_or_default()
    }

    async fn challenge_token(&self) -> ChatResult<Option<String>> {
        if self.always_challenge || self.active_model().needs_challenge_token() {
            Ok(Some(self.tokens.generate().await?))
        } else {
            Ok(None)
        }
    }

    async fn continuation_payload(&self) -> ChatResult<ConversationPayload> {
        let token = self.challenge_token().await?;
        Ok(
            payload::continuation(
                self.conversation_id.as_deref(),
                self.parent_id.as_deref(),
                self.active_model(),
                token,
                self.transport.mode()
            )
        )
    }

    /// Sends `text` and returns the lazily streamed deltas of the reply.
    ///
    /// Validation, history backfill and the challenge token happen before the
    /// first request; failures there are returned directly. Anything that goes
    /// wrong while streaming ends the stream with one `UnexpectedResponse`
    /// carrying the raw server text of the turn.
    pub async fn send(&mut self, text: &str) -> ChatResult<DeltaStream<'_>> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }
        if self.conversation_id.is_some() && (self.parent_id.is_none() || self.model.is_none()) {
            self.fetch_history().await?;
        }

        let token = self.challenge_token().await?;
        let first = payload::new_turn(
            text,
            self.conversation_id.as_deref(),
            self.parent_id.as_deref(),
            self.active_model(),
            token,
            self.transport.mode()
        );

        let turn = Turn::new(self, first);
        Ok(
            Box::pin(
                futures::stream::unfold(turn, |mut turn| async move {
                    let item = turn.next_item().await?;
                    Some((item, turn))
                })
            )
        )
    }
}

/// Parent (last mapping key) and model (latest assistant tag) of a fetched chat.
fn resolve_history(raw: &str) -> ChatResult<(Value, String, ModelKind)> {
    let chat: Value = serde_json::from_str(raw)?;
    let parent_id = last_mapping_key(&chat).ok_or_else(|| ChatError::malformed("chat has no message mapping"))?;
    let slug = latest_model_slug(&chat).ok_or_else(|| {
        ChatError::malformed("chat has no assistant message with a model tag")
    })?;
    let model = ModelKind::from_slug(&slug)?;
    Ok((chat, parent_id, model))
}

/// Send → stream → maybe continue → finalize, one segment per request.
struct Turn<'a> {
    engine: &'a mut ConversationEngine,
    next_payload: Option<ConversationPayload>,
    stream: Option<ResponseStream>,
    decoder: SseLineDecoder,
    assembler: DeltaAssembler,
    last_event: Option<ServerEvent>,
    queued: VecDeque<ResponseDelta>,
    raw: Vec<u8>,
    failure: Option<ChatError>,
    finished: bool,
}

impl<'a> Turn<'a> {
    fn new(engine: &'a mut ConversationEngine, first: ConversationPayload) -> Self {
        Self {
            engine,
            next_payload: Some(first),
            stream: None,
            decoder: SseLineDecoder::new(),
            assembler: DeltaAssembler::new(),
            last_event: None,
            queued: VecDeque::new(),
            raw: Vec::new(),
            failure: None,
            finished: false,
        }
    }

    async fn next_item(&mut self) -> Option<ChatResult<ResponseDelta>> {
        loop {
            if let Some(delta) = self.queued.pop_front() {
                return Some(Ok(delta));
            }
            if let Some(failure) = self.failure.take() {
                return Some(Err(failure));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.advance().await {
                // Deltas decoded before the failure still go out first.
                self.finished = true;
                self.stream = None;
                let raw = String::from_utf8_lossy(&self.raw).into_owned();
                self.failure = Some(ChatError::unexpected(e, raw));
            }
        }
    }

    async fn advance(&mut self) -> ChatResult<()> {
        if self.stream.is_none() {
            match self.next_payload.take() {
                Some(payload) => {
                    self.stream = Some(self.engine.transport.send(&payload).await?);
                }
                None => {
                    self.finished = true;
                }
            }
            return Ok(());
        }

        let next = match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        };
        match next {
            Some(Ok(chunk)) => {
                self.raw.extend_from_slice(&chunk);
                for value in self.decoder.push(&chunk) {
                    self.handle(value)?;
                }
            }
            Some(Err(e)) => {
                return Err(e);
            }
            None => {
                self.stream = None;
                for value in self.decoder.finish() {
                    self.handle(value)?;
                }
                self.end_segment().await?;
            }
        }
        Ok(())
    }

    fn handle(&mut self, value: Value) -> ChatResult<()> {
        // System and tool messages may carry content without `parts`.
        if value.pointer("/message/author/role").and_then(Value::as_str) != Some("assistant") {
            return Ok(());
        }
        let event: ServerEvent = serde_json
            ::from_value(value)
            .map_err(|e| ChatError::malformed(format!("unexpected event shape: {}", e)))?;
        if let Some(delta) = self.assembler.push(&event)? {
            self.queued.push_back(delta);
        }
        self.last_event = Some(event);
        Ok(())
    }

    async fn end_segment(&mut self) -> ChatResult<()> {
        let event = self.last_event
            .take()
            .ok_or_else(|| ChatError::malformed("response ended without an assistant message"))?;

        self.engine.conversation_id = Some(event.conversation_id.clone());
        self.engine.parent_id = Some(event.message.id.clone());

        match event.message.finish_reason() {
            Some(FinishReason::MaxTokens) => {
                debug!("Response truncated at length limit, continuing");
                self.next_payload = Some(self.engine.continuation_payload().await?);
            }
            _ => {
                self.finished = true;
            }
        }
        Ok(())
    }
}
