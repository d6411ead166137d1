use crate::challenge::ChallengeTokenGenerator;
use crate::client::BackendClient;
use crate::config::{ EngineConfig, ModelKind };
use crate::conversation::ConversationEngine;
use crate::error::ChatResult;
use crate::storage::StoredConversation;
use crate::transport::{ select_transport, Transport, TransportMode };
use log::info;
use std::sync::Arc;

/// Authenticated session: one backend client, one token generator and one
/// transport shared by every conversation opened from it.
pub struct ChatSession {
    config: EngineConfig,
    client: Arc<BackendClient>,
    tokens: Arc<ChallengeTokenGenerator>,
    transport: Arc<dyn Transport>,
}

impl ChatSession {
    pub async fn connect(config: EngineConfig) -> ChatResult<Self> {
        let client = Arc::new(BackendClient::connect(&config).await?);
        let tokens = Arc::new(ChallengeTokenGenerator::new(&config)?);
        let transport = select_transport(client.clone(), config.transport).await?;
        info!("Session ready (model {}, transport {})", config.model, transport.mode());
        Ok(Self { config, client, tokens, transport })
    }

    pub fn with_parts(
        config: EngineConfig,
        client: Arc<BackendClient>,
        tokens: Arc<ChallengeTokenGenerator>,
        transport: Arc<dyn Transport>
    ) -> Self {
        Self { config, client, tokens, transport }
    }

    /// Starts a conversation with no server identifier yet.
    pub fn new_conversation(&self, model: Option<ModelKind>) -> ConversationEngine {
        ConversationEngine::new(
            self.client.clone(),
            self.transport.clone(),
            self.tokens.clone(),
            None,
            Some(model.unwrap_or(self.config.model))
        )
    }

    /// Resumes a conversation; parent and model are backfilled on first send.
    pub fn get_conversation(&self, conversation_id: &str) -> ConversationEngine {
        ConversationEngine::new(
            self.client.clone(),
            self.transport.clone(),
            self.tokens.clone(),
            Some(conversation_id.to_string()),
            None
        )
    }

    /// Resumes from remembered lineage, skipping the backfill when it is complete.
    pub fn resume_conversation(&self, stored: &StoredConversation) -> ConversationEngine {
        ConversationEngine::new(
            self.client.clone(),
            self.transport.clone(),
            self.tokens.clone(),
            Some(stored.conversation_id.clone()),
            stored.model
        ).with_parent(stored.parent_id.clone())
    }

    pub fn client(&self) -> &Arc<BackendClient> {
        &self.client
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport_mode(&self) -> TransportMode {
        self.transport.mode()
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }
}
