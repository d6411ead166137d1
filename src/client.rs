use crate::config::{ EngineConfig, SESSION_COOKIE_NAME };
use crate::error::{ ChatError, ChatResult };
use crate::models::chat::ConversationList;
use crate::models::payload::{ ConversationPayload, CustomInstructions };
use crate::models::websocket::{ ConversationAck, RegisterWebSocketResponse };
use log::{ debug, info };
use reqwest::header::{
    HeaderMap,
    HeaderValue,
    ACCEPT,
    ACCEPT_LANGUAGE,
    AUTHORIZATION,
    CONTENT_TYPE,
    COOKIE,
    ORIGIN,
    USER_AGENT,
};
use reqwest::{ Client as HttpClient, Response };
use serde::de::DeserializeOwned;
use serde_json::{ json, Value };

pub const CHALLENGE_TOKEN_HEADER: &str = "Openai-Sentinel-Arkose-Token";
pub const SHARED_WEBSOCKET_FEATURE: &str = "shared_websocket";
const ACCOUNT_CHECK_ROUTE: &str = "accounts/check/v4-2023-04-27";

fn header_value(value: &str) -> ChatResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| ChatError::malformed(format!("invalid header value: {}", e)))
}

/// Authenticated HTTP access to the backend.
pub struct BackendClient {
    http: HttpClient,
    config: EngineConfig,
}

impl BackendClient {
    /// Resolves the bearer token (configured access token, else the session
    /// exchange) and builds the client.
    pub async fn connect(config: &EngineConfig) -> ChatResult<Self> {
        let access_token = match (&config.access_token, &config.session_token) {
            (Some(token), _) => token.clone(),
            (None, Some(session_token)) => Self::fetch_access_token(config, session_token).await?,
            (None, None) => {
                return Err(ChatError::TokenNotProvided);
            }
        };
        Self::with_access_token(config, &access_token)
    }

    pub fn with_access_token(config: &EngineConfig, access_token: &str) -> ChatResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&config.user_agent)?);
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", access_token))?);
        headers.insert(ORIGIN, header_value(&config.origin())?);

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Exchanges the long-lived session cookie for a bearer token.
    pub async fn fetch_access_token(config: &EngineConfig, session_token: &str) -> ChatResult<String> {
        let response = HttpClient::new()
            .get(config.auth_session_url())
            .header(USER_AGENT, header_value(&config.user_agent)?)
            .header(ACCEPT, "*/*")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .header(COOKIE, header_value(&format!("{}={}", SESSION_COOKIE_NAME, session_token))?)
            .send().await?;

        let body: Value = response.json().await.map_err(|_| ChatError::InvalidSessionToken)?;
        match body.get("accessToken").and_then(|token| token.as_str()) {
            Some(token) if !token.is_empty() => {
                info!("Session token exchanged for an access token");
                Ok(token.to_string())
            }
            _ => Err(ChatError::InvalidSessionToken),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn checked(response: Response) -> ChatResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChatError::Backend { status: status.as_u16(), body })
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> ChatResult<T> {
        let body = Self::checked(response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// POSTs a conversation payload; the challenge token also travels as a header.
    pub async fn post_conversation(&self, payload: &ConversationPayload) -> ChatResult<Response> {
        let mut request = self.http.post(self.config.api_url("conversation")).json(payload);
        if let Some(token) = payload.arkose_token.as_deref() {
            request = request.header(CHALLENGE_TOKEN_HEADER, header_value(token)?);
        }
        debug!("POST conversation action={:?} model={}", payload.action, payload.model);
        Self::checked(request.send().await?).await
    }

    /// Duplex-mode POST: the body is an acknowledgement, the answer arrives on the socket.
    pub async fn post_conversation_ack(&self, payload: &ConversationPayload) -> ChatResult<ConversationAck> {
        let response = self.post_conversation(payload).await?;
        Ok(serde_json::from_str(&response.text().await?)?)
    }

    /// Raw body of `GET conversation/{id}`.
    pub async fn fetch_chat_raw(&self, conversation_id: &str) -> ChatResult<String> {
        let url = self.config.api_url(&format!("conversation/{}", conversation_id));
        let response = Self::checked(self.http.get(url).send().await?).await?;
        Ok(response.text().await?)
    }

    pub async fn fetch_chat(&self, conversation_id: &str) -> ChatResult<Value> {
        Ok(serde_json::from_str(&self.fetch_chat_raw(conversation_id).await?)?)
    }

    /// Soft delete: the conversation is hidden, not purged.
    pub async fn delete_conversation(&self, conversation_id: &str) -> ChatResult<Value> {
        let url = self.config.api_url(&format!("conversation/{}", conversation_id));
        let response = self.http.patch(url).json(&json!({ "is_visible": false })).send().await?;
        Self::read_json(response).await
    }

    pub async fn retrieve_chats(&self, offset: u32, limit: u32) -> ChatResult<ConversationList> {
        let response = self.http
            .get(self.config.api_url("conversations"))
            .query(
                &[
                    ("offset", offset.to_string()),
                    ("limit", limit.to_string()),
                    ("order", "updated".to_string()),
                ]
            )
            .send().await?;
        Self::read_json(response).await
    }

    pub async fn set_custom_instructions(
        &self,
        about_user: &str,
        about_model: &str,
        enable_for_new_chats: bool
    ) -> ChatResult<Value> {
        let body = CustomInstructions {
            about_user_message: about_user.to_string(),
            about_model_message: about_model.to_string(),
            enabled: enable_for_new_chats,
        };
        let response = self.http.post(self.config.api_url("user_system_messages")).json(&body).send().await?;
        Self::read_json(response).await
    }

    /// True when any account on the token lists the shared-socket feature.
    pub async fn supports_shared_websocket(&self) -> ChatResult<bool> {
        let response = self.http.get(self.config.api_url(ACCOUNT_CHECK_ROUTE)).send().await?;
        let body: Value = Self::read_json(response).await?;
        let supported = body
            .get("accounts")
            .and_then(|accounts| accounts.as_object())
            .map(|accounts| {
                accounts.values().any(|account| {
                    account
                        .get("features")
                        .and_then(|features| features.as_array())
                        .map_or(false, |features| {
                            features.iter().any(|feature| feature.as_str() == Some(SHARED_WEBSOCKET_FEATURE))
                        })
                })
            })
            .unwrap_or(false);
        Ok(supported)
    }

    pub async fn register_websocket(&self) -> ChatResult<RegisterWebSocketResponse> {
        let response = self.http.post(self.config.api_url("register-websocket")).json(&json!({})).send().await?;
        Self::read_json(response).await
    }
}

pub const DEFAULT_LIST_OFFSET: u32 = 0;
pub const DEFAULT_LIST_LIMIT: u32 = 28;
