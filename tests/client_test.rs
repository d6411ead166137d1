//! Auth bootstrap, conversation CRUD and transport selection against a mocked backend.

mod common;

use common::{ config_for, ACCESS_TOKEN };
use regpt_engine::client::{ BackendClient, DEFAULT_LIST_LIMIT, DEFAULT_LIST_OFFSET };
use regpt_engine::transport::select_transport;
use regpt_engine::{ ChatError, ChatSession, EngineConfig, TransportMode, TransportPreference };
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{ body_json, header, method, path, query_param };
use wiremock::{ Mock, MockServer, ResponseTemplate };

#[tokio::test]
async fn missing_credentials_are_rejected() {
    let server = MockServer::start().await;
    let config = EngineConfig { access_token: None, session_token: None, ..config_for(&server) };
    assert!(matches!(BackendClient::connect(&config).await, Err(ChatError::TokenNotProvided)));
}

#[tokio::test]
async fn session_token_is_exchanged_for_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/session"))
        .and(header("cookie", "__Secure-next-auth.session-token=sess-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "fresh-token" })))
        .expect(1)
        .mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/backend-api/conversations"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [], "total": 0 })))
        .expect(1)
        .mount(&server).await;

    let config = EngineConfig {
        access_token: None,
        session_token: Some("sess-123".to_string()),
        ..config_for(&server)
    };
    let client = BackendClient::connect(&config).await.unwrap();
    let chats = client.retrieve_chats(0, 5).await.unwrap();
    assert!(chats.items.is_empty());
}

#[tokio::test]
async fn session_response_without_access_token_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server).await;

    let config = EngineConfig {
        access_token: None,
        session_token: Some("expired".to_string()),
        ..config_for(&server)
    };
    assert!(matches!(ChatSession::connect(config).await, Err(ChatError::InvalidSessionToken)));
}

#[tokio::test]
async fn retrieve_chats_uses_paging_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend-api/conversations"))
        .and(query_param("offset", "0"))
        .and(query_param("limit", "28"))
        .and(query_param("order", "updated"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(
                json!({
                "items": [{ "id": "c-1", "title": "First" }, { "id": "c-2", "title": null }],
                "total": 2,
                "limit": 28,
                "offset": 0
            })
            )
        )
        .expect(1)
        .mount(&server).await;

    let client = BackendClient::connect(&config_for(&server)).await.unwrap();
    let chats = client.retrieve_chats(DEFAULT_LIST_OFFSET, DEFAULT_LIST_LIMIT).await.unwrap();
    assert_eq!(chats.items.len(), 2);
    assert_eq!(chats.items[0].title.as_deref(), Some("First"));
    assert_eq!(chats.total, Some(2));
}

#[tokio::test]
async fn delete_hides_conversation_and_clears_engine() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/backend-api/conversation/c-7"))
        .and(body_json(json!({ "is_visible": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.get_conversation("c-7");
    engine.delete().await.unwrap();
    assert_eq!(engine.conversation_id(), None);
    assert_eq!(engine.parent_id(), None);
}

#[tokio::test]
async fn failed_delete_keeps_lineage() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/backend-api/conversation/c-7"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.get_conversation("c-7");
    assert!(matches!(engine.delete().await, Err(ChatError::Backend { status: 404, .. })));
    assert_eq!(engine.conversation_id(), Some("c-7"));
}

#[tokio::test]
async fn fetch_chat_and_custom_instructions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend-api/conversation/c-1"))
        .and(header("authorization", format!("Bearer {}", ACCESS_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "title": "Chat", "mapping": {} })))
        .mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/backend-api/user_system_messages"))
        .and(
            body_json(
                json!({
                "about_user_message": "I write Rust",
                "about_model_message": "Be brief",
                "enabled": true
            })
            )
        )
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": "user_system_message_detail" })))
        .expect(1)
        .mount(&server).await;

    let client = BackendClient::connect(&config_for(&server)).await.unwrap();
    assert_eq!(client.fetch_chat("c-1").await.unwrap()["title"], "Chat");
    let reply = client.set_custom_instructions("I write Rust", "Be brief", true).await.unwrap();
    assert_eq!(reply["object"], "user_system_message_detail");
}

#[tokio::test]
async fn auto_transport_falls_back_to_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend-api/accounts/check/v4-2023-04-27"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(
                json!({
                "accounts": { "default": { "features": ["beta_features"] } }
            })
            )
        )
        .expect(2)
        .mount(&server).await;

    let client = Arc::new(BackendClient::connect(&config_for(&server)).await.unwrap());
    assert!(!client.supports_shared_websocket().await.unwrap());
    let transport = select_transport(client, TransportPreference::Auto).await.unwrap();
    assert_eq!(transport.mode(), TransportMode::HttpStream);
}

#[tokio::test]
async fn failed_capability_check_still_selects_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend-api/accounts/check/v4-2023-04-27"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server).await;

    let client = Arc::new(BackendClient::connect(&config_for(&server)).await.unwrap());
    let transport = select_transport(client, TransportPreference::Auto).await.unwrap();
    assert_eq!(transport.mode(), TransportMode::HttpStream);
}

#[tokio::test]
async fn shared_websocket_feature_is_detected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend-api/accounts/check/v4-2023-04-27"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(
                json!({
                "accounts": {
                    "personal": { "features": [] },
                    "team": { "features": ["shared_websocket"] }
                }
            })
            )
        )
        .mount(&server).await;

    let client = BackendClient::connect(&config_for(&server)).await.unwrap();
    assert!(client.supports_shared_websocket().await.unwrap());
}
