//! Shared helpers for tests that drive the engine against a mocked backend.

#![allow(dead_code)]

use regpt_engine::{ EngineConfig, TransportPreference };
use serde_json::{ json, Value };
use std::time::Duration;
use wiremock::MockServer;

pub const ACCESS_TOKEN: &str = "test-access-token";

/// HTTP transport, bearer token preset, fallback token endpoint on the mock.
pub fn config_for(server: &MockServer) -> EngineConfig {
    EngineConfig {
        base_url: server.uri(),
        access_token: Some(ACCESS_TOKEN.to_string()),
        transport: TransportPreference::Http,
        local_minting: false,
        fallback_token_url: format!("{}/token", server.uri()),
        challenge_surl: server.uri(),
        retry_attempts: 3,
        retry_delay: Duration::from_millis(10),
        ..Default::default()
    }
}

pub fn assistant_event(conversation_id: &str, message_id: &str, text: &str, finish: Option<&str>) -> Value {
    let metadata = match finish {
        Some(reason) => json!({ "parent_id": "user-1", "finish_details": { "type": reason } }),
        None => json!({ "parent_id": "user-1" }),
    };
    json!({
        "message": {
            "id": message_id,
            "author": { "role": "assistant" },
            "content": { "content_type": "text", "parts": [text] },
            "metadata": metadata
        },
        "conversation_id": conversation_id,
        "error": null
    })
}

/// `data:` lines for every event followed by the `[DONE]` sentinel.
pub fn sse_body(events: &[Value]) -> String {
    let mut body = String::new();
    for event in events {
        body.push_str(&format!("data: {}\n\n", event));
    }
    body.push_str("data: [DONE]\n\n");
    body
}
