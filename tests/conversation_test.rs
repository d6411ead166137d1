//! End-to-end turns over the HTTP streaming transport.

mod common;

use common::{ assistant_event, config_for, sse_body, ACCESS_TOKEN };
use futures::StreamExt;
use regpt_engine::{ ChatError, ChatSession, ModelKind, ResponseDelta, TransportMode };
use serde_json::json;
use wiremock::matchers::{ body_partial_json, header, method, path };
use wiremock::{ Mock, MockServer, ResponseTemplate };

fn event_stream(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

async fn collect(stream: regpt_engine::DeltaStream<'_>) -> Vec<Result<ResponseDelta, ChatError>> {
    stream.collect().await
}

#[tokio::test]
async fn turn_streams_suffix_deltas_and_records_lineage() {
    let server = MockServer::start().await;
    let user_echo =
        json!({
        "message": {
            "id": "user-1",
            "author": { "role": "user" },
            "content": { "content_type": "text", "parts": ["Hello"] }
        },
        "conversation_id": "c-1"
    });
    let body = sse_body(
        &[
            user_echo,
            assistant_event("c-1", "m-1", "", None),
            assistant_event("c-1", "m-1", "Hi", None),
            assistant_event("c-1", "m-1", "Hi there", Some("stop")),
        ]
    );

    Mock::given(method("POST"))
        .and(path("/backend-api/conversation"))
        .and(header("authorization", format!("Bearer {}", ACCESS_TOKEN).as_str()))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(json!({ "action": "next", "conversation_id": null, "model": "text-davinci-002-render-sha" })))
        .respond_with(event_stream(body))
        .expect(1)
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    assert_eq!(session.transport_mode(), TransportMode::HttpStream);

    let mut engine = session.new_conversation(None);
    let deltas = collect(engine.send("Hello").await.unwrap()).await;
    let deltas: Vec<ResponseDelta> = deltas.into_iter().map(Result::unwrap).collect();

    let texts: Vec<&str> = deltas
        .iter()
        .map(|d| d.content.as_str())
        .collect();
    assert_eq!(texts, vec!["Hi", " there"]);
    assert_eq!(deltas[0].conversation_id, "c-1");
    assert_eq!(deltas[0].message_id, "m-1");

    assert_eq!(engine.conversation_id(), Some("c-1"));
    assert_eq!(engine.parent_id(), Some("m-1"));
    assert_eq!(engine.model(), Some(ModelKind::Gpt35));
}

#[tokio::test]
async fn follow_up_turn_reuses_server_lineage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/backend-api/conversation"))
        .and(body_partial_json(json!({ "conversation_id": null })))
        .respond_with(event_stream(sse_body(&[assistant_event("c-1", "m-1", "One", Some("stop"))])))
        .expect(1)
        .mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/backend-api/conversation"))
        .and(body_partial_json(json!({ "conversation_id": "c-1", "parent_message_id": "m-1" })))
        .respond_with(event_stream(sse_body(&[assistant_event("c-1", "m-2", "Two", Some("stop"))])))
        .expect(1)
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.new_conversation(None);

    let first = collect(engine.send("first").await.unwrap()).await;
    assert_eq!(first.len(), 1);
    let second = collect(engine.send("second").await.unwrap()).await;
    assert_eq!(second[0].as_ref().unwrap().content, "Two");
    assert_eq!(engine.parent_id(), Some("m-2"));
}

#[tokio::test]
async fn truncated_response_is_continued_transparently() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/backend-api/conversation"))
        .and(body_partial_json(json!({ "action": "next" })))
        .respond_with(
            event_stream(
                sse_body(
                    &[
                        assistant_event("c-1", "m-1", "Hello", None),
                        assistant_event("c-1", "m-1", "Hello, wor", Some("max_tokens")),
                    ]
                )
            )
        )
        .expect(1)
        .mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/backend-api/conversation"))
        .and(
            body_partial_json(
                json!({
                    "action": "continue",
                    "conversation_id": "c-1",
                    "parent_message_id": "m-1",
                    "timezone_offset_min": -300
                })
            )
        )
        .respond_with(
            event_stream(
                sse_body(
                    &[
                        assistant_event("c-1", "m-2", "Hello, wor", None),
                        assistant_event("c-1", "m-2", "Hello, world!", Some("stop")),
                    ]
                )
            )
        )
        .expect(1)
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.new_conversation(None);
    let deltas = collect(engine.send("Say hello").await.unwrap()).await;

    let text: String = deltas
        .into_iter()
        .map(|d| d.unwrap().content)
        .collect();
    assert_eq!(text, "Hello, world!");
    assert_eq!(engine.conversation_id(), Some("c-1"));
    assert_eq!(engine.parent_id(), Some("m-2"));
}

#[tokio::test]
async fn resumed_conversation_backfills_parent_and_model() {
    let server = MockServer::start().await;

    let chat =
        json!({
        "title": "Old chat",
        "mapping": {
            "root": { "message": null },
            "m-a": {
                "message": {
                    "author": { "role": "assistant" },
                    "metadata": { "model_slug": "gpt-4" }
                }
            },
            "m-last": {
                "message": { "author": { "role": "user" }, "metadata": {} }
            }
        }
    });
    Mock::given(method("GET"))
        .and(path("/backend-api/conversation/c-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat))
        .expect(1)
        .mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok-1" })))
        .mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/backend-api/conversation"))
        .and(header("openai-sentinel-arkose-token", "tok-1"))
        .and(
            body_partial_json(
                json!({
                    "conversation_id": "c-9",
                    "parent_message_id": "m-last",
                    "model": "gpt-4",
                    "arkose_token": "tok-1"
                })
            )
        )
        .respond_with(event_stream(sse_body(&[assistant_event("c-9", "m-next", "Back again", Some("stop"))])))
        .expect(1)
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.get_conversation("c-9");
    assert_eq!(engine.model(), None);

    let deltas = collect(engine.send("Still there?").await.unwrap()).await;
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].as_ref().unwrap().content, "Back again");
    assert_eq!(engine.model(), Some(ModelKind::Gpt4));
    assert_eq!(engine.parent_id(), Some("m-next"));
}

#[tokio::test]
async fn fetch_history_without_identifier_is_empty() {
    let server = MockServer::start().await;
    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.new_conversation(Some(ModelKind::Gpt4));
    assert_eq!(engine.fetch_history().await.unwrap(), json!({}));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn history_with_unknown_model_is_wrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend-api/conversation/c-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(
                json!({
                "mapping": {
                    "m-1": { "message": { "author": { "role": "assistant" }, "metadata": { "model_slug": "gpt-9" } } }
                }
            })
            )
        )
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.get_conversation("c-1");
    let err = engine.fetch_history().await.unwrap_err();
    match err {
        ChatError::UnexpectedResponse { source, raw } => {
            assert!(matches!(*source, ChatError::UnknownModel(_)));
            assert!(raw.contains("gpt-9"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(engine.parent_id(), None);
}

#[tokio::test]
async fn empty_input_is_rejected_before_any_request() {
    let server = MockServer::start().await;
    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.new_conversation(None);

    assert!(matches!(engine.send("   \n").await, Err(ChatError::EmptyInput)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn shrinking_text_ends_turn_with_raw_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backend-api/conversation"))
        .respond_with(
            event_stream(
                sse_body(&[assistant_event("c-1", "m-1", "Hello", None), assistant_event("c-1", "m-1", "Help", None)])
            )
        )
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.new_conversation(None);
    let items = collect(engine.send("Hi").await.unwrap()).await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap().content, "Hello");
    match &items[1] {
        Err(ChatError::UnexpectedResponse { source, raw }) => {
            assert!(matches!(**source, ChatError::MalformedResponse(_)));
            assert!(raw.contains("Help"));
        }
        other => panic!("unexpected item: {:?}", other),
    }
}

#[tokio::test]
async fn backend_failure_surfaces_as_unexpected_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backend-api/conversation"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.new_conversation(None);
    let items = collect(engine.send("Hi").await.unwrap()).await;

    assert_eq!(items.len(), 1);
    match &items[0] {
        Err(ChatError::UnexpectedResponse { source, .. }) => {
            assert!(matches!(**source, ChatError::Backend { status: 500, .. }));
        }
        other => panic!("unexpected item: {:?}", other),
    }
    assert_eq!(engine.conversation_id(), None);
}

#[tokio::test]
async fn stream_without_assistant_message_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backend-api/conversation"))
        .respond_with(event_stream("data: {\"ping\":true}\n\ndata: [DONE]\n\n".to_string()))
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.new_conversation(None);
    let items = collect(engine.send("Hi").await.unwrap()).await;

    assert_eq!(items.len(), 1);
    assert!(
        matches!(
            &items[0],
            Err(ChatError::UnexpectedResponse { source, .. }) if matches!(**source, ChatError::MalformedResponse(_))
        )
    );
}

#[tokio::test]
async fn snapshot_reflects_engine_state() {
    let server = MockServer::start().await;
    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let engine = session.new_conversation(Some(ModelKind::Gpt4));
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.id, None);
    assert_eq!(snapshot.model, Some(ModelKind::Gpt4));
    assert_eq!(snapshot.transport, TransportMode::HttpStream);
}

#[tokio::test]
async fn system_context_message_without_parts_is_skipped() {
    let server = MockServer::start().await;
    let context =
        json!({
        "message": {
            "id": "sys-1",
            "author": { "role": "system" },
            "content": { "content_type": "model_editable_context", "model_set_context": "" },
            "metadata": {}
        },
        "conversation_id": "c-1"
    });
    Mock::given(method("POST"))
        .and(path("/backend-api/conversation"))
        .respond_with(
            event_stream(
                sse_body(
                    &[
                        context,
                        assistant_event("c-1", "m-1", "Hi", None),
                        assistant_event("c-1", "m-1", "Hi there", Some("stop")),
                    ]
                )
            )
        )
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.new_conversation(None);
    let items = collect(engine.send("Hello").await.unwrap()).await;

    let texts: Vec<String> = items
        .into_iter()
        .map(|d| d.unwrap().content)
        .collect();
    assert_eq!(texts, vec!["Hi", " there"]);
    assert_eq!(engine.parent_id(), Some("m-1"));
}

#[tokio::test]
async fn unrecognised_finish_reason_ends_turn_without_continuing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backend-api/conversation"))
        .respond_with(
            event_stream(
                sse_body(
                    &[
                        assistant_event("c-1", "m-1", "Partial", None),
                        assistant_event("c-1", "m-1", "Partial answer", Some("interrupted")),
                    ]
                )
            )
        )
        .expect(1)
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.new_conversation(None);
    let text: String = collect(engine.send("Go").await.unwrap()).await
        .into_iter()
        .map(|d| d.unwrap().content)
        .collect();
    assert_eq!(text, "Partial answer");
    assert_eq!(engine.parent_id(), Some("m-1"));
}

#[tokio::test]
async fn missing_finish_details_ends_turn_without_continuing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backend-api/conversation"))
        .respond_with(event_stream(sse_body(&[assistant_event("c-1", "m-1", "Done?", None)])))
        .expect(1)
        .mount(&server).await;

    let session = ChatSession::connect(config_for(&server)).await.unwrap();
    let mut engine = session.new_conversation(None);
    let items = collect(engine.send("Go").await.unwrap()).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_ref().unwrap().content, "Done?");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
