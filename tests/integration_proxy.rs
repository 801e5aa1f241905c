// Proxy pipeline behaviour: ingress taint scan, pass-through, streaming.

use archestra_gateway::api::create_router;
use archestra_gateway::core::models::Operator;
use archestra_gateway::engine::trusted_data::NO_POLICY_REASON;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

mod common;
use common::*;

async fn create_chat(app: &axum::Router) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    parsed["chatId"].as_str().unwrap().to_string()
}

fn completion_request(chat_id: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/openai/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-archestra-chat-id", chat_id)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Conversation carrying one tool result for `getEmails` under call id tc1.
fn conversation_with_tool_result(result: &Value) -> Value {
    json!({
        "model": "gpt-4o",
        "messages": [
            {"role": "user", "content": "summarize my inbox"},
            {"role": "assistant", "content": null, "tool_calls": [{
                "id": "tc1",
                "type": "function",
                "function": {"name": "getEmails", "arguments": "{}"}
            }]},
            {"role": "tool", "tool_call_id": "tc1", "content": result.to_string()}
        ]
    })
}

#[tokio::test]
async fn test_pass_through_is_byte_exact() {
    let llm = ScriptedLlm::new();
    let state = test_state(llm.clone()).await;

    let script = assistant_text_body("All quiet.");
    llm.push_raw(script.clone());

    let app = create_router(state);
    let chat_id = create_chat(&app).await;
    let response = app
        .oneshot(completion_request(
            &chat_id,
            &json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "status?"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, serde_json::to_vec(&script).unwrap());
}

#[tokio::test]
async fn test_trusted_tool_result_forwards_unchanged() {
    let llm = ScriptedLlm::new();
    let state = test_state(llm.clone()).await;
    let (agent_id, tool_id) = seed_agent_with_tool(&state, "mailer", "getEmails").await;
    seed_trusted_data_policy(
        &state,
        agent_id,
        tool_id,
        "emails[*].from",
        Operator::EndsWith,
        "@archestra.ai",
    )
    .await;

    llm.push_text("Inbox summarized.");

    let chats = state.chats.clone();
    let app = create_router(state);
    let chat_id = create_chat(&app).await;

    let result = json!({"emails": [{"from": "a@archestra.ai"}, {"from": "b@archestra.ai"}]});
    let request_body = conversation_with_tool_result(&result);
    let response = app
        .oneshot(completion_request(&chat_id, &request_body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The upstream saw the original tool content, not a summary.
    let forwarded = llm.request_messages(0);
    assert_eq!(forwarded[2]["content"], json!(result.to_string()));

    // Persisted untainted.
    let interactions = chats
        .find_interactions_by_chat_id(Uuid::parse_str(&chat_id).unwrap())
        .await
        .unwrap();
    let tool_turn = interactions
        .iter()
        .find(|i| i.content["role"] == json!("tool"))
        .unwrap();
    assert!(!tool_turn.tainted);
    assert!(tool_turn.taint_reason.is_none());
}

#[tokio::test]
async fn test_untrusted_tool_result_is_sanitized_and_tainted() {
    let llm = ScriptedLlm::new();
    let state = test_state(llm.clone()).await;
    let (agent_id, tool_id) = seed_agent_with_tool(&state, "mailer", "getEmails").await;
    seed_trusted_data_policy(
        &state,
        agent_id,
        tool_id,
        "emails[*].from",
        Operator::EndsWith,
        "@archestra.ai",
    )
    .await;

    // Dual-LLM script: privileged says DONE, then the summary turn, then the
    // main forward.
    llm.push_text("DONE");
    llm.push_text("The inbox contains one external email.");
    llm.push_text("Inbox summarized.");

    let chats = state.chats.clone();
    let app = create_router(state);
    let chat_id = create_chat(&app).await;

    let result = json!({"emails": [{"from": "a@archestra.ai"}, {"from": "c@evil.com"}]});
    let response = app
        .oneshot(completion_request(
            &chat_id,
            &conversation_with_tool_result(&result),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The forward request (third recorded) carries the summary instead of
    // the raw result.
    let forwarded = llm.request_messages(2);
    assert_eq!(
        forwarded[2]["content"],
        json!("The inbox contains one external email.")
    );

    // The original content was persisted, tainted, with the fixed reason.
    let interactions = chats
        .find_interactions_by_chat_id(Uuid::parse_str(&chat_id).unwrap())
        .await
        .unwrap();
    let tool_turn = interactions
        .iter()
        .find(|i| i.content["role"] == json!("tool"))
        .unwrap();
    assert!(tool_turn.tainted);
    assert_eq!(tool_turn.taint_reason.as_deref(), Some(NO_POLICY_REASON));
    assert_eq!(tool_turn.content["content"], json!(result.to_string()));
}

#[tokio::test]
async fn test_unknown_provenance_passes_through_tainted() {
    let llm = ScriptedLlm::new();
    let state = test_state(llm.clone()).await;

    llm.push_text("ok");

    let chats = state.chats.clone();
    let app = create_router(state);
    let chat_id = create_chat(&app).await;

    // A tool message whose call id no assistant turn ever emitted.
    let response = app
        .oneshot(completion_request(
            &chat_id,
            &json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "user", "content": "hm"},
                    {"role": "tool", "tool_call_id": "orphan", "content": "raw bytes"}
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Unsanitised pass-through.
    let forwarded = llm.request_messages(0);
    assert_eq!(forwarded[1]["content"], json!("raw bytes"));

    let interactions = chats
        .find_interactions_by_chat_id(Uuid::parse_str(&chat_id).unwrap())
        .await
        .unwrap();
    let tool_turn = interactions
        .iter()
        .find(|i| i.content["role"] == json!("tool"))
        .unwrap();
    assert!(tool_turn.tainted);
    assert_eq!(
        tool_turn.taint_reason.as_deref(),
        Some("unknown tool for result")
    );
}

#[tokio::test]
async fn test_interaction_order_tool_then_user_then_assistant() {
    let llm = ScriptedLlm::new();
    let state = test_state(llm.clone()).await;
    seed_agent_with_tool(&state, "mailer", "getEmails").await;

    // No trusted-data policy joined: untrusted, so dual-LLM runs first.
    llm.push_text("DONE");
    llm.push_text("summary");
    llm.push_text("final answer");

    let chats = state.chats.clone();
    let app = create_router(state);
    let chat_id = create_chat(&app).await;

    let response = app
        .oneshot(completion_request(
            &chat_id,
            &conversation_with_tool_result(&json!({"emails": []})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let interactions = chats
        .find_interactions_by_chat_id(Uuid::parse_str(&chat_id).unwrap())
        .await
        .unwrap();
    let roles: Vec<&str> = interactions
        .iter()
        .map(|i| i.content["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["tool", "user", "assistant"]);
}

#[tokio::test]
async fn test_streaming_relays_frames_and_terminates() {
    let llm = ScriptedLlm::new();
    let state = test_state(llm.clone()).await;

    llm.push_stream(vec![
        r#"{"choices":[{"delta":{"role":"assistant","content":"Hel"}}]}"#.to_string(),
        r#"{"choices":[{"delta":{"content":"lo"}}]}"#.to_string(),
    ]);

    let chats = state.chats.clone();
    let app = create_router(state);
    let chat_id = create_chat(&app).await;

    let response = app
        .oneshot(completion_request(
            &chat_id,
            &json!({
                "model": "gpt-4o",
                "stream": true,
                "messages": [{"role": "user", "content": "hi"}]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains(r#"data: {"choices":[{"delta":{"role":"assistant","content":"Hel"}}]}"#));
    assert!(text.contains(r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#));
    assert!(text.trim_end().ends_with("data: [DONE]"));

    // The reassembled assistant message was persisted.
    let interactions = chats
        .find_interactions_by_chat_id(Uuid::parse_str(&chat_id).unwrap())
        .await
        .unwrap();
    let assistant = interactions
        .iter()
        .find(|i| i.content["role"] == json!("assistant"))
        .unwrap();
    assert_eq!(assistant.content["content"], json!("Hello"));
}

#[tokio::test]
async fn test_streaming_block_emits_error_event_before_done() {
    let llm = ScriptedLlm::new();
    let state = test_state(llm.clone()).await;
    let (agent_id, tool_id) = seed_agent_with_tool(&state, "mailer", "sendEmail").await;
    seed_invocation_policy(
        &state,
        agent_id,
        tool_id,
        "to",
        Operator::EndsWith,
        "@grafana.com",
        archestra_gateway::core::models::PolicyAction::Block,
        Some("External recipients are forbidden"),
    )
    .await;

    llm.push_stream(vec![
        r#"{"choices":[{"delta":{"role":"assistant","tool_calls":[{"index":0,"id":"tc1","type":"function","function":{"name":"sendEmail","arguments":"{\"to\":"}}]}}]}"#.to_string(),
        r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"x@grafana.com\"}"}}]}}]}"#.to_string(),
    ]);

    let app = create_router(state);
    let chat_id = create_chat(&app).await;
    let response = app
        .oneshot(completion_request(
            &chat_id,
            &json!({
                "model": "gpt-4o",
                "stream": true,
                "messages": [{"role": "user", "content": "mail them"}]
            }),
        ))
        .await
        .unwrap();

    // The block can only surface inside the stream.
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();

    let error_pos = text
        .find("tool_invocation_blocked")
        .expect("error frame present");
    let done_pos = text.find("data: [DONE]").expect("terminator present");
    assert!(error_pos < done_pos);
    assert!(text.contains("External recipients are forbidden"));
}

#[tokio::test]
async fn test_missing_chat_header_is_400() {
    let llm = ScriptedLlm::new();
    let app = create_router(test_state(llm).await);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/openai/chat/completions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"model": "gpt-4o", "messages": []}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["error"]["type"], json!("invalid_request_error"));
}

#[tokio::test]
async fn test_unknown_chat_is_404() {
    let llm = ScriptedLlm::new();
    let app = create_router(test_state(llm).await);
    let response = app
        .oneshot(completion_request(
            &Uuid::new_v4().to_string(),
            &json!({"model": "gpt-4o", "messages": []}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_provider_is_400() {
    let llm = ScriptedLlm::new();
    let state = test_state(llm).await;
    let app = create_router(state);
    let chat_id = create_chat(&app).await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/acme/chat/completions")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-archestra-chat-id", chat_id)
                .body(Body::from(
                    json!({"model": "gpt-4o", "messages": []}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_models_passthrough_and_health() {
    let llm = ScriptedLlm::new();
    let app = create_router(test_state(llm).await);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/openai/models")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["status"], json!("healthy"));
    assert_eq!(parsed["database"], json!("connected"));
}
