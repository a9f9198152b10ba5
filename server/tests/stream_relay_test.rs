//! Live relay tests
//!
//! Runs a fake retrieval upstream on an ephemeral port and exercises the
//! full relay path: SSE decoding, assembly, normalization of malformed and
//! out-of-order frames, completion persistence, and interrupted streams.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::post;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::json;
use server::api::{self, ApiState};
use server::history;
use server::retrieval::RetrievalClient;
use server::signed_url::UrlSigner;
use server::store::ChatStore;
use shared_types::{Role, StreamEvent};
use sqlx::sqlite::SqlitePoolOptions;
use std::time::Duration;
use tower::ServiceExt;

// ============================================================================
// Test Helpers
// ============================================================================

async fn test_store() -> ChatStore {
    // One connection: each pooled connection would otherwise open its own
    // empty in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    let store = ChatStore::new(pool);
    store.migrate().await.expect("migrations");
    store
}

/// Serve a canned SSE body from a throwaway upstream.
async fn spawn_upstream(body: &'static str) -> String {
    let app = Router::new().route(
        "/chat/stream",
        post(move || async move {
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                body,
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve upstream");
    });
    format!("http://{addr}")
}

fn state_for(store: ChatStore, upstream_url: &str) -> ApiState {
    ApiState {
        store,
        retrieval: RetrievalClient::new(upstream_url),
        signer: UrlSigner::new(b"test-key".to_vec(), Duration::from_secs(3600)),
    }
}

fn stream_request(body: serde_json::Value, user: &str, org: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat/stream")
        .header("X-User-Id", user)
        .header("X-Organization-Id", org)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn parse_events(body: &str) -> Vec<StreamEvent> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .filter(|payload| !payload.is_empty())
        .map(|payload| serde_json::from_str(payload).expect("relayed event parses"))
        .collect()
}

// ============================================================================
// Relay Tests
// ============================================================================

#[tokio::test]
async fn test_relay_normalizes_and_persists_completed_answer() {
    let upstream = spawn_upstream(concat!(
        "data: {\"type\":\"thinking\",\"content\":\"looking\"}\n\n",
        "data: {\"type\":\"thinking_done\"}\n\n",
        // Out-of-order reasoning after thinking_done: dropped by the assembler.
        "data: {\"type\":\"thinking\",\"content\":\"stale\"}\n\n",
        // Malformed frame: dropped by the decoder.
        "data: {broken json\n\n",
        "data: {\"type\":\"chunk\",\"content\":\"Revenue grew \"}\n\n",
        "data: {\"type\":\"citation\",\"number\":1,\"source\":{\"document_id\":\"doc-1\",\"document_name\":\"q3/report.pdf\",\"document_url\":\"\",\"page_number\":4,\"chunk_text\":\"revenue table\",\"relevance_score\":0.93}}\n\n",
        "data: {\"type\":\"chunk\",\"content\":\"12% [1].\"}\n\n",
        "data: {\"type\":\"done\"}\n\n",
    ))
    .await;

    let store = test_store().await;
    store
        .create_chat("chat-1", "org-1", "user-1", None)
        .await
        .unwrap();

    let app = api::router().with_state(state_for(store.clone(), &upstream));
    let response = app
        .oneshot(stream_request(
            json!({
                "organization_id": "org-1",
                "query": "How did Q3 go?",
                "conversation_history": [],
                "chat_id": "chat-1"
            }),
            "user-1",
            "org-1",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let events = parse_events(&String::from_utf8_lossy(&bytes));

    // The client sees only well-formed, in-order events.
    assert_eq!(events.len(), 6);
    assert_eq!(
        events[0],
        StreamEvent::Thinking {
            content: "looking".to_string()
        }
    );
    assert_eq!(events[1], StreamEvent::ThinkingDone);
    assert!(matches!(events[2], StreamEvent::Chunk { .. }));
    assert!(matches!(events[3], StreamEvent::Citation { number: 1, .. }));
    assert_eq!(*events.last().unwrap(), StreamEvent::Done);

    // The completed answer was persisted server-side; the body stream only
    // closes after the relay task (and its persistence) finished.
    let conversation = history::load_conversation(&store, "chat-1", "user-1")
        .await
        .unwrap();
    assert_eq!(conversation.messages.len(), 1);
    let message = &conversation.messages[0];
    assert_eq!(message.role, Role::Assistant);
    assert_eq!(message.content, "Revenue grew 12% [1].");
    assert_eq!(message.thinking.as_deref(), Some("looking"));
    assert_eq!(message.citations.len(), 1);
    assert_eq!(
        message.citations.resolve(1).unwrap().chunk_text,
        "revenue table"
    );
    assert!(message.is_complete);
}

#[tokio::test]
async fn test_relay_interrupted_stream_is_not_persisted() {
    let upstream = spawn_upstream(concat!(
        "data: {\"type\":\"chunk\",\"content\":\"Partial ans\"}\n\n",
        // No terminal event: the upstream connection just ends.
    ))
    .await;

    let store = test_store().await;
    store
        .create_chat("chat-1", "org-1", "user-1", None)
        .await
        .unwrap();

    let app = api::router().with_state(state_for(store.clone(), &upstream));
    let response = app
        .oneshot(stream_request(
            json!({
                "organization_id": "org-1",
                "query": "hello",
                "chat_id": "chat-1"
            }),
            "user-1",
            "org-1",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let events = parse_events(&String::from_utf8_lossy(&bytes));

    // Partial content was relayed, but no `done` — the client marks the
    // answer interrupted.
    assert_eq!(
        events,
        vec![StreamEvent::Chunk {
            content: "Partial ans".to_string()
        }]
    );

    let conversation = history::load_conversation(&store, "chat-1", "user-1")
        .await
        .unwrap();
    assert!(conversation.messages.is_empty());
}

#[tokio::test]
async fn test_relay_without_chat_id_streams_without_persisting() {
    let upstream = spawn_upstream(concat!(
        "data: {\"type\":\"chunk\",\"content\":\"ephemeral\"}\n\n",
        "data: {\"type\":\"done\"}\n\n",
    ))
    .await;

    let store = test_store().await;
    let app = api::router().with_state(state_for(store, &upstream));
    let response = app
        .oneshot(stream_request(
            json!({
                "organization_id": "org-1",
                "query": "hello"
            }),
            "user-1",
            "org-1",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let events = parse_events(&String::from_utf8_lossy(&bytes));
    assert_eq!(events.len(), 2);
    assert_eq!(*events.last().unwrap(), StreamEvent::Done);
}

#[tokio::test]
async fn test_relay_to_foreign_chat_is_not_found() {
    let store = test_store().await;
    store
        .create_chat("chat-1", "org-1", "user-1", None)
        .await
        .unwrap();

    // No upstream work should happen: the closed port would 502 if reached.
    let app = api::router().with_state(state_for(store, "http://127.0.0.1:9"));
    let response = app
        .oneshot(stream_request(
            json!({
                "organization_id": "org-1",
                "query": "hello",
                "chat_id": "chat-1"
            }),
            "intruder",
            "org-1",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_relay_upstream_unreachable_is_bad_gateway() {
    let store = test_store().await;
    let app = api::router().with_state(state_for(store, "http://127.0.0.1:9"));
    let response = app
        .oneshot(stream_request(
            json!({
                "organization_id": "org-1",
                "query": "hello"
            }),
            "user-1",
            "org-1",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_relay_rejects_empty_query() {
    let store = test_store().await;
    let app = api::router().with_state(state_for(store, "http://127.0.0.1:9"));
    let response = app
        .oneshot(stream_request(
            json!({
                "organization_id": "org-1",
                "query": "   "
            }),
            "user-1",
            "org-1",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
