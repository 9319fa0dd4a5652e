//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use marzelle_gateway::api::ApiServerBuilder;
use marzelle_gateway::{SessionStore, WindowPolicy};
use tokio::net::TcpListener;

pub const TEST_AUDIO: &[u8] = b"ID3\x03fake-mp3-frames";

/// Serve a router on an ephemeral local port, returning its base URL
pub async fn spawn_upstream(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind fake upstream");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{addr}")
}

/// Fake `ElevenLabs` streaming endpoint
///
/// Answers with [`TEST_AUDIO`] when called with key `eleven-test`, and with
/// `status` otherwise set to a failure code.
pub fn fake_elevenlabs(status: StatusCode) -> Router {
    Router::new().route(
        "/v1/text-to-speech/{voice}/stream",
        post(move |headers: HeaderMap| async move {
            let authorized = headers
                .get("xi-api-key")
                .is_some_and(|v| v.as_bytes() == b"eleven-test");
            if !authorized {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            if !status.is_success() {
                return (status, "upstream broke").into_response();
            }
            ([(header::CONTENT_TYPE, "audio/mpeg")], TEST_AUDIO).into_response()
        }),
    )
}

/// Render content fragments as an SSE chat completion body
pub fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let chunk = serde_json::json!({
            "choices": [{ "index": 0, "delta": { "content": fragment }, "finish_reason": null }]
        });
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    let last = serde_json::json!({
        "choices": [{ "index": 0, "delta": {}, "finish_reason": "stop" }]
    });
    body.push_str(&format!("data: {last}\n\n"));
    body.push_str("data: [DONE]\n\n");
    body
}

/// Fake chat completions endpoint
///
/// The first `failures` requests get a 500; later ones stream `fragments`.
/// Returns the router and a request counter.
pub fn fake_completions(
    fragments: &'static [&'static str],
    failures: usize,
) -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let router = Router::new().route(
        "/chat/completions",
        post(move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    return (StatusCode::INTERNAL_SERVER_ERROR, "overloaded").into_response();
                }
                Response::builder()
                    .header(header::CONTENT_TYPE, "text/event-stream")
                    .body(Body::from(sse_body(fragments)))
                    .expect("valid response")
            }
        }),
    );

    (router, calls)
}

/// Fake chat completions endpoint that sends `events` verbatim, one chunk
/// each, then drops the connection mid-body if `cut` is set
pub fn fake_raw_completions(events: &'static [&'static str], cut: bool) -> Router {
    Router::new().route(
        "/chat/completions",
        post(move || async move {
            let mut chunks: Vec<Result<String, std::io::Error>> =
                events.iter().map(|e| Ok((*e).to_string())).collect();
            if cut {
                chunks.push(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "upstream went away",
                )));
            }
            Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(Body::from_stream(futures::stream::iter(chunks)))
                .expect("valid response")
        }),
    )
}

/// Builder with a fresh session store
pub fn builder() -> ApiServerBuilder {
    let sessions = Arc::new(SessionStore::new("You are Marzelle.", WindowPolicy::PinSystem));
    ApiServerBuilder::new(sessions, 0)
}

/// Read a response body as JSON
pub async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&body).expect("body is not JSON")
}
