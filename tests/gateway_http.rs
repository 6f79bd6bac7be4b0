// HTTP host tests: routing, status codes, response shapes, SSE streaming.

mod common;

use axum::Router;
use axum::body::{Body, Bytes, to_bytes};
use axum::http::{Request, StatusCode, header};
use common::{MockBackend, router};
use query_gateway::HostCapabilities;
use futures::stream;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tower::ServiceExt;

fn post_json(action: &str, caller: &str, body: &str) -> Request<Body> {
    Request::post(format!("/api/{action}"))
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", caller)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>, Option<String>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec(), content_type)
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("json body")
}

#[tokio::test]
async fn chatgpt_returns_output_json() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 10, HostCapabilities::LONG_LIVED);

    let (status, body, _) = send(&app, post_json("chatgpt", "1.1.1.1", r#"{"context":"c","query":"q"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["output"], "answer from test-model");
}

#[tokio::test]
async fn missing_field_is_400() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 10, HostCapabilities::LONG_LIVED);

    let (status, body, _) = send(&app, post_json("chatgpt", "1.1.1.1", r#"{"query":"q"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = json_body(&body);
    assert_eq!(body["error"]["code"], 400);
    assert!(body["error"]["message"].as_str().unwrap().contains("context"));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn unknown_action_is_400() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 10, HostCapabilities::LONG_LIVED);

    let (status, body, _) = send(&app, post_json("gpt", "1.1.1.1", "{}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"]["type"], "unknown_action");
}

#[tokio::test]
async fn eleventh_request_in_window_is_429() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 10, HostCapabilities::LONG_LIVED);
    let body = r#"{"context":"c","query":"q"}"#;

    for _ in 0..10 {
        let (status, _, _) = send(&app, post_json("chatgpt", "9.9.9.9", body)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body_bytes, _) = send(&app, post_json("chatgpt", "9.9.9.9", body)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(&body_bytes)["error"]["code"], 429);

    // a different caller still gets through
    let (status, _, _) = send(&app, post_json("chatgpt", "8.8.8.8", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(backend.calls(), 11);
}

#[tokio::test]
async fn stream_on_non_streaming_host_is_501() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 10, HostCapabilities::PER_INVOCATION);

    let (status, body, _) = send(&app, post_json("chatgpt-stream", "1.1.1.1", r#"{"context":"c","query":"q"}"#)).await;

    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(json_body(&body)["error"]["code"], 501);
    assert_eq!(backend.calls(), 0);
}

// a body that records being read and then fails
fn tripwire_body(polled: Arc<AtomicBool>) -> Body {
    Body::from_stream(stream::poll_fn(move |_| {
        polled.store(true, Ordering::SeqCst);
        std::task::Poll::Ready(Some(Err::<Bytes, _>(std::io::Error::other("body was read"))))
    }))
}

#[tokio::test]
async fn unsupported_stream_fails_without_reading_the_body() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 10, HostCapabilities::PER_INVOCATION);
    let polled = Arc::new(AtomicBool::new(false));

    let req = Request::post("/api/chatgpt-stream")
        .header(header::CONTENT_TYPE, "application/json")
        .body(tripwire_body(polled.clone()))
        .unwrap();
    let (status, body, _) = send(&app, req).await;

    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(json_body(&body)["error"]["type"], "unsupported_operation");
    assert!(!polled.load(Ordering::SeqCst));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn unknown_action_fails_without_reading_the_body() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 10, HostCapabilities::LONG_LIVED);
    let polled = Arc::new(AtomicBool::new(false));

    let req = Request::post("/api/summarize")
        .body(tripwire_body(polled.clone()))
        .unwrap();
    let (status, _, _) = send(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!polled.load(Ordering::SeqCst));
}

#[tokio::test]
async fn stream_is_served_as_event_stream() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 10, HostCapabilities::LONG_LIVED);

    let (status, body, content_type) =
        send(&app, post_json("chatgpt-stream", "1.1.1.1", r#"{"context":"c","query":"q"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/event-stream"));
    let text = String::from_utf8(body).unwrap();
    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    assert_eq!(data, vec!["Hel", "lo", ", world"]);
}

#[tokio::test]
async fn stream_failure_ends_with_error_event() {
    let backend = Arc::new(MockBackend {
        fail_stream_after: Some(1),
        ..MockBackend::new()
    });
    let app = router(&backend, 10, HostCapabilities::LONG_LIVED);

    let (status, body, _) = send(&app, post_json("chatgpt-stream", "1.1.1.1", r#"{"context":"c","query":"q"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("data: Hel\n"));
    assert!(text.contains("event: error\n"));
    assert!(!text.contains("after-error"));
    assert!(!text.contains("connection reset"));
}

#[tokio::test]
async fn upstream_failure_is_502_without_details() {
    let backend = Arc::new(MockBackend::failing());
    let app = router(&backend, 10, HostCapabilities::LONG_LIVED);

    let (status, body, _) = send(&app, post_json("select-relevant-section", "1.1.1.1", r#"{"context":"c","query":"q"}"#)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!String::from_utf8(body).unwrap().contains("gpt-internal-7"));
}

#[tokio::test]
async fn speech_to_text_accepts_raw_audio() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 10, HostCapabilities::PER_INVOCATION);

    let req = Request::post("/api/speech-to-text")
        .header(header::CONTENT_TYPE, "audio/wav")
        .body(Body::from(vec![0u8; 64]))
        .unwrap();
    let (status, body, _) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["output"], "transcribed 64 bytes");
}

#[tokio::test]
async fn speech_to_text_accepts_multipart_upload() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 10, HostCapabilities::LONG_LIVED);

    let boundary = "gateway-test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"clip.wav\"\r\n\
         Content-Type: audio/wav\r\n\r\n\
         RIFFWAVE\r\n\
         --{boundary}--\r\n"
    );
    let req = Request::post("/api/speech-to-text")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();
    let (status, body, _) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["output"], "transcribed 8 bytes");
}

#[tokio::test]
async fn empty_audio_is_400() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 10, HostCapabilities::LONG_LIVED);

    let req = Request::post("/api/speech-to-text").body(Body::empty()).unwrap();
    let (status, _, _) = send(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn health_reports_host_shape() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 10, HostCapabilities::PER_INVOCATION);

    send(&app, post_json("text-to-speech", "1.1.1.1", r#"{"text":"hi"}"#)).await;
    let (status, body, _) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["streaming"], false);
    assert_eq!(body["tracked_callers"], 1);
}

#[tokio::test]
async fn metrics_are_exposed_and_not_rate_limited() {
    let backend = Arc::new(MockBackend::new());
    let app = router(&backend, 1, HostCapabilities::LONG_LIVED);

    send(&app, post_json("chatgpt", "1.1.1.1", r#"{"context":"c","query":"q"}"#)).await;
    for _ in 0..3 {
        let (status, body, _) = send(&app, Request::get("/metrics").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("gateway_requests_total"));
    }
}
