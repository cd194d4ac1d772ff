use super::*;
use crate::repository::InMemoryRepository;
use crate::uploader::test_helpers::{Harness, test_config};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;


fn router(harness: &Harness) -> Router {
    create_router(Arc::new(harness.uploader.clone()))
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    // Extractor rejections answer in plain text
    let json = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, json)
}

#[tokio::test]
async fn api_key_guards_every_route() {
    let harness = Harness::with_config(InMemoryRepository::new(), |dir| {
        let mut config = test_config(dir);
        config.api.api_key = Some("letmein".to_string());
        config
    });

    let (status, body) = send(router(&harness), "GET", "/run/progress", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let request = Request::builder()
        .uri("/run/progress")
        .header("X-Api-Key", "letmein")
        .body(Body::empty())
        .unwrap();
    let response = router(&harness).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cors_headers_follow_config() {
    let harness = Harness::new(InMemoryRepository::new());
    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://panel.local")
        .body(Body::empty())
        .unwrap();
    let response = router(&harness).oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    let harness = Harness::with_config(InMemoryRepository::new(), |dir| {
        let mut config = test_config(dir);
        config.api.cors_enabled = false;
        config
    });
    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://panel.local")
        .body(Body::empty())
        .unwrap();
    let response = router(&harness).oneshot(request).await.unwrap();
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn cors_with_listed_origins() {
    let harness = Harness::with_config(InMemoryRepository::new(), |dir| {
        let mut config = test_config(dir);
        config.api.cors_origins = vec!["http://panel.local".to_string()];
        config
    });
    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://panel.local")
        .body(Body::empty())
        .unwrap();
    let response = router(&harness).oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "http://panel.local"
    );
}

#[tokio::test]
async fn server_stops_on_shutdown_signal() {
    let harness = Harness::with_config(InMemoryRepository::new(), |dir| {
        let mut config = test_config(dir);
        config.api.bind_address = "127.0.0.1:0".parse().unwrap();
        config
    });
    let uploader = Arc::new(harness.uploader.clone());
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(serve_until(uploader, async {
        let _ = rx.await;
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let harness = Harness::new(InMemoryRepository::new());
    let (status, _) = send(router(&harness), "GET", "/downloads", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
