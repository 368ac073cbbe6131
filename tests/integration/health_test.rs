//! Integration tests for the health endpoint.

use axum::body::Body;
use http::{Request, StatusCode};

use crate::helpers::{Chunk, TestApp};

#[tokio::test]
async fn test_health_counts_active_sessions() {
    let app = TestApp::new();

    let health = || Request::get("/health").body(Body::empty()).unwrap();

    let response = app.send(health()).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["active_sessions"], 0);

    app.upload(Chunk::new("h", "bytes 0-9/20", vec![0; 10]).file_name("h.bin"))
        .await;

    let response = app.send(health()).await;
    assert_eq!(response.json()["data"]["active_sessions"], 1);
}

#[tokio::test]
async fn test_custom_upload_path() {
    let app = TestApp::with_config(|config| config.server.upload_path = "/files/chunks".into());

    let response = app
        .upload(Chunk::new("p", "bytes 0-3/4", b"data".to_vec()).file_name("p.bin"))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let default_path = app
        .send(
            Request::post("/upload")
                .header("Session-ID", "q")
                .header("Content-Range", "bytes 0-3/4")
                .body(Body::from("data"))
                .unwrap(),
        )
        .await;
    assert_eq!(default_path.status, StatusCode::NOT_FOUND);
}
