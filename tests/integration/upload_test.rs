//! Integration tests for the chunk upload endpoint.

use std::sync::Arc;

use axum::body::Body;
use http::{Request, StatusCode};

use resumable_storage::chunked::range;

use crate::helpers::{Chunk, TestApp};

#[tokio::test]
async fn test_two_chunk_upload() {
    let app = TestApp::new();

    let first = app
        .upload(Chunk::new("abc", "bytes 0-99/200", vec![b'a'; 100]).file_name("report.pdf"))
        .await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(first.text, "bytes 0-99/200");
    assert_eq!(first.header("range"), Some("bytes 0-99/200"));
    assert_eq!(first.header("connection"), Some("close"));
    assert_eq!(first.header("upload-chunk-length"), Some("100"));
    assert_eq!(first.header("upload-complete"), None);
    assert_eq!(
        tokio::fs::metadata(app.temp_file("abc")).await.unwrap().len(),
        100
    );

    let second = app
        .upload(Chunk::new("abc", "bytes 100-199/200", vec![b'b'; 100]))
        .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.text, "bytes 100-199/200");
    assert_eq!(second.header("upload-complete"), Some("true"));

    assert!(!app.sessions.contains("abc"));
    let published = tokio::fs::read(app.destination("report.pdf")).await.unwrap();
    assert_eq!(published.len(), 200);
    assert!(published[..100].iter().all(|&b| b == b'a'));
    assert!(published[100..].iter().all(|&b| b == b'b'));
}

#[tokio::test]
async fn test_client_encoded_ranges() {
    let app = TestApp::new();
    let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let chunk_size = 300;

    for (index, part) in data.chunks(chunk_size).enumerate() {
        let descriptor = range::encode(
            index as u64,
            chunk_size as u64,
            part.len() as u64,
            data.len() as u64,
        );
        let mut chunk = Chunk::new("enc", &descriptor, part.to_vec());
        if index == 0 {
            chunk = chunk.file_name("encoded.bin");
        }

        let response = app.upload(chunk).await;
        assert!(response.status.is_success(), "{}", response.text);
        assert_eq!(response.text, descriptor);
    }

    assert_eq!(
        tokio::fs::read(app.destination("encoded.bin")).await.unwrap(),
        data
    );
    assert!(app.sessions.is_empty());
}

#[tokio::test]
async fn test_missing_session_id_rejected() {
    let app = TestApp::new();
    let response = app
        .upload(
            Chunk::new("abc", "bytes 0-9/10", vec![0; 10])
                .file_name("x.bin")
                .without_session_id(),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), "REQUEST_VALIDATION");
    assert!(app.sessions.is_empty());
}

#[tokio::test]
async fn test_missing_range_rejected() {
    let app = TestApp::new();
    let response = app
        .upload(
            Chunk::new("abc", "bytes 0-9/10", vec![0; 10])
                .file_name("x.bin")
                .without_range(),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), "REQUEST_VALIDATION");
    assert!(!app.temp_file("abc").exists());
}

#[tokio::test]
async fn test_malformed_range_rejected() {
    let app = TestApp::new();
    let response = app
        .upload(Chunk::new("abc", "bytes zero-9/10", vec![0; 10]).file_name("x.bin"))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), "MALFORMED_RANGE");
    assert!(!response.json()["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_first_chunk_without_file_name() {
    let app = TestApp::new();
    let response = app
        .upload(Chunk::new("abc", "bytes 0-9/10", vec![0; 10]))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), "MISSING_FILE_NAME");
    assert!(app.sessions.is_empty());
}

#[tokio::test]
async fn test_unknown_session_continuation() {
    let app = TestApp::new();
    let response = app
        .upload(Chunk::new("nobody", "bytes 100-199/200", vec![0; 100]))
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.error_code(), "UNKNOWN_SESSION");
    assert!(!app.temp_file("nobody").exists());
}

#[tokio::test]
async fn test_out_of_order_chunk_then_resume() {
    let app = TestApp::new();
    app.upload(Chunk::new("ooo", "bytes 0-99/300", vec![1; 100]).file_name("o.bin"))
        .await;

    let skipped = app
        .upload(Chunk::new("ooo", "bytes 200-299/300", vec![3; 100]))
        .await;
    assert_eq!(skipped.status, StatusCode::CONFLICT);
    assert_eq!(skipped.error_code(), "OUT_OF_ORDER_CHUNK");

    // The client resends from its last acknowledged offset.
    let resumed = app
        .upload(Chunk::new("ooo", "bytes 100-199/300", vec![2; 100]))
        .await;
    assert_eq!(resumed.status, StatusCode::OK);
    let last = app
        .upload(Chunk::new("ooo", "bytes 200-299/300", vec![3; 100]))
        .await;
    assert_eq!(last.header("upload-complete"), Some("true"));

    let published = tokio::fs::read(app.destination("o.bin")).await.unwrap();
    assert_eq!(published.len(), 300);
    assert_eq!(published[150], 2);
}

#[tokio::test]
async fn test_duplicate_first_chunk() {
    let app = TestApp::new();
    app.upload(Chunk::new("dup", "bytes 0-9/20", vec![1; 10]).file_name("d.bin"))
        .await;

    let again = app
        .upload(Chunk::new("dup", "bytes 0-9/20", vec![2; 10]).file_name("d.bin"))
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.error_code(), "DUPLICATE_SESSION");
    assert_eq!(tokio::fs::read(app.temp_file("dup")).await.unwrap(), [1; 10]);
}

#[tokio::test]
async fn test_non_post_method_rejected() {
    let app = TestApp::new();
    for method in ["GET", "PUT", "DELETE"] {
        let response = app
            .upload(
                Chunk::new("m", "bytes 0-9/10", vec![0; 10])
                    .file_name("m.bin")
                    .method(method),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{method}");
        assert_eq!(response.json()["message"], "Invalid request.");
    }
    assert!(app.sessions.is_empty());
    assert!(!app.temp_file("m").exists());
}

#[tokio::test]
async fn test_name_collision_gets_timestamp_prefix() {
    let app = TestApp::new();
    tokio::fs::create_dir_all(app.config.upload.destination_root_path())
        .await
        .unwrap();
    tokio::fs::write(app.destination("report.pdf"), b"original")
        .await
        .unwrap();

    let response = app
        .upload(Chunk::new("col", "bytes 0-3/4", b"next".to_vec()).file_name("report.pdf"))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    assert_eq!(
        tokio::fs::read(app.destination("report.pdf")).await.unwrap(),
        b"original"
    );

    let mut entries = tokio::fs::read_dir(app.config.upload.destination_root_path())
        .await
        .unwrap();
    let mut prefixed = Vec::new();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        let name = entry.file_name().into_string().unwrap();
        if name != "report.pdf" {
            prefixed.push(name);
        }
    }
    assert_eq!(prefixed.len(), 1);
    assert!(prefixed[0].ends_with("-report.pdf"));
    assert_eq!(
        tokio::fs::read(app.destination(&prefixed[0])).await.unwrap(),
        b"next"
    );
}

#[tokio::test]
async fn test_oversized_chunk_rejected() {
    let app = TestApp::with_config(|config| config.upload.max_chunk_size_bytes = 8);
    let response = app
        .upload(Chunk::new("big", "bytes 0-15/16", vec![0; 16]).file_name("big.bin"))
        .await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.sessions.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_chunks_create_one_session() {
    let app = Arc::new(TestApp::new());

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let app = Arc::clone(&app);
        tasks.push(tokio::spawn(async move {
            app.upload(Chunk::new("race", "bytes 0-4/10", b"hello".to_vec()).file_name("r.bin"))
                .await
                .status
        }));
    }

    let mut statuses = Vec::new();
    for task in tasks {
        statuses.push(task.await.unwrap());
    }

    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CREATED).count(),
        1
    );
    assert!(
        statuses
            .iter()
            .all(|s| *s == StatusCode::CREATED || *s == StatusCode::CONFLICT)
    );
    assert_eq!(app.sessions.len(), 1);
    assert_eq!(
        tokio::fs::read(app.temp_file("race")).await.unwrap(),
        b"hello"
    );
}

#[tokio::test]
async fn test_failed_finalization_keeps_server_running() {
    let app = TestApp::new();
    // A regular file where the destination directory should be.
    tokio::fs::write(app.config.upload.destination_root_path(), b"blocker")
        .await
        .unwrap();

    let failed = app
        .upload(Chunk::new("fin", "bytes 0-3/4", b"data".to_vec()).file_name("f.bin"))
        .await;
    assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(failed.error_code(), "FINALIZATION_FAILURE");
    assert_eq!(tokio::fs::read(app.temp_file("fin")).await.unwrap(), b"data");
    assert!(app.sessions.is_empty());

    // Other uploads are still served.
    let other = app
        .upload(Chunk::new("other", "bytes 0-9/20", vec![0; 10]).file_name("o.bin"))
        .await;
    assert_eq!(other.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_non_ascii_file_names() {
    let app = TestApp::new();

    let quoted = app
        .upload(Chunk::new("utf", "bytes 0-3/4", b"data".to_vec()).file_name("résumé.txt"))
        .await;
    assert_eq!(quoted.status, StatusCode::CREATED, "{}", quoted.text);
    assert_eq!(
        tokio::fs::read(app.destination("résumé.txt")).await.unwrap(),
        b"data"
    );

    let extended = app
        .send(
            Request::post("/upload")
                .header("Session-ID", "ext")
                .header("Content-Range", "bytes 0-1/2")
                .header(
                    "Content-Disposition",
                    "attachment; filename=\"__.bin\"; filename*=UTF-8''%E6%97%A5%E6%9C%AC%2Ebin",
                )
                .body(Body::from("ok"))
                .unwrap(),
        )
        .await;
    assert_eq!(extended.status, StatusCode::CREATED, "{}", extended.text);
    assert!(app.destination("日本.bin").exists());
}
