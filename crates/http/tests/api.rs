//! End-to-end exercises of the axum router against an in-memory repository,
//! using `tower::ServiceExt::oneshot` rather than a bound socket.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use filex_core::chunker::FixedSizeChunker;
use filex_core::embedder::{HashingImageEmbedder, HashingTextEmbedder};
use filex_core::handler::{ImageFileHandler, TextFileHandler};
use filex_core::{HandlerRouter, IndexingController};
use filex_http::folders::RegisteredFolders;
use filex_http::{router, AppState};

fn test_router_factory() -> HandlerRouter {
    let chunker = Box::new(FixedSizeChunker::new(512, 50).unwrap());
    let text_embedder = Arc::new(HashingTextEmbedder::new(32));
    let image_embedder = Arc::new(HashingImageEmbedder::new(16));
    HandlerRouter::new(
        TextFileHandler::new(chunker, text_embedder),
        ImageFileHandler::new(image_embedder),
    )
}

fn test_app(folders_path: PathBuf) -> axum::Router {
    let controller = Arc::new(IndexingController::new(Arc::new(test_router_factory), 2));
    let state = AppState {
        controller,
        text_embedder: Arc::new(HashingTextEmbedder::new(32)),
        image_embedder: Arc::new(HashingImageEmbedder::new(16)),
        folders: Arc::new(RwLock::new(RegisteredFolders::default())),
        folders_path: Arc::new(folders_path),
    };
    router(state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn root_reports_api_info() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_app(tmp.path().join("registered_folders.json"));

    let response =
        app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["name"], "filex");
}

#[tokio::test]
async fn repositories_endpoint_is_stubbed_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_app(tmp.path().join("registered_folders.json"));

    let response = app
        .oneshot(Request::builder().uri("/api/repositories").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["count"], 0);
    assert_eq!(json["repositories"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn register_folder_rejects_missing_path() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_app(tmp.path().join("registered_folders.json"));

    let body = serde_json::json!({ "path": "/does/not/exist/at/all" }).to_string();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/registered-folders")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn register_folder_rejects_a_file() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("a.txt");
    std::fs::write(&file, "hi").unwrap();
    let app = test_app(tmp.path().join("registered_folders.json"));

    let body = serde_json::json!({ "path": file.to_string_lossy() }).to_string();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/registered-folders")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn index_then_search_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("hello.txt"), "alpha beta gamma").unwrap();
    let app = test_app(tmp.path().join("registered_folders.json"));

    let index_body = serde_json::json!({
        "repo_path": tmp.path().to_string_lossy(),
        "force": false,
        "recursive": true,
    })
    .to_string();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/index")
                .header("content-type", "application/json")
                .body(Body::from(index_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let repo_id = json["repo_id"].as_str().unwrap().to_string();

    // Poll progress until the background job completes.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/progress/{repo_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        if json["status"] == "completed" || json["status"] == "error" {
            assert_eq!(json["status"], "completed");
            break;
        }
        if std::time::Instant::now() > deadline {
            panic!("indexing job never completed");
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let search_body = serde_json::json!({
        "repo_path": tmp.path().to_string_lossy(),
        "query": "alpha beta gamma",
        "top_k": 5,
    })
    .to_string();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/search")
                .header("content-type", "application/json")
                .body(Body::from(search_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let results = json["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results[0]["similarity"].as_f64().unwrap() > 0.99);
}

#[tokio::test]
async fn stats_reports_eligible_files_and_storage() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("a.txt"), "one").unwrap();
    std::fs::write(tmp.path().join("b.bin"), [0u8, 1]).unwrap();
    let app = test_app(tmp.path().join("registered_folders.json"));

    let body = serde_json::json!({ "repo_path": tmp.path().to_string_lossy() }).to_string();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/stats")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["eligible_files"]["total"], 1);
}

#[tokio::test]
async fn progress_for_unknown_repo_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_app(tmp.path().join("registered_folders.json"));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/progress/%2Ftmp%2Fghost%2F.filex")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
