//! Integration tests for the HTTP API.
//!
//! These tests verify route wiring and the orchestrator behaviors reachable
//! without the yt-dlp binary: status lookups, queue partitioning, advisory
//! cancellation, history reads/clears, and input validation.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt;

use vidra::download::task::{MediaType, TaskKind, TaskState};
use vidra::history::{HistoryEntry, HistoryLog};
use vidra::web::{build_router, AppState};

/// State backed by a throwaway history file.
fn test_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::with_history(HistoryLog::new(dir.path().join("history.json")));
    (state, dir)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let (state, _dir) = test_state();
    let app = build_router(state);

    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn status_unknown_task_reports_failure() {
    let (state, _dir) = test_state();
    let app = build_router(state);

    let response = app.oneshot(get_request("/api/status/no-such-task")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn status_returns_record_fields() {
    let (state, _dir) = test_state();

    let id = state
        .registry
        .create("http://example.com/v", TaskKind::Single, MediaType::Video, "best")
        .await;
    state
        .registry
        .update(&id, |r| {
            r.state = TaskState::Downloading;
            r.percent = 33.0;
            r.speed = "1.5 MB/s".to_string();
            r.eta = "0:42".to_string();
            r.title = "Some Video".to_string();
        })
        .await;

    let app = build_router(state);
    let response = app
        .oneshot(get_request(&format!("/api/status/{}", id)))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["status"], "downloading");
    assert_eq!(json["progress"], 33.0);
    assert_eq!(json["speed"], "1.5 MB/s");
    assert_eq!(json["eta"], "0:42");
    assert_eq!(json["title"], "Some Video");
    assert!(json["error"].is_null());
}

#[tokio::test]
async fn download_with_empty_url_creates_no_task() {
    let (state, _dir) = test_state();
    let registry = state.registry.clone();
    let app = build_router(state);

    let response = app
        .oneshot(json_request("POST", "/api/download", serde_json::json!({ "url": "" })))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn download_with_invalid_url_creates_no_task() {
    let (state, _dir) = test_state();
    let registry = state.registry.clone();
    let app = build_router(state);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/download",
            serde_json::json!({ "url": "not a url at all" }),
        ))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn info_with_empty_url_reports_failure() {
    let (state, _dir) = test_state();
    let app = build_router(state);

    let response = app
        .oneshot(json_request("POST", "/api/info", serde_json::json!({ "url": "  " })))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn cancel_flags_non_terminal_task_and_always_succeeds() {
    let (state, _dir) = test_state();
    let registry = state.registry.clone();

    let id = registry
        .create("http://example.com/v", TaskKind::Single, MediaType::Video, "best")
        .await;

    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/cancel/{}", id)))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(registry.get(&id).await.unwrap().state, TaskState::Cancelled);

    // Unknown ids still report success
    let response = app.oneshot(get_request("/api/cancel/who-knows")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn queue_partitions_downloading_from_everything_else() {
    let (state, _dir) = test_state();
    let registry = state.registry.clone();

    let active_id = registry
        .create("http://example.com/active", TaskKind::Single, MediaType::Video, "best")
        .await;
    registry
        .update(&active_id, |r| r.state = TaskState::Downloading)
        .await;

    let done_id = registry
        .create("http://example.com/done", TaskKind::Single, MediaType::Video, "best")
        .await;
    registry.update(&done_id, |r| r.state = TaskState::Completed).await;

    let pending_id = registry
        .create("http://example.com/waiting", TaskKind::Single, MediaType::Audio, "best")
        .await;

    let app = build_router(state);
    let response = app.oneshot(get_request("/api/queue")).await.unwrap();
    let json = body_json(response).await;

    let active = json["queue"]["active"].as_array().unwrap();
    let pending = json["queue"]["pending"].as_array().unwrap();

    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["task_id"], active_id.as_str());

    // Completed and pending tasks both land in "pending"
    assert_eq!(pending.len(), 2);
    let pending_ids: Vec<&str> = pending.iter().map(|i| i["task_id"].as_str().unwrap()).collect();
    assert!(pending_ids.contains(&done_id.as_str()));
    assert!(pending_ids.contains(&pending_id.as_str()));
}

#[tokio::test]
async fn history_roundtrip_and_clear() {
    let (state, _dir) = test_state();

    state
        .history
        .append(HistoryEntry {
            task_id: "t1".to_string(),
            url: "http://example.com/v".to_string(),
            title: "A Video".to_string(),
            media_kind: "video".to_string(),
            filename: "A Video.mp4".to_string(),
            completed_at: Utc::now(),
            size: Some(2048),
            items: None,
        })
        .await
        .unwrap();

    let app = build_router(state);

    let response = app.clone().oneshot(get_request("/api/history")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["history"].as_array().unwrap().len(), 1);
    assert_eq!(json["history"][0]["type"], "video");
    assert_eq!(json["history"][0]["title"], "A Video");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/history")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["success"], true);

    let response = app.oneshot(get_request("/api/history")).await.unwrap();
    let json = body_json(response).await;
    assert!(json["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn fetching_incomplete_download_returns_404() {
    let (state, _dir) = test_state();
    let registry = state.registry.clone();

    let id = registry
        .create("http://example.com/v", TaskKind::Single, MediaType::Video, "best")
        .await;
    registry.update(&id, |r| r.state = TaskState::Downloading).await;

    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/download/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get_request("/download/unknown")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn fetching_completed_download_streams_the_file() {
    let (state, dir) = test_state();
    let registry = state.registry.clone();

    let file_path = dir.path().join("My Video.mp4");
    std::fs::write(&file_path, b"fake media bytes").unwrap();

    let id = registry
        .create("http://example.com/v", TaskKind::Single, MediaType::Video, "best")
        .await;
    registry
        .update(&id, |r| {
            r.state = TaskState::Completed;
            r.percent = 100.0;
            r.output_path = Some(file_path.to_string_lossy().into_owned());
        })
        .await;

    let app = build_router(state);
    let response = app.oneshot(get_request(&format!("/download/{}", id))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("attachment"));
    assert!(disposition.contains("My Video.mp4"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"fake media bytes");
}

#[tokio::test]
async fn concurrent_downloads_register_distinct_tasks() {
    let (state, _dir) = test_state();
    let registry = state.registry.clone();

    let mut handles = Vec::new();
    for i in 0..16 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .create(
                    &format!("http://example.com/{}", i),
                    TaskKind::Single,
                    MediaType::Video,
                    "best",
                )
                .await
        }));
    }

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }

    assert_eq!(ids.len(), 16);
    assert_eq!(registry.len().await, 16);
}
