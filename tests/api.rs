use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use docfield::config::{Config, DbConfig, LlmConfig, ServerConfig};
use docfield::db;
use docfield::llm::Analyzer;
use docfield::migrate;
use docfield::server::build_router;
use docfield::store::RecordStore;

struct CannedAnalyzer(&'static str);

#[async_trait]
impl Analyzer for CannedAnalyzer {
    fn model_name(&self) -> &str {
        "canned"
    }

    async fn analyze(&self, _text: &str) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }
}

async fn test_app(analyzer_output: &'static str) -> (TempDir, Router) {
    let tmp = TempDir::new().unwrap();
    let cfg = Config {
        db: DbConfig {
            path: tmp.path().join("docfield.sqlite"),
        },
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            max_upload_bytes: 1024 * 1024,
        },
        llm: LlmConfig {
            provider: "ollama".to_string(),
            model: Some("test-model".to_string()),
            url: None,
            prompt: "extract fields".to_string(),
            timeout_secs: 5,
            max_retries: 0,
        },
    };
    migrate::run_migrations(&cfg).await.unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    let store = RecordStore::new(pool);
    let analyzer: Arc<dyn Analyzer> = Arc::new(CannedAnalyzer(analyzer_output));
    (tmp, build_router(store, analyzer))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

const BOUNDARY: &str = "docfield-test-boundary";

fn upload_request(files: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (file_name, content) in files {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: text/plain\r\n\r\n{}\r\n",
            BOUNDARY, file_name, content
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    Request::builder()
        .method("POST")
        .uri("/upload/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Polls the batch endpoint until the background pipeline has persisted
/// `expected` records for the request.
async fn wait_for_records(app: &Router, request_id: &str, expected: usize) -> Value {
    for _ in 0..200 {
        let (status, body) = get(app, &format!("/requests/{}", request_id)).await;
        if status == StatusCode::OK && body.as_array().map(|a| a.len()) == Some(expected) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("records for {} never appeared", request_id);
}

#[tokio::test]
async fn health_reports_ok() {
    let (_tmp, app) = test_app("{}").await;
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn upload_acknowledges_then_persists_in_background() {
    let (_tmp, app) = test_app(r#"Extracted: {"invoice": {"number": "INV-1", "total": 12.5}}"#).await;

    let (status, body) = send(&app, upload_request(&[("invoice.txt", "Invoice INV-1")])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "1 files uploaded. Processing will happen asynchronously."
    );
    let request_id = body["request_id"].as_str().unwrap().to_string();
    assert!(!request_id.is_empty());
    assert_eq!(body["file_info"][0]["file_name"], "invoice.txt");
    assert!(!body["file_info"][0]["file_id"].as_str().unwrap().is_empty());
    // Display format: dd-mm-YYYY HH:MM:SS
    let shown = body["file_info"][0]["upload_time"].as_str().unwrap();
    assert_eq!(shown.len(), 19);
    assert_eq!(&shown[2..3], "-");

    let records = wait_for_records(&app, &request_id, 1).await;
    assert_eq!(records[0]["file_name"], "invoice.txt");
    assert_eq!(records[0]["json_data"]["invoice.number"], "INV-1");
    assert_eq!(records[0]["json_data"]["invoice.total"], 12.5);
    assert_eq!(records[0]["update_count"], 0);

    let (status, listing) = get(&app, "/files/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn batch_summary_reports_task_counts() {
    let (_tmp, app) = test_app(r#"{"kind": "note"}"#).await;

    let (_, body) = send(
        &app,
        upload_request(&[("one.txt", "first"), ("two.txt", "second")]),
    )
    .await;
    let request_id = body["request_id"].as_str().unwrap().to_string();
    wait_for_records(&app, &request_id, 2).await;

    let (status, summaries) = get(&app, "/requests/").await;
    assert_eq!(status, StatusCode::OK);
    let summary = summaries
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["request_id"] == request_id.as_str())
        .unwrap();
    assert_eq!(summary["file_count"], 2);
    assert_eq!(summary["succeeded_count"], 2);
    assert_eq!(summary["failed_count"], 0);
    assert_eq!(summary["total_update_count"], 0);
}

#[tokio::test]
async fn failed_ingestion_still_counts_toward_the_batch() {
    // The model output has no JSON object, so every file fails and nothing
    // persists — but the batch summary still reports the upload.
    let (_tmp, app) = test_app("nothing structured in here").await;

    let (_, body) = send(&app, upload_request(&[("memo.txt", "memo body")])).await;
    let request_id = body["request_id"].as_str().unwrap().to_string();

    for _ in 0..200 {
        let (_, summaries) = get(&app, "/requests/").await;
        if let Some(summary) = summaries
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["request_id"] == request_id.as_str())
        {
            if summary["failed_count"] == 1 {
                assert_eq!(summary["file_count"], 1);
                assert_eq!(summary["succeeded_count"], 0);
                // The failed file never shows up in the batch listing.
                let (status, _) = get(&app, &format!("/requests/{}", request_id)).await;
                assert_eq!(status, StatusCode::NOT_FOUND);
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("ingestion failure never became visible in the summary");
}

#[tokio::test]
async fn unknown_request_is_404() {
    let (_tmp, app) = test_app("{}").await;
    let (status, _) = get(&app, "/requests/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_file_is_404() {
    let (_tmp, app) = test_app("{}").await;
    let (status, _) = get(&app, "/file/424242").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn put_upserts_then_tracks_the_diff() {
    let (_tmp, app) = test_app("{}").await;

    // Upsert path: no existing record, so a fresh row is created and the
    // returned diff is empty.
    let (status, body) = send_json(&app, "PUT", "/file/777", json!({"x": 1, "y": 2})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "JSON data updated successfully");
    assert_eq!(body["updated_data"], json!({"x": 1, "y": 2}));
    assert_eq!(body["diff"]["added"], json!({}));
    assert_eq!(body["diff"]["changed"], json!({}));

    // The new row got an auto id, not 777.
    let (status, record) = get(&app, "/file/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["file_name"], "file_777");
    assert_eq!(record["update_count"], 0);

    // Update path: same row, diff reflects the transition.
    let (status, body) = send_json(&app, "PUT", "/file/1", json!({"x": 1, "y": 3, "z": 4})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["diff"]["added"]["z"], 4);
    assert_eq!(body["diff"]["changed"]["y"]["old"], 2);
    assert_eq!(body["diff"]["changed"]["y"]["new"], 3);

    let (_, record) = get(&app, "/file/1").await;
    assert_eq!(record["update_count"], 1);
    assert_eq!(record["json_data"], json!({"x": 1, "y": 3, "z": 4}));
    assert_eq!(record["diff_data"]["added"]["z"], 4);
}

#[tokio::test]
async fn put_rejects_non_object_bodies() {
    let (_tmp, app) = test_app("{}").await;
    let (status, _) = send_json(&app, "PUT", "/file/1", json!([1, 2, 3])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_reports_success_even_for_missing_ids() {
    let (_tmp, app) = test_app("{}").await;

    send_json(&app, "PUT", "/file/5", json!({"a": 1})).await;

    let (status, body) =
        send_json(&app, "DELETE", "/delete/", json!({"file_ids": [1, 99999]})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Selected files deleted successfully");

    let (status, _) = get(&app, "/file/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
