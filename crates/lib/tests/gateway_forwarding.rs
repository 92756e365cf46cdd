//! Integration tests: a fake backend on a loopback port, the gateway in front of it, and the
//! upload manager / chat session talking to the gateway over real HTTP.
//! Server tasks are left running when each test ends.

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use regnav::chat::{ChatSession, Role};
use regnav::client::ApiClient;
use regnav::config::{ClientConfig, Config};
use regnav::gateway::{self, GatewayState};
use regnav::upload::{FileHandle, UploadManager, UploadStatus};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

#[derive(Debug, Clone)]
struct RecordedPart {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    len: usize,
}

/// What the fake backend saw.
#[derive(Clone, Default)]
struct Recorded {
    headers: Arc<Mutex<Vec<HeaderMap>>>,
    chat_bodies: Arc<Mutex<Vec<Value>>>,
    parts: Arc<Mutex<Vec<RecordedPart>>>,
}

async fn backend_chat(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    rec.headers.lock().unwrap().push(headers);
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    rec.chat_bodies.lock().unwrap().push(body.clone());
    match body.get("query").and_then(Value::as_str) {
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Missing query parameter"})),
        ),
        Some("fail") => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "backend unavailable"})),
        ),
        Some("sources") => (
            StatusCode::OK,
            Json(json!({"data": {"answer": "See section 4.", "sources": ["doc1.pdf"]}})),
        ),
        Some(_) => (
            StatusCode::OK,
            Json(json!({"status_code": 200, "data": "Seven years.", "success": true})),
        ),
    }
}

async fn backend_upload(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    rec.headers.lock().unwrap().push(headers);
    let mut rejected = false;
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let len = field.bytes().await.unwrap().len();
        rejected |= file_name.as_deref() == Some("reject.pdf");
        rec.parts.lock().unwrap().push(RecordedPart {
            name,
            file_name,
            content_type,
            len,
        });
    }
    if rejected {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "could not index document"})),
        )
    } else {
        (StatusCode::OK, Json(json!({"message": "indexed"})))
    }
}

async fn spawn_backend() -> (SocketAddr, Recorded) {
    let rec = Recorded::default();
    let app = Router::new()
        .route("/api/v1/chat", post(backend_chat))
        .route("/api/v1/upload", post(backend_upload))
        .with_state(rec.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, rec)
}

fn gateway_config(backend_url: String) -> Config {
    let mut config = Config::default();
    config.backend.server_url = backend_url;
    config.backend.timeout_secs = 5;
    config
}

/// Serve the gateway router on an ephemeral port; returns its base URL.
async fn spawn_gateway(config: Config) -> String {
    let app = gateway::router(GatewayState::new(config));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

async fn gateway_with_backend() -> (String, Recorded) {
    let (backend, rec) = spawn_backend().await;
    let base = spawn_gateway(gateway_config(format!("http://{}", backend))).await;
    (base, rec)
}

fn client_config(base_url: &str) -> ClientConfig {
    ClientConfig {
        base_url: base_url.to_string(),
        upload_timeout_secs: 5,
        chat_timeout_secs: 5,
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let port = free_port();
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();

    let gateway_handle = tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
                assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
                assert!(json.get("backend").is_none());
                gateway_handle.abort();
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    gateway_handle.abort();
    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        url, last_err
    );
}

#[tokio::test]
async fn chat_is_forwarded_with_whitelisted_headers_and_unwrapped() {
    let (base, rec) = gateway_with_backend().await;

    let res = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .header("authorization", "Bearer token-1")
        .header("cookie", "session=abc")
        .header("x-request-source", "test")
        .json(&json!({"query": "How long are records kept?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!("Seven years."));

    let headers = rec.headers.lock().unwrap()[0].clone();
    assert_eq!(headers.get("authorization").unwrap(), "Bearer token-1");
    assert_eq!(headers.get("cookie").unwrap(), "session=abc");
    assert!(headers.get("x-request-source").is_none());
    assert_eq!(
        rec.chat_bodies.lock().unwrap()[0],
        json!({"query": "How long are records kept?"})
    );
}

#[tokio::test]
async fn chat_errors_are_normalized() {
    let (base, _rec) = gateway_with_backend().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/chat", base))
        .json(&json!({"query": "fail"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(
        res.json::<Value>().await.unwrap(),
        json!({"error": "backend unavailable"})
    );

    let res = client
        .post(format!("{}/api/chat", base))
        .header("content-type", "text/plain")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert_eq!(
        res.json::<Value>().await.unwrap(),
        json!({"error": "Missing query parameter"})
    );
}

#[tokio::test]
async fn malformed_chat_body_is_forwarded_as_empty_object() {
    let (base, rec) = gateway_with_backend().await;
    let _ = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .body("{broken")
        .send()
        .await
        .unwrap();
    assert_eq!(rec.chat_bodies.lock().unwrap()[0], json!({}));
}

#[tokio::test]
async fn unreachable_backend_is_a_500_with_error() {
    let base = spawn_gateway(gateway_config(format!("http://127.0.0.1:{}", free_port()))).await;
    let res = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({"query": "anyone there?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    let body: Value = res.json().await.unwrap();
    let message = body.get("error").and_then(Value::as_str).unwrap_or_default();
    assert!(!message.is_empty());
}

#[tokio::test]
async fn upload_manager_through_gateway_succeeds() {
    let (base, rec) = gateway_with_backend().await;
    let client = ApiClient::new(Some(base.clone()));
    let manager = UploadManager::from_config(Arc::new(client), &client_config(&base));

    let content = vec![7u8; 200 * 1024];
    let ids = manager.submit([FileHandle::new("policy.pdf", "application/pdf", content.clone())]);
    assert_eq!(ids.len(), 1);
    manager.settled().await;

    let task = manager.task(ids[0]).unwrap();
    assert_eq!(task.status, UploadStatus::Success);
    assert_eq!(task.progress, 100);
    assert!(!task.has_payload());

    let parts = rec.parts.lock().unwrap().clone();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].name, "file");
    assert_eq!(parts[0].file_name.as_deref(), Some("policy.pdf"));
    assert_eq!(parts[0].content_type.as_deref(), Some("application/pdf"));
    assert_eq!(parts[0].len, content.len());
}

#[tokio::test]
async fn rejected_upload_ends_in_error_without_affecting_others() {
    let (base, _rec) = gateway_with_backend().await;
    let client = ApiClient::new(Some(base.clone()));
    let manager = UploadManager::from_config(Arc::new(client), &client_config(&base));

    let ids = manager.submit([
        FileHandle::new("reject.pdf", "application/pdf", vec![1u8; 1024]),
        FileHandle::new("keep.pdf", "application/pdf", vec![2u8; 1024]),
    ]);
    manager.settled().await;

    let rejected = manager.task(ids[0]).unwrap();
    let kept = manager.task(ids[1]).unwrap();
    assert_eq!(rejected.status, UploadStatus::Error);
    assert!(rejected.has_payload());
    assert_eq!(kept.status, UploadStatus::Success);
}

#[tokio::test]
async fn chat_session_through_gateway() {
    let (base, _rec) = gateway_with_backend().await;
    let client = ApiClient::new(Some(base.clone()));
    let session = ChatSession::new(Arc::new(client), &client_config(&base));

    let answer = session.send("What is the retention period?").await.unwrap();
    assert_eq!(answer.role, Role::Assistant);
    assert_eq!(answer.content, "Seven years.");

    let answer = session.send("sources").await.unwrap();
    assert_eq!(answer.content, "See section 4.");
    assert_eq!(answer.sources, Some(vec!["doc1.pdf".to_string()]));

    let failed = session.send("fail").await.unwrap();
    assert_eq!(failed.content, "backend unavailable");

    assert_eq!(session.transcript().len(), 7);
    assert!(!session.is_busy());
}

#[tokio::test]
async fn file_parts_are_forwarded_as_file() {
    let (base, rec) = gateway_with_backend().await;
    let part = reqwest::multipart::Part::bytes(vec![3u8; 512])
        .file_name("policy.pdf")
        .mime_str("application/pdf")
        .unwrap();
    let form = reqwest::multipart::Form::new()
        .text("note", "quarterly")
        .part("document", part);
    let res = reqwest::Client::new()
        .post(format!("{}/api/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let parts = rec.parts.lock().unwrap().clone();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name, "note");
    assert_eq!(parts[0].file_name, None);
    assert_eq!(parts[1].name, "file");
    assert_eq!(parts[1].file_name.as_deref(), Some("policy.pdf"));
    assert_eq!(parts[1].len, 512);
}
