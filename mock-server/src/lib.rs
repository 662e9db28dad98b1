use std::collections::HashMap;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query},
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{debug, info};
use uuid::Uuid;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// What `POST /upload` answers with on success.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub id: Uuid,
    pub file_name: String,
    pub size: usize,
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DelayParams {
    #[serde(default)]
    pub ms: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub delay_ms: u64,
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", get(echo).post(echo))
        .route("/empty", get(empty).post(empty))
        .route("/fail", get(fail).post(fail))
        .route("/fail/bare", get(fail_bare).post(fail_bare))
        .route("/malformed", get(malformed).post(malformed))
        .route("/not-json", get(not_json).post(not_json))
        .route("/status/{code}", get(status).post(status))
        .route("/slow", get(slow))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!("mock server listening on {addr}");
    }
    axum::serve(listener, app()).await
}

pub fn success(data: Value) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

pub fn failure(errors: Value) -> Json<Value> {
    Json(json!({ "success": false, "errors": errors }))
}

async fn echo(method: Method, Query(query): Query<HashMap<String, String>>, body: String) -> Json<Value> {
    let body = serde_json::from_str::<Value>(&body).unwrap_or(Value::Null);
    success(json!({
        "method": method.as_str(),
        "query": query,
        "body": body,
    }))
}

async fn empty() -> Json<Value> {
    Json(json!({ "success": true }))
}

async fn fail() -> Json<Value> {
    failure(json!({ "field": "bad" }))
}

async fn fail_bare() -> Json<Value> {
    Json(json!({ "success": false }))
}

async fn malformed() -> Json<Value> {
    Json(json!({}))
}

async fn not_json() -> &'static str {
    "definitely not json"
}

async fn status(Path(code): Path<u16>) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, success(json!({ "status": status.as_u16() })))
}

async fn slow(Query(params): Query<DelayParams>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(params.ms)).await;
    success(json!({ "waited": params.ms }))
}

async fn upload(
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<Value>, StatusCode> {
    let mut file: Option<(String, usize)> = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                file = Some((file_name, bytes.len()));
            }
            None => {
                let value = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                fields.insert(name, value);
            }
        }
    }

    tokio::time::sleep(Duration::from_millis(params.delay_ms)).await;

    let Some((file_name, size)) = file else {
        return Ok(failure(json!({ "file": "required" })));
    };
    debug!(%file_name, size, "upload received");
    let receipt = UploadReceipt {
        id: Uuid::new_v4(),
        file_name,
        size,
        fields,
    };
    Ok(success(json!(receipt)))
}
