//! HTTP routes.
//!
//! | Route | Effect |
//! |---|---|
//! | `GET /health` | `{"ok": true, "stored": [robot ids]}` |
//! | `POST /upload/:robot_id` | Multipart `image` field (JPEG/PNG, size-capped) → snapshot store |
//! | `POST /brain/:robot_id` | Optional `{"status": ...}` body → [`PlanResponse`] |
//!
//! Upload and brain require the `x-api-key` header when a proxy key is
//! configured.

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use butler_runtime::PlanRelay;
use butler_types::{ImageEncoding, PlanResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Largest accepted image, in bytes.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1_500_000;

/// Slack on top of the image cap for multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything a handler needs; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    relay: PlanRelay,
    api_key: Option<Arc<str>>,
    max_upload_bytes: usize,
}

impl AppState {
    /// Open access (no proxy key) with the default upload cap.
    pub fn new(relay: PlanRelay) -> Self {
        Self {
            relay,
            api_key: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Require `key` in the [`API_KEY_HEADER`].  `None` or an empty key
    /// leaves the routes open.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.is_empty()).map(Arc::from);
        self
    }

    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Boundary rejections.  Planning itself never produces one of these.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad API key")]
    Unauthorized,
    #[error("Send JPEG/PNG (got {0:?})")]
    UnsupportedMediaType(String),
    #[error("Image too large ({size} > {limit} bytes)")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("Missing multipart field 'image'")]
    MissingImage,
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::MissingImage => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorBody { detail: self.to_string() })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub ok: bool,
    pub stored: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadAck {
    pub ok: bool,
    pub size: usize,
}

/// Robot's self-reported state sent with a planning poll.
#[derive(Debug, Default, Deserialize)]
pub struct BrainRequest {
    #[serde(default)]
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the relay's router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    let guarded = Router::new()
        .route("/upload/:robot_id", post(upload))
        .route("/brain/:robot_id", post(brain))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .merge(guarded)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(log_http_request))
        .with_state(state)
}

async fn log_http_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;
    info!(method = %method, uri = %uri, status = %response.status(), "http request");
    response
}

async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.api_key {
        let provided = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_ref()) {
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(req).await)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        ok: true,
        stored: state.relay.store().robot_ids(),
    })
}

async fn upload(
    State(state): State<AppState>,
    Path(robot_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadAck>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let encoding = ImageEncoding::from_mime(&content_type)
            .ok_or(ApiError::UnsupportedMediaType(content_type))?;

        let data = field.bytes().await?;
        if data.len() > state.max_upload_bytes {
            return Err(ApiError::PayloadTooLarge {
                size: data.len(),
                limit: state.max_upload_bytes,
            });
        }

        let size = data.len();
        state.relay.store().put(&robot_id, data, encoding, Utc::now());
        info!(robot_id = %robot_id, size, encoding = encoding.mime(), "snapshot uploaded");
        return Ok(Json(UploadAck { ok: true, size }));
    }
    Err(ApiError::MissingImage)
}

async fn brain(
    State(state): State<AppState>,
    Path(robot_id): Path<String>,
    body: Option<Json<BrainRequest>>,
) -> Json<PlanResponse> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let response = state
        .relay
        .plan_for(&robot_id, request.status.as_deref(), Utc::now())
        .await;
    Json(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request as HttpRequest, header};
    use butler_memory::SnapshotStore;
    use butler_runtime::{CommandValidator, OracleError, PlanOracle};
    use butler_types::{LimitTable, RawPlan, SnapshotEntry};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const BOUNDARY: &str = "butlerboundary";

    struct CannedOracle {
        answer: Value,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlanOracle for CannedOracle {
        async fn plan(&self, _snapshot: &SnapshotEntry) -> Result<RawPlan, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawPlan(self.answer.clone()))
        }
    }

    fn app(api_key: Option<&str>) -> (Router, Arc<CannedOracle>) {
        let oracle = Arc::new(CannedOracle {
            answer: json!({"cmds": [["MOVE", 200, 50, 60, 0, 1, 500], ["FOO"]]}),
            calls: AtomicUsize::new(0),
        });
        let relay = PlanRelay::new(
            Arc::new(SnapshotStore::new()),
            oracle.clone(),
            CommandValidator::new(LimitTable::default()).unwrap(),
        );
        let state = AppState::new(relay)
            .with_api_key(api_key.map(str::to_string))
            .with_max_upload_bytes(1024);
        (router(state), oracle)
    }

    fn multipart_body(field: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"desk\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(robot: &str, body: Vec<u8>, key: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::post(format!("/upload/{robot}")).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(k) = key {
            builder = builder.header(API_KEY_HEADER, k);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn brain_request(robot: &str, key: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::post(format!("/brain/{robot}"))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(k) = key {
            builder = builder.header(API_KEY_HEADER, k);
        }
        builder.body(Body::from(r#"{"status":"idle"}"#)).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_lists_stored_robots() {
        let (app, _) = app(Some("secret"));
        let response = app
            .clone()
            .oneshot(upload_request(
                "desk-1",
                multipart_body("image", "image/jpeg", b"\xff\xd8\xff"),
                Some("secret"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"ok": true, "stored": ["desk-1"]}));
    }

    #[tokio::test]
    async fn upload_then_brain_returns_validated_plan() {
        let (app, oracle) = app(None);
        let response = app
            .clone()
            .oneshot(upload_request(
                "desk-1",
                multipart_body("image", "image/png", b"\x89PNG"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"ok": true, "size": 4}));

        let response = app.oneshot(brain_request("desk-1", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"cmds": [["MOVE", 150.0, 50.0, 60.0, 0.0, 1, 1000]]})
        );
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn brain_without_snapshot_is_idle() {
        let (app, oracle) = app(None);
        let response = app.oneshot(brain_request("desk-9", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"cmds": []}));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn brain_accepts_missing_body() {
        let (app, _) = app(None);
        let response = app
            .oneshot(HttpRequest::post("/brain/desk-1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"cmds": []}));
    }

    #[tokio::test]
    async fn wrong_or_missing_key_is_rejected() {
        let (app, _) = app(Some("secret"));
        let response = app
            .clone()
            .oneshot(brain_request("desk-1", Some("guess")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await, json!({"detail": "Bad API key"}));

        let response = app
            .oneshot(upload_request(
                "desk-1",
                multipart_body("image", "image/jpeg", b"\xff\xd8"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_is_open_even_with_key() {
        let (app, _) = app(Some("secret"));
        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn non_image_upload_is_unsupported() {
        let (app, _) = app(None);
        let response = app
            .oneshot(upload_request(
                "desk-1",
                multipart_body("image", "image/gif", b"GIF89a"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let (app, _) = app(None);
        let response = app
            .clone()
            .oneshot(upload_request(
                "desk-1",
                multipart_body("image", "image/jpeg", &[0u8; 2048]),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({"ok": true, "stored": []}));
    }

    #[tokio::test]
    async fn upload_without_image_field_is_bad_request() {
        let (app, _) = app(None);
        let response = app
            .oneshot(upload_request(
                "desk-1",
                multipart_body("photo", "image/jpeg", b"\xff\xd8"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn empty_api_key_leaves_routes_open() {
        let relay = PlanRelay::new(
            Arc::new(SnapshotStore::new()),
            Arc::new(CannedOracle {
                answer: json!({}),
                calls: AtomicUsize::new(0),
            }),
            CommandValidator::default(),
        );
        let state = AppState::new(relay).with_api_key(Some(String::new()));
        assert!(state.api_key.is_none());
    }
}
