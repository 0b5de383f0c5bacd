use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::{json, Value};
use sketchcalc_core::{analyze_image, Image, VariableAssignments};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::AppState;

// ── Error helper ──────────────────────────────────────────────────────────

type ApiError = (StatusCode, Json<Value>);

pub(crate) fn error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    if status.is_server_error() {
        tracing::error!("{status}: {message}");
    } else {
        tracing::warn!("{status}: {message}");
    }
    (
        status,
        Json(json!({ "status": "error", "message": message.to_string() })),
    )
}

// ── Request body types ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(crate) struct CalculateBody {
    /// Data URL (`data:image/png;base64,...`) or bare base64.
    pub image: String,
    #[serde(default, alias = "dictOfVars")]
    pub dict_of_vars: Option<VariableAssignments>,
}

// ── Image decoding ────────────────────────────────────────────────────────

const DEFAULT_MIME: &str = "image/png";

/// Room left in the request body for the data-URL prefix, `dict_of_vars`
/// and JSON framing.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Largest JSON body that can carry an image of `max_image_bytes` once it is
/// base64-encoded.
pub(crate) fn body_limit(max_image_bytes: usize) -> usize {
    max_image_bytes
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(BODY_OVERHEAD_BYTES)
}

/// Decode the request's image string into bytes plus MIME type.
pub(crate) fn decode_image(encoded: &str) -> Result<Image, String> {
    let encoded = encoded.trim();
    let (mime, payload) = match encoded.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| "data URL has no ',' separator".to_string())?;
            let mime = meta.strip_suffix(";base64").ok_or_else(|| {
                "data URL is not base64-encoded".to_string()
            })?;
            let mime = if mime.is_empty() { DEFAULT_MIME } else { mime };
            (mime, data)
        },
        None => (DEFAULT_MIME, encoded),
    };

    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(cleaned)
        .map_err(|e| format!("invalid base64 image: {e}"))?;
    if bytes.is_empty() {
        return Err("image is empty".into());
    }
    Ok(Image::new(bytes, mime))
}

// ── Handlers ──────────────────────────────────────────────────────────────

pub(crate) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn calculate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CalculateBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(|rejection| error(rejection.status(), rejection.body_text()))?;
    let image = decode_image(&body.image).map_err(|e| error(StatusCode::BAD_REQUEST, e))?;

    // Upstream errors stay in the log; callers get a fixed message
    let records = analyze_image(state.backend.as_ref(), &image, body.dict_of_vars.as_ref())
        .await
        .map_err(|e| {
            tracing::error!(
                backend = state.backend.name(),
                error = %format!("{e:#}"),
                "analysis failed"
            );
            error(StatusCode::BAD_GATEWAY, "vision backend call failed")
        })?;

    info!(records = records.len(), "calculate done");

    Ok(Json(json!({
        "message": "Image processed",
        "data": records,
        "status": "success",
    })))
}

pub(crate) fn router(state: Arc<AppState>, max_image_bytes: usize) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/calculate", post(calculate))
        .layer(DefaultBodyLimit::max(body_limit(max_image_bytes)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use sketchcalc_core::agent::VisionBackend;
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct Canned {
        reply: Option<&'static str>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VisionBackend for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, prompt: &str, _image: &Image) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.reply {
                Some(r) => Ok(r.to_string()),
                None => bail!("upstream unavailable"),
            }
        }
    }

    fn app(reply: Option<&'static str>) -> Router {
        let state = Arc::new(AppState {
            backend: Arc::new(Canned {
                reply,
                prompts: Mutex::new(Vec::new()),
            }),
        });
        router(state, 1024 * 1024)
    }

    async fn post_json(app: Router, body: Value) -> (StatusCode, Value) {
        post_raw(app, body.to_string()).await
    }

    async fn post_raw(app: Router, body: String) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/calculate")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    const PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[test]
    fn decode_data_url() {
        let img = decode_image("data:image/jpeg;base64,YWJj").unwrap();
        assert_eq!(img.mime_type, "image/jpeg");
        assert_eq!(img.bytes, b"abc");
    }

    #[test]
    fn decode_bare_base64_defaults_to_png() {
        let img = decode_image("YW Jj\n").unwrap();
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.bytes, b"abc");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_image("data:image/png;base64,@@@").is_err());
        assert!(decode_image("data:image/png,plain").is_err());
        assert!(decode_image("data:image/png;base64").is_err());
        assert!(decode_image("").is_err());
    }

    #[test]
    fn body_accepts_both_var_spellings() {
        let a: CalculateBody =
            serde_json::from_value(json!({"image": "x", "dict_of_vars": {"x": 1}})).unwrap();
        let b: CalculateBody =
            serde_json::from_value(json!({"image": "x", "dictOfVars": {"x": 1}})).unwrap();
        let c: CalculateBody = serde_json::from_value(json!({"image": "x"})).unwrap();
        assert_eq!(a.dict_of_vars, b.dict_of_vars);
        assert!(c.dict_of_vars.is_none());
    }

    #[tokio::test]
    async fn health_ok() {
        let app = app(Some("[]"));
        let req = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn calculate_wraps_records() {
        let app = app(Some(r#"[{"expr": "x", "result": 4, "assign": true}]"#));
        let (status, body) = post_json(
            app,
            json!({"image": PNG_DATA_URL, "dictOfVars": {"y": 2}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Image processed");
        assert_eq!(body["data"], json!([{"expr": "x", "result": 4, "assign": true}]));
    }

    #[tokio::test]
    async fn calculate_forwards_vars_to_prompt() {
        let canned = Arc::new(Canned {
            reply: Some("[]"),
            prompts: Mutex::new(Vec::new()),
        });
        let state = Arc::new(AppState {
            backend: canned.clone(),
        });
        let (status, _) = post_json(
            router(state, 1024 * 1024),
            json!({"image": PNG_DATA_URL, "dict_of_vars": {"y": 2}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let prompts = canned.prompts.lock().unwrap();
        assert!(prompts[0].contains(r#"{"y":2}"#));
    }

    #[tokio::test]
    async fn calculate_unparseable_reply_is_empty_success() {
        let app = app(Some("I can't read that."));
        let (status, body) = post_json(app, json!({"image": PNG_DATA_URL})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn calculate_bad_image_is_400() {
        let app = app(Some("[]"));
        let (status, body) = post_json(app, json!({"image": "data:image/png;base64,!!"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn calculate_backend_failure_is_502() {
        let app = app(None);
        let (status, body) = post_json(app, json!({"image": PNG_DATA_URL})).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "vision backend call failed");
    }

    #[tokio::test]
    async fn calculate_missing_image_uses_error_envelope() {
        let (status, body) = post_json(app(Some("[]")), json!({"dictOfVars": {}})).await;
        assert!(status.is_client_error(), "{status}");
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("image"));
    }

    #[tokio::test]
    async fn calculate_malformed_json_uses_error_envelope() {
        let (status, body) = post_raw(app(Some("[]")), "{\"image\": ".into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[test]
    fn body_limit_fits_base64_image() {
        let limit = body_limit(3 * 1024);
        assert_eq!(limit, 4 * 1024 + BODY_OVERHEAD_BYTES);
        assert_eq!(body_limit(usize::MAX), usize::MAX);
    }

    #[tokio::test]
    async fn calculate_accepts_image_at_limit() {
        let max_image = 256 * 1024;
        let state = Arc::new(AppState {
            backend: Arc::new(Canned {
                reply: Some("[]"),
                prompts: Mutex::new(Vec::new()),
            }),
        });
        let data = STANDARD.encode(vec![7u8; max_image]);
        let (status, _) = post_json(
            router(state, max_image),
            json!({"image": format!("data:image/png;base64,{data}")}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn calculate_oversize_body_is_413() {
        let max_image = 1024;
        let data = STANDARD.encode(vec![7u8; body_limit(max_image)]);
        let (status, body) = post_json(
            router(
                Arc::new(AppState {
                    backend: Arc::new(Canned {
                        reply: Some("[]"),
                        prompts: Mutex::new(Vec::new()),
                    }),
                }),
                max_image,
            ),
            json!({"image": data}),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["status"], "error");
    }
}
