//! HTTP routing: validation and dispatch to the two pipelines.
//!
//! | Method | Path             | Handler              |
//! |--------|------------------|----------------------|
//! | GET    | `/health`        | [`health_handler`]   |
//! | POST   | `/api/convert`   | [`convert_handler`]  |
//! | POST   | `/api/recognize` | [`recognize_handler`]|
//!
//! Every [`ServiceError`] is turned into a status code and a JSON body here.
//! The conversion route answers `{error, details}`, the recognition route
//! `{success: false, message}`, matching what each route's clients expect.
//!
//! Pipeline calls run on their own tokio task. A client that hangs up does
//! not cancel a conversion half-way, and a panic inside a pipeline comes
//! back as a 500 instead of tearing down the connection.

use crate::config::{ServiceConfig, SERVICE_NAME};
use crate::error::ServiceError;
use crate::pipeline::convert::ConversionPipeline;
use crate::pipeline::recognize::{
    RecognitionClient, RecognitionMode, RecognitionRequest, RecognitionResult, VisionApi,
};
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// MIME type of the converted document.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// File name offered to the client for the converted document.
pub const DOCX_FILENAME: &str = "converted_document.docx";

/// Extra room on top of the image limit for multipart framing and form fields.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub converter: Arc<ConversionPipeline>,
    pub recognizer: Arc<RecognitionClient>,
}

impl AppState {
    /// State with an explicit vision transport (a stub in tests).
    pub fn new(config: Arc<ServiceConfig>, api: Arc<dyn VisionApi>) -> Self {
        Self {
            converter: Arc::new(ConversionPipeline::new(Arc::clone(&config))),
            recognizer: Arc::new(RecognitionClient::new(Arc::clone(&config), api)),
            config,
        }
    }

    /// State talking to the configured vision endpoint over HTTP.
    pub fn from_config(config: Arc<ServiceConfig>) -> Result<Self, ServiceError> {
        let recognizer = RecognitionClient::from_config(Arc::clone(&config))?;
        Ok(Self {
            converter: Arc::new(ConversionPipeline::new(Arc::clone(&config))),
            recognizer: Arc::new(recognizer),
            config,
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let body_limit = state
        .config
        .max_image_bytes
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/convert", post(convert_handler))
        .route("/api/recognize", post(recognize_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}

// ── Health ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            service: SERVICE_NAME,
        }),
    )
}

// ── Convert ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ConvertRequest {
    markdown: Option<String>,
}

#[derive(Serialize)]
pub struct ConvertErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[tracing::instrument(skip_all)]
pub async fn convert_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if !is_json(&headers) {
        return convert_error(ServiceError::UnsupportedMediaType(
            "Request must be JSON".into(),
        ));
    }

    let body = match body {
        Ok(body) => body,
        Err(rejection) => return convert_error(body_rejection(rejection)),
    };

    let markdown = match parse_markdown(&body) {
        Ok(markdown) => markdown,
        Err(e) => return convert_error(e),
    };

    let converter = Arc::clone(&state.converter);
    let result = tokio::spawn(async move { converter.convert(&markdown).await }).await;

    match joined(result) {
        Ok(document) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, DOCX_MIME.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{DOCX_FILENAME}\""),
                ),
            ],
            document,
        )
            .into_response(),
        Err(e) => convert_error(e),
    }
}

/// `application/json` or any `application/*+json` media type.
fn is_json(headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let mime = value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

fn parse_markdown(body: &[u8]) -> Result<String, ServiceError> {
    let request: ConvertRequest = serde_json::from_slice(body)
        .map_err(|e| ServiceError::Validation(format!("Invalid JSON body: {e}")))?;
    match request.markdown {
        Some(markdown) if !markdown.is_empty() => Ok(markdown),
        _ => Err(ServiceError::Validation(
            "Missing 'markdown' key in request body".into(),
        )),
    }
}

fn body_rejection(rejection: BytesRejection) -> ServiceError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge(format!("Request body is too large: {rejection}"))
    } else {
        ServiceError::Validation(format!("Failed to read request body: {rejection}"))
    }
}

fn convert_error(e: ServiceError) -> Response {
    let status = status_of(&e);
    if status.is_server_error() {
        tracing::error!(error = %e, retryable = e.is_retryable(), "Conversion request failed");
    } else {
        tracing::warn!(error = %e, "Conversion request rejected");
    }
    let details = match e {
        ServiceError::Conversion { ref details, .. } => details.clone(),
        _ => None,
    };
    (
        status,
        Json(ConvertErrorBody {
            error: e.to_string(),
            details,
        }),
    )
        .into_response()
}

// ── Recognize ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RecognizeResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: RecognitionResult,
}

#[derive(Serialize)]
pub struct RecognizeErrorBody {
    pub success: bool,
    pub message: String,
}

#[tracing::instrument(skip_all)]
pub async fn recognize_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request = match multipart {
        Ok(multipart) => match read_recognition_form(multipart).await {
            Ok(request) => request,
            Err(e) => return recognize_error(e),
        },
        Err(rejection) => {
            return recognize_error(ServiceError::Validation(format!(
                "Expected a multipart upload: {rejection}"
            )))
        }
    };

    let recognizer = Arc::clone(&state.recognizer);
    let result = tokio::spawn(async move { recognizer.recognize(&request).await }).await;

    match joined(result) {
        Ok(result) => (
            StatusCode::OK,
            Json(RecognizeResponse {
                success: true,
                result,
            }),
        )
            .into_response(),
        Err(e) => recognize_error(e),
    }
}

async fn read_recognition_form(mut multipart: Multipart) -> Result<RecognitionRequest, ServiceError> {
    let mut image: Option<(String, Vec<u8>)> = None;
    let mut mode: Option<String> = None;
    let mut include_math = false;
    let mut include_tables = false;

    let form_error = |e: axum::extract::multipart::MultipartError| {
        ServiceError::Validation(format!("Failed to read multipart body: {e}"))
    };

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await.map_err(form_error)?;
                image = Some((filename, bytes.to_vec()));
            }
            "mode" => mode = Some(field.text().await.map_err(form_error)?),
            "includeMath" => include_math = is_true(&field.text().await.map_err(form_error)?),
            "includeTables" => include_tables = is_true(&field.text().await.map_err(form_error)?),
            _ => {}
        }
    }

    let (filename, bytes) =
        image.ok_or_else(|| ServiceError::Validation("No image was uploaded".into()))?;
    if filename.is_empty() {
        return Err(ServiceError::Validation("No file was selected".into()));
    }
    tracing::debug!(filename = %filename, bytes = bytes.len(), "Image received");

    Ok(RecognitionRequest {
        image: bytes,
        mode: RecognitionMode::parse(mode.as_deref().unwrap_or("text")),
        include_math,
        include_tables,
    })
}

fn is_true(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

fn recognize_error(e: ServiceError) -> Response {
    let status = status_of(&e);
    let message = match &e {
        ServiceError::Validation(msg) => msg.clone(),
        other => {
            tracing::error!(
                error = %other,
                retryable = other.is_retryable(),
                "Image recognition failed"
            );
            format!("Image recognition failed: {other}")
        }
    };
    (
        status,
        Json(RecognizeErrorBody {
            success: false,
            message,
        }),
    )
        .into_response()
}

// ── Shared helpers ───────────────────────────────────────────────────────────

fn status_of(e: &ServiceError) -> StatusCode {
    StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn joined<T>(result: Result<Result<T, ServiceError>, JoinError>) -> Result<T, ServiceError> {
    result.unwrap_or_else(|e| Err(ServiceError::Internal(format!("Request task failed: {e}"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(content_type: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        h
    }

    #[test]
    fn json_content_types() {
        assert!(is_json(&headers("application/json")));
        assert!(is_json(&headers("application/json; charset=utf-8")));
        assert!(is_json(&headers("Application/JSON")));
        assert!(is_json(&headers("application/vnd.api+json")));
        assert!(!is_json(&headers("text/plain")));
        assert!(!is_json(&HeaderMap::new()));
    }

    #[test]
    fn markdown_field_rules() {
        assert_eq!(parse_markdown(br##"{"markdown":"# Hi"}"##).unwrap(), "# Hi");
        let bodies: [&[u8]; 5] = [
            b"{}",
            br#"{"markdown":""}"#,
            br#"{"markdown":null}"#,
            br#"{"markdown":42}"#,
            b"not json",
        ];
        for body in bodies {
            assert!(matches!(
                parse_markdown(body),
                Err(ServiceError::Validation(_))
            ));
        }
    }

    #[test]
    fn flags_match_true_case_insensitively() {
        assert!(is_true("true"));
        assert!(is_true("TRUE"));
        assert!(is_true("True"));
        assert!(!is_true(" true "));
        assert!(!is_true("1"));
        assert!(!is_true("false"));
        assert!(!is_true(""));
    }
}
