//! Event mode: serve the router from a serverless invocation payload.
//!
//! A function platform hands the service an event object instead of a
//! socket. [`handle_event`] translates that event into a
//! [`CanonicalRequest`], drives the very same axum [`Router`] used in direct
//! mode, and turns the [`CanonicalResponse`] back into a
//! [`ServerlessResponse`]:
//!
//! ```text
//! event JSON ──▶ ServerlessEvent ──▶ CanonicalRequest ──▶ http::Request
//!                                                             │ Router
//! ServerlessResponse ◀── CanonicalResponse ◀── http::Response ◀┘
//! ```
//!
//! Header names other than content type/length are carried under the
//! `HTTP_` namespace (upper-cased, `-` → `_`), so an event header can never
//! collide with the two content headers the adapter sets itself.
//!
//! Every failure on the way, including a panic, becomes a
//! `500 {"error": "..."}` response. Event-mode callers never see a fault.

use crate::error::ServiceError;
use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::response::Response;
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use tower::ServiceExt;
use tracing::{debug, error};

/// Prefix for propagated request headers.
pub const HEADER_NAMESPACE: &str = "HTTP_";

/// Canonical key of the content-type header.
pub const CONTENT_TYPE_KEY: &str = "CONTENT_TYPE";

/// Canonical key of the content-length header.
pub const CONTENT_LENGTH_KEY: &str = "CONTENT_LENGTH";

// ── Inbound ──────────────────────────────────────────────────────────────────

/// The invocation event as delivered by the function platform.
///
/// Every field is optional; absent or `null` fields take their defaults.
/// Header and query values may be any JSON scalar; see [`value_text`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerlessEvent {
    pub path: Option<String>,
    pub http_method: Option<String>,
    pub headers: Option<BTreeMap<String, Option<Value>>>,
    pub query_parameters: Option<BTreeMap<String, Option<Value>>>,
    pub body: Option<String>,
    pub is_base64_encoded: bool,
}

/// Shape-agnostic request consumed by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub method: String,
    pub path: String,
    /// `CONTENT_TYPE`, `CONTENT_LENGTH` and `HTTP_*` keys.
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// Namespaced key for a propagated header, e.g. `X-Request-Id` → `HTTP_X_REQUEST_ID`.
pub fn namespaced_header_key(name: &str) -> String {
    format!("{HEADER_NAMESPACE}{}", env_style(name))
}

fn env_style(name: &str) -> String {
    name.to_ascii_uppercase().replace('-', "_")
}

/// Text form of an event header or query value: strings as-is, other
/// values as their JSON text. `null` yields `None`.
pub fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn text_entries(map: Option<BTreeMap<String, Option<Value>>>) -> BTreeMap<String, String> {
    map.unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| v.and_then(value_text).map(|v| (k, v)))
        .collect()
}

/// HTTP header name for a canonical key, `None` for keys outside the scheme.
pub fn header_name_for_key(key: &str) -> Option<String> {
    match key {
        CONTENT_TYPE_KEY => Some("content-type".to_string()),
        CONTENT_LENGTH_KEY => Some("content-length".to_string()),
        _ => key
            .strip_prefix(HEADER_NAMESPACE)
            .filter(|rest| !rest.is_empty())
            .map(|rest| rest.to_ascii_lowercase().replace('_', "-")),
    }
}

impl CanonicalRequest {
    /// Translate an event, applying the documented defaults.
    pub fn from_event(event: ServerlessEvent) -> Result<Self, ServiceError> {
        let raw_body = event.body.unwrap_or_default();
        let body = if event.is_base64_encoded {
            STANDARD
                .decode(raw_body.as_bytes())
                .map_err(|e| ServiceError::Internal(format!("Invalid base64 event body: {e}")))?
        } else {
            raw_body.into_bytes()
        };

        let event_headers = text_entries(event.headers);

        let mut headers = BTreeMap::new();
        let content_type = event_headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.clone())
            .unwrap_or_default();
        headers.insert(CONTENT_TYPE_KEY.to_string(), content_type);
        headers.insert(CONTENT_LENGTH_KEY.to_string(), body.len().to_string());

        for (name, value) in event_headers {
            let key = env_style(&name);
            if key == CONTENT_TYPE_KEY || key == CONTENT_LENGTH_KEY {
                continue;
            }
            headers.insert(format!("{HEADER_NAMESPACE}{key}"), value);
        }

        let query = text_entries(event.query_parameters);

        Ok(Self {
            method: event.http_method.unwrap_or_else(|| "GET".to_string()),
            path: event.path.unwrap_or_else(|| "/".to_string()),
            headers,
            query,
            body,
        })
    }

    /// Query parameters joined as `key=value` pairs.
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE_KEY)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Path plus percent-encoded query, suitable as a request URI.
    fn uri(&self) -> Result<String, ServiceError> {
        let mut url = reqwest::Url::parse("http://event.invalid")
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        url.set_path(&self.path);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        })
    }

    /// Build the `http::Request` the router is driven with.
    pub fn into_http_request(self) -> Result<Request<Body>, ServiceError> {
        let mut builder = Request::builder()
            .method(self.method.as_str())
            .uri(self.uri()?);

        for (key, value) in &self.headers {
            if key == CONTENT_TYPE_KEY && value.is_empty() {
                continue;
            }
            let Some(name) = header_name_for_key(key) else {
                continue;
            };
            // Names or values HTTP cannot carry are dropped, not fatal.
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => debug!(key = %key, "Skipping event header that is not valid HTTP"),
            }
        }

        builder
            .body(Body::from(self.body))
            .map_err(|e| ServiceError::Internal(format!("Invalid event request: {e}")))
    }
}

// ── Outbound ─────────────────────────────────────────────────────────────────

/// Shape-agnostic response produced by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl CanonicalResponse {
    /// Collect a router response, concatenating the streamed body.
    pub async fn from_http_response(response: Response) -> Result<Self, ServiceError> {
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| ServiceError::Internal(format!("Failed to read response body: {e}")))?;

        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Ok(Self {
            status_code: parts.status.as_u16(),
            headers,
            body: body.to_vec(),
        })
    }
}

/// The response object returned to the function platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl ServerlessResponse {
    /// `500` with a JSON `{"error": message}` body.
    pub fn internal_error(message: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status_code: 500,
            headers,
            body: serde_json::json!({ "error": message }).to_string(),
            is_base64_encoded: false,
        }
    }
}

impl From<CanonicalResponse> for ServerlessResponse {
    /// UTF-8 bodies are passed as text; binary bodies (the DOCX) as base64.
    fn from(response: CanonicalResponse) -> Self {
        let (body, is_base64_encoded) = match String::from_utf8(response.body) {
            Ok(text) => (text, false),
            Err(e) => (STANDARD.encode(e.into_bytes()), true),
        };
        Self {
            status_code: response.status_code,
            headers: response.headers,
            body,
            is_base64_encoded,
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

/// Handle one invocation event. Never fails; faults become 500 responses.
pub async fn handle_event(router: Router, event: Value) -> ServerlessResponse {
    match AssertUnwindSafe(dispatch_event(router, event))
        .catch_unwind()
        .await
    {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!(error = %e, "Event invocation failed");
            ServerlessResponse::internal_error(&e.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(panic = %message, "Event invocation panicked");
            ServerlessResponse::internal_error(&message)
        }
    }
}

async fn dispatch_event(router: Router, event: Value) -> Result<ServerlessResponse, ServiceError> {
    let event: ServerlessEvent = serde_json::from_value(event)
        .map_err(|e| ServiceError::Internal(format!("Invalid invocation event: {e}")))?;
    let request = CanonicalRequest::from_event(event)?;
    debug!(
        method = %request.method,
        path = %request.path,
        query = %request.query_string(),
        body_bytes = request.body.len(),
        "Dispatching event"
    );

    let response = match router.oneshot(request.into_http_request()?).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let canonical = CanonicalResponse::from_http_response(response).await?;
    debug!(status = canonical.status_code, body_bytes = canonical.body.len(), "Event handled");
    Ok(canonical.into())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
