//! Image recognition through a remote vision-language API.
//!
//! [`RecognitionClient`] validates the upload, builds one chat-completions
//! request (instruction + inline image), sends it through a [`VisionApi`]
//! transport and post-processes the first choice. The transport is a trait
//! so the router can be exercised against a stub without network access;
//! [`HttpVisionApi`] is the reqwest implementation used in production.
//!
//! ## No retries
//!
//! A single request is sent. Timeouts surface as
//! [`ServiceError::UpstreamTimeout`] so callers can tell a retryable
//! condition from a hard [`ServiceError::Upstream`] failure and retry
//! themselves; recognition has no side effects.

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::pipeline::{encode, postprocess};
use crate::prompts::build_recognition_prompt;
use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ── Request / result types ───────────────────────────────────────────────────

/// What kind of output the caller wants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecognitionMode {
    /// Plain prose, markup stripped. (default)
    #[default]
    Text,
    /// Markdown preserving the document structure.
    Document,
    /// Any other value; generic instruction, output returned as-is.
    Other(String),
}

impl RecognitionMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "text" => RecognitionMode::Text,
            "document" => RecognitionMode::Document,
            other => RecognitionMode::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecognitionMode::Text => "text",
            RecognitionMode::Document => "document",
            RecognitionMode::Other(s) => s,
        }
    }
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RecognitionMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One recognition request, scoped to a single HTTP request.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub image: Vec<u8>,
    pub mode: RecognitionMode,
    pub include_math: bool,
    pub include_tables: bool,
}

/// Recognised text plus the options that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub markdown: String,
    pub mode: RecognitionMode,
    pub include_math: bool,
    pub include_tables: bool,
}

// ── Wire format ──────────────────────────────────────────────────────────────

/// Chat-completions request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

/// One part of a multi-part message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

// ── Transport ────────────────────────────────────────────────────────────────

/// Sends a chat-completions request and returns the decoded JSON body.
#[async_trait]
pub trait VisionApi: Send + Sync {
    async fn complete(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<Value, ServiceError>;
}

/// reqwest-backed [`VisionApi`].
pub struct HttpVisionApi {
    client: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl HttpVisionApi {
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.api_timeout)
            .build()
            .map_err(|e| ServiceError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.api_url.clone(),
            timeout_secs: config.api_timeout.as_secs(),
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::UpstreamTimeout {
                secs: self.timeout_secs,
            }
        } else {
            ServiceError::Upstream {
                status: e.status().map(|s| s.as_u16()),
                detail: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl VisionApi for HttpVisionApi {
    async fn complete(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<Value, ServiceError> {
        debug!(url = %self.url, model = %request.model, "Sending vision API request");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        info!(status = status.as_u16(), "Vision API responded");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Vision API returned an error");
            return Err(ServiceError::Upstream {
                status: Some(status.as_u16()),
                detail: body,
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::UpstreamTimeout {
                    secs: self.timeout_secs,
                }
            } else {
                ServiceError::Upstream {
                    status: Some(status.as_u16()),
                    detail: format!("response body is not JSON: {e}"),
                }
            }
        })
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Validates uploads and drives one vision API call per request.
pub struct RecognitionClient {
    config: Arc<ServiceConfig>,
    api: Arc<dyn VisionApi>,
}

impl RecognitionClient {
    pub fn new(config: Arc<ServiceConfig>, api: Arc<dyn VisionApi>) -> Self {
        Self { config, api }
    }

    /// Client talking to the configured endpoint over HTTP.
    pub fn from_config(config: Arc<ServiceConfig>) -> Result<Self, ServiceError> {
        let api = Arc::new(HttpVisionApi::new(&config)?);
        Ok(Self::new(config, api))
    }

    /// Recognise the text in one image.
    ///
    /// # Errors
    /// - [`ServiceError::Validation`] for an empty or oversized image
    /// - [`ServiceError::Configuration`] when no API key is configured
    /// - [`ServiceError::UpstreamTimeout`] / [`ServiceError::Upstream`] from the transport
    pub async fn recognize(
        &self,
        request: &RecognitionRequest,
    ) -> Result<RecognitionResult, ServiceError> {
        // Size check comes first: reject before any encoding work.
        if request.image.is_empty() {
            return Err(ServiceError::Validation("No image was uploaded".into()));
        }
        if request.image.len() > self.config.max_image_bytes {
            return Err(ServiceError::Validation(format!(
                "Image is too large ({} bytes), please upload an image smaller than {}MB",
                request.image.len(),
                self.config.max_image_bytes / (1024 * 1024)
            )));
        }

        let api_key = self.config.require_api_key()?;

        let start = Instant::now();
        let payload = self.build_payload(request);
        debug!(
            mode = %request.mode,
            include_math = request.include_math,
            include_tables = request.include_tables,
            image_bytes = request.image.len(),
            "Recognition request built"
        );

        let response = self.api.complete(api_key, &payload).await?;

        let content = match extract_content(&response) {
            Some(content) => content,
            None => {
                warn!("Vision API response has no choices[0].message.content; returning empty text");
                ""
            }
        };
        let markdown = postprocess::finalize(content, &request.mode);

        info!(
            mode = %request.mode,
            chars = markdown.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Image recognised"
        );

        Ok(RecognitionResult {
            markdown,
            mode: request.mode.clone(),
            include_math: request.include_math,
            include_tables: request.include_tables,
        })
    }

    /// Build the chat-completions body for one request.
    pub fn build_payload(&self, request: &RecognitionRequest) -> ChatCompletionRequest {
        let prompt =
            build_recognition_prompt(&request.mode, request.include_math, request.include_tables);

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: encode::encode_image(&request.image),
                        },
                    },
                ],
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

/// Text of the first choice, if the response has the expected shape.
pub fn extract_content(response: &Value) -> Option<&str> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubApi {
        response: Value,
        calls: AtomicUsize,
    }

    impl StubApi {
        fn new(response: Value) -> Arc<Self> {
            Arc::new(Self {
                response,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VisionApi for StubApi {
        async fn complete(
            &self,
            _api_key: &str,
            _request: &ChatCompletionRequest,
        ) -> Result<Value, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn config(api_key: Option<&str>) -> Arc<ServiceConfig> {
        Arc::new(
            ServiceConfig::builder()
                .api_key(api_key)
                .max_image_bytes(1024)
                .build()
                .unwrap(),
        )
    }

    fn request(mode: RecognitionMode) -> RecognitionRequest {
        RecognitionRequest {
            image: b"\x89PNG\r\n\x1a\nfake".to_vec(),
            mode,
            include_math: true,
            include_tables: false,
        }
    }

    fn choice(content: &str) -> Value {
        json!({ "choices": [ { "message": { "content": content } } ] })
    }

    #[test]
    fn mode_parse_round_trip() {
        assert_eq!(RecognitionMode::parse("text"), RecognitionMode::Text);
        assert_eq!(RecognitionMode::parse("document"), RecognitionMode::Document);
        assert_eq!(RecognitionMode::parse("Receipt").as_str(), "Receipt");
    }

    #[test]
    fn payload_shape() {
        let client = RecognitionClient::new(config(Some("k")), StubApi::new(json!({})));
        let payload = client.build_payload(&request(RecognitionMode::Document));
        let v = serde_json::to_value(&payload).unwrap();

        assert_eq!(v["model"], crate::config::DEFAULT_MODEL);
        assert_eq!(v["max_tokens"], 4000);
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"][0]["type"], "text");
        assert_eq!(v["messages"][0]["content"][1]["type"], "image_url");
        let url = v["messages"][0]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn text_mode_strips_markers() {
        let api = StubApi::new(choice("# Title\n- item\n1. step"));
        let client = RecognitionClient::new(config(Some("k")), api.clone());
        let result = client.recognize(&request(RecognitionMode::Text)).await.unwrap();
        assert_eq!(result.markdown, "Title\nitem\nstep");
        assert_eq!(result.mode, RecognitionMode::Text);
        assert!(result.include_math);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn document_mode_keeps_markup() {
        let api = StubApi::new(choice("  # Title\n\n| a | b |\n"));
        let client = RecognitionClient::new(config(Some("k")), api);
        let result = client
            .recognize(&request(RecognitionMode::Document))
            .await
            .unwrap();
        assert_eq!(result.markdown, "# Title\n\n| a | b |");
    }

    // Malformed upstream payloads degrade to empty text instead of failing.
    // This can hide a genuine upstream problem; kept deliberately.
    #[tokio::test]
    async fn malformed_response_yields_empty_text() {
        for body in [
            json!({}),
            json!({ "choices": [] }),
            json!({ "choices": [ { "message": {} } ] }),
            json!({ "choices": [ { "message": { "content": 42 } } ] }),
        ] {
            let client = RecognitionClient::new(config(Some("k")), StubApi::new(body));
            let result = client.recognize(&request(RecognitionMode::Text)).await.unwrap();
            assert_eq!(result.markdown, "");
        }
    }

    #[tokio::test]
    async fn oversized_image_rejected_before_upstream() {
        let api = StubApi::new(choice("x"));
        let client = RecognitionClient::new(config(Some("k")), api.clone());
        let mut req = request(RecognitionMode::Text);
        req.image = vec![0u8; 1025];
        let err = client.recognize(&req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_image_rejected() {
        let api = StubApi::new(choice("x"));
        let client = RecognitionClient::new(config(Some("k")), api.clone());
        let mut req = request(RecognitionMode::Text);
        req.image.clear();
        let err = client.recognize(&req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_api_key_is_configuration_error() {
        let api = StubApi::new(choice("x"));
        let client = RecognitionClient::new(config(None), api.clone());
        let err = client
            .recognize(&request(RecognitionMode::Text))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn identical_inputs_identical_output() {
        let api = StubApi::new(choice("## Heading\n* point\nprose"));
        let client = RecognitionClient::new(config(Some("k")), api);
        let req = request(RecognitionMode::Text);
        let a = client.recognize(&req).await.unwrap();
        let b = client.recognize(&req).await.unwrap();
        assert_eq!(a, b);
    }
}
