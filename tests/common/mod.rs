//! Shared fixtures: a stub vision API, fake converters and multipart bodies.

#![allow(dead_code)]

use async_trait::async_trait;
use md2docx_api::pipeline::recognize::{ChatCompletionRequest, VisionApi};
use md2docx_api::{create_router, AppState, ServiceConfig, ServiceError};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Stub vision API ──────────────────────────────────────────────────────────

/// What the stub answers with.
#[derive(Clone)]
pub enum Reply {
    Json(Value),
    Status(u16, String),
    Timeout,
}

pub struct StubVisionApi {
    reply: Reply,
    calls: AtomicUsize,
    requests: Mutex<Vec<Value>>,
}

impl StubVisionApi {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers with one choice carrying `content`.
    pub fn answering(content: &str) -> Arc<Self> {
        Self::new(Reply::Json(
            json!({ "choices": [ { "message": { "content": content } } ] }),
        ))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Serialized request bodies seen so far.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionApi for StubVisionApi {
    async fn complete(
        &self,
        _api_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<Value, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push(serde_json::to_value(request).unwrap());
        match &self.reply {
            Reply::Json(v) => Ok(v.clone()),
            Reply::Status(status, body) => Err(ServiceError::Upstream {
                status: Some(*status),
                detail: body.clone(),
            }),
            Reply::Timeout => Err(ServiceError::UpstreamTimeout { secs: 120 }),
        }
    }
}

// ── Fake converters ──────────────────────────────────────────────────────────
//
// Invoked as `sh <script> --from <fmt> <input> -o <output> [--reference-doc=..]`,
// so inside the script $3 is the input path and $5 the output path.

/// Copies the input to the output.
pub const COPY_CONVERTER: &str = "cp \"$3\" \"$5\"\n";

/// Writes its argument list to the output.
pub const ARGS_CONVERTER: &str = "printf '%s\\n' \"$@\" > \"$5\"\n";

/// Fails with a diagnostic on stderr.
pub const FAILING_CONVERTER: &str = "echo 'pandoc: unknown extension' >&2\nexit 3\n";

/// Exits 0 without writing anything.
pub const SILENT_CONVERTER: &str = "exit 0\n";

/// Never finishes in time.
pub const HANGING_CONVERTER: &str = "exec sleep 30\n";

/// Temp directories for converter scripts and conversion artifacts.
pub struct TestEnv {
    scripts: TempDir,
    scratch: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            scripts: TempDir::new().expect("create scripts dir"),
            scratch: TempDir::new().expect("create scratch dir"),
        }
    }

    pub fn scratch(&self) -> &Path {
        self.scratch.path()
    }

    /// Names of everything left in the scratch directory.
    pub fn leftovers(&self) -> Vec<String> {
        fs::read_dir(self.scratch.path())
            .expect("read scratch dir")
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    pub fn script(&self, body: &str) -> PathBuf {
        let path = self.scripts.path().join("converter.sh");
        fs::write(&path, body).expect("write converter script");
        path
    }

    /// Config running `body` as the converter, with a stub-friendly API key.
    pub fn config(&self, body: &str) -> ServiceConfig {
        self.builder(body).build().expect("valid config")
    }

    pub fn builder(&self, body: &str) -> md2docx_api::ServiceConfigBuilder {
        let script = self.script(body);
        ServiceConfig::builder()
            .api_key(Some("test-key"))
            .converter_program("sh")
            .converter_args([script.to_string_lossy().into_owned()])
            .converter_timeout(Duration::from_secs(5))
            .scratch_dir(self.scratch.path())
    }

    pub fn router(&self, config: ServiceConfig, api: Arc<StubVisionApi>) -> axum::Router {
        create_router(AppState::new(Arc::new(config), api))
    }
}

// ── Multipart ────────────────────────────────────────────────────────────────

pub const BOUNDARY: &str = "----md2docxTestBoundary";

/// Build a `multipart/form-data` body. Returns `(content_type, body)`.
pub fn multipart(image: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    if let Some((filename, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// A few bytes that sniff as PNG.
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
