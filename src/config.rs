//! Service configuration, resolved once at startup.
//!
//! [`ServiceConfig`] is built through [`ServiceConfigBuilder`], validated, and
//! then shared read-only as `Arc<ServiceConfig>` by both pipelines. Nothing
//! mutates it after `build()`, so handlers read it without locking, and
//! tests build their own instance instead of touching process environment.

use crate::error::ServiceError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default chat-completions endpoint of the vision-language API.
pub const DEFAULT_API_URL: &str = "https://ark.cn-beijing.volces.com/api/v3/chat/completions";

/// Default vision-language model identifier.
pub const DEFAULT_MODEL: &str = "doubao-seed-1-6-251015";

/// Pandoc input format: Markdown extended with `$…$` and `\(…\)` math.
pub const DEFAULT_INPUT_FORMAT: &str = "markdown+tex_math_dollars+tex_math_single_backslash";

/// Name reported by the liveness probe.
pub const SERVICE_NAME: &str = "md2docx-api";

/// Configuration shared by the conversion and recognition pipelines.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Chat-completions endpoint of the vision API.
    pub api_url: String,

    /// Model identifier sent with every recognition request.
    pub model: String,

    /// Bearer credential for the vision API. `None` disables recognition.
    pub api_key: Option<String>,

    /// Maximum tokens the model may generate. Default: 4000.
    pub max_tokens: u32,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription wants the model faithful to the pixels, not creative.
    pub temperature: f32,

    /// Bound on a single vision API call. Default: 120 s.
    pub api_timeout: Duration,

    /// Largest accepted image upload in bytes. Default: 10 MiB.
    pub max_image_bytes: usize,

    /// Converter executable. Default: `pandoc`.
    pub converter_program: PathBuf,

    /// Arguments placed before the pandoc arguments (for wrapper scripts).
    pub converter_args: Vec<String>,

    /// Value passed to `--from`.
    pub converter_input_format: String,

    /// Hard bound on the converter process. Default: 30 s.
    pub converter_timeout: Duration,

    /// Style reference document passed as `--reference-doc`.
    pub reference_doc: Option<PathBuf>,

    /// Directory holding per-job input and output artifacts.
    pub scratch_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            max_tokens: 4000,
            temperature: 0.1,
            api_timeout: Duration::from_secs(120),
            max_image_bytes: 10 * 1024 * 1024,
            converter_program: PathBuf::from("pandoc"),
            converter_args: Vec::new(),
            converter_input_format: DEFAULT_INPUT_FORMAT.to_string(),
            converter_timeout: Duration::from_secs(30),
            reference_doc: None,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("api_timeout", &self.api_timeout)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("converter_program", &self.converter_program)
            .field("converter_args", &self.converter_args)
            .field("converter_input_format", &self.converter_input_format)
            .field("converter_timeout", &self.converter_timeout)
            .field("reference_doc", &self.reference_doc)
            .field("scratch_dir", &self.scratch_dir)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// The credential, or a configuration error when none is set.
    pub fn require_api_key(&self) -> Result<&str, ServiceError> {
        self.api_key.as_deref().ok_or_else(|| {
            ServiceError::Configuration(
                "API key is not set. Set the DOUBAO_API_KEY environment variable.".into(),
            )
        })
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the credential. Blank values count as unset.
    pub fn api_key(mut self, key: Option<impl Into<String>>) -> Self {
        self.config.api_key = key.map(Into::into).filter(|k| !k.trim().is_empty());
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout = timeout;
        self
    }

    pub fn max_image_bytes(mut self, n: usize) -> Self {
        self.config.max_image_bytes = n;
        self
    }

    pub fn converter_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.converter_program = program.into();
        self
    }

    pub fn converter_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.converter_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn converter_input_format(mut self, format: impl Into<String>) -> Self {
        self.config.converter_input_format = format.into();
        self
    }

    pub fn converter_timeout(mut self, timeout: Duration) -> Self {
        self.config.converter_timeout = timeout;
        self
    }

    pub fn reference_doc(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        self.config.reference_doc = path.map(Into::into);
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ServiceError> {
        let c = &self.config;
        if c.api_url.trim().is_empty() {
            return Err(ServiceError::Configuration("API URL must not be empty".into()));
        }
        if c.model.trim().is_empty() {
            return Err(ServiceError::Configuration("Model must not be empty".into()));
        }
        if c.converter_program.as_os_str().is_empty() {
            return Err(ServiceError::Configuration(
                "Converter program must not be empty".into(),
            ));
        }
        if c.api_timeout.is_zero() || c.converter_timeout.is_zero() {
            return Err(ServiceError::Configuration("Timeouts must be > 0".into()));
        }
        if c.max_image_bytes == 0 {
            return Err(ServiceError::Configuration(
                "Image size limit must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}
