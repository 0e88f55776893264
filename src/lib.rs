//! # md2docx-api
//!
//! A small HTTP service with two jobs:
//!
//! * **Convert** Markdown (with `$…$` math) into a DOCX document by running
//!   pandoc on isolated, uniquely named scratch files.
//! * **Recognise** the text in an uploaded image by asking a remote
//!   vision-language model, returning plain text or structured Markdown.
//!
//! ## Request Lifecycle
//!
//! ```text
//! TCP listener ───────────────┐            (direct mode, server.rs)
//!                             ▼
//! serverless event ─▶ adapter ─▶ router ─┬─▶ /api/convert   → pipeline::convert
//!                     (event mode)       ├─▶ /api/recognize → pipeline::recognize
//!                                        └─▶ /health
//! ```
//!
//! The same [`router::create_router`] serves both modes; only the edges
//! differ.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use md2docx_api::{create_router, AppState, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder()
//!         .api_key(std::env::var("DOUBAO_API_KEY").ok())
//!         .reference_doc(Some("/app/reference.docx"))
//!         .build()?;
//!     let router = create_router(AppState::from_config(Arc::new(config))?);
//!     md2docx_api::server::serve(router, "0.0.0.0:5001".parse()?).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2docx` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod adapter;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod router;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use adapter::{handle_event, CanonicalRequest, CanonicalResponse, ServerlessEvent, ServerlessResponse};
pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::ServiceError;
pub use pipeline::convert::{ConversionJob, ConversionPipeline};
pub use pipeline::recognize::{
    HttpVisionApi, RecognitionClient, RecognitionMode, RecognitionRequest, RecognitionResult,
    VisionApi,
};
pub use router::{create_router, AppState};
