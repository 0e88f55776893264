//! CLI binary for md2docx-api.
//!
//! A thin shim over the library crate: resolves flags/env into a
//! `ServiceConfig` once, then either listens on a socket (`serve`) or
//! answers a single serverless event (`invoke`).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use md2docx_api::{create_router, handle_event, server, AppState, ServiceConfig};
use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r##"EXAMPLES:
  # Listen on 0.0.0.0:5001
  md2docx serve

  # Convert through the running service
  curl -X POST localhost:5001/api/convert \
       -H 'Content-Type: application/json' \
       -d '{"markdown":"# Hello\n\n$E = mc^2$"}' -o out.docx

  # Recognise an image
  curl -X POST localhost:5001/api/recognize \
       -F image=@page.png -F mode=document -F includeMath=true

  # Answer one serverless event read from stdin
  echo '{"httpMethod":"GET","path":"/health"}' | md2docx invoke

ENVIRONMENT VARIABLES:
  DOUBAO_API_KEY              Vision API key (required for /api/recognize)
  MD2DOCX_API_URL             Chat-completions endpoint
  MD2DOCX_MODEL               Vision model ID
  MD2DOCX_PANDOC              Converter executable (default: pandoc)
  MD2DOCX_REFERENCE_DOC       Style reference .docx for pandoc
  MD2DOCX_SCRATCH_DIR         Directory for temporary artifacts
  RUST_LOG                    Log filter, overrides --verbose
"##;

/// Markdown → DOCX conversion and image text recognition over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "md2docx",
    version,
    about = "Markdown to DOCX conversion and image text recognition over HTTP",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    service: ServiceArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MD2DOCX_VERBOSE")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve HTTP requests directly on a TCP listener.
    Serve {
        /// Address to bind.
        #[arg(long, env = "MD2DOCX_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Port to bind.
        #[arg(short, long, env = "MD2DOCX_PORT", default_value_t = 5001)]
        port: u16,
    },

    /// Handle one serverless invocation event and print the response JSON.
    Invoke {
        /// Event JSON file; `-` reads stdin.
        #[arg(long, default_value = "-")]
        event: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Vision API key.
    #[arg(long, global = true, env = "DOUBAO_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Vision chat-completions endpoint.
    #[arg(long, global = true, env = "MD2DOCX_API_URL",
          default_value = md2docx_api::config::DEFAULT_API_URL)]
    api_url: String,

    /// Vision model ID.
    #[arg(long, global = true, env = "MD2DOCX_MODEL",
          default_value = md2docx_api::config::DEFAULT_MODEL)]
    model: String,

    /// Max output tokens per recognition.
    #[arg(long, global = true, env = "MD2DOCX_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: u32,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, global = true, env = "MD2DOCX_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Vision API timeout in seconds.
    #[arg(long, global = true, env = "MD2DOCX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Largest accepted image in MiB.
    #[arg(long, global = true, env = "MD2DOCX_MAX_IMAGE_MB", default_value_t = 10)]
    max_image_mb: usize,

    /// Converter executable.
    #[arg(long, global = true, env = "MD2DOCX_PANDOC", default_value = "pandoc")]
    pandoc: PathBuf,

    /// Converter timeout in seconds.
    #[arg(long, global = true, env = "MD2DOCX_CONVERT_TIMEOUT", default_value_t = 30)]
    convert_timeout: u64,

    /// Style reference document passed to pandoc.
    #[arg(long, global = true, env = "MD2DOCX_REFERENCE_DOC")]
    reference_doc: Option<PathBuf>,

    /// Directory for temporary conversion artifacts.
    #[arg(long, global = true, env = "MD2DOCX_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,
}

impl ServiceArgs {
    fn into_config(self) -> Result<ServiceConfig> {
        let mut builder = ServiceConfig::builder()
            .api_key(self.api_key)
            .api_url(self.api_url)
            .model(self.model)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .api_timeout(Duration::from_secs(self.api_timeout))
            .max_image_bytes(self.max_image_mb.saturating_mul(1024 * 1024))
            .converter_program(self.pandoc)
            .converter_timeout(Duration::from_secs(self.convert_timeout))
            .reference_doc(self.reference_doc);
        if let Some(dir) = self.scratch_dir {
            builder = builder.scratch_dir(dir);
        }
        builder.build().context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Always stderr: `invoke` prints its response on stdout.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Configuration, resolved once ─────────────────────────────────────
    let config = Arc::new(cli.service.into_config()?);
    if config.api_key.is_none() {
        tracing::warn!("DOUBAO_API_KEY is not set; /api/recognize will answer with a configuration error");
    }
    if let Some(reference) = &config.reference_doc {
        if !reference.exists() {
            tracing::warn!(path = %reference.display(), "Reference document not found; conversions will fail");
        }
    }
    tracing::debug!(?config, "Configuration resolved");

    let state = AppState::from_config(Arc::clone(&config)).context("Failed to initialise service")?;
    let router = create_router(state);

    match cli.command {
        Command::Serve { host, port } => {
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("Invalid listen address {host}:{port}"))?;
            server::serve(router, addr).await?;
        }
        Command::Invoke { event } => {
            let raw = read_event(&event)?;
            let event: serde_json::Value =
                serde_json::from_str(&raw).context("Event is not valid JSON")?;
            let response = handle_event(router, event).await;
            println!("{}", serde_json::to_string(&response)?);
        }
    }

    Ok(())
}

fn read_event(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read event from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))
    }
}
