//! Markdown → DOCX conversion through an external converter (pandoc).
//!
//! ## Artifact isolation
//!
//! Every call gets a [`ConversionJob`]: a random v4 UUID and two paths
//! derived from it (`<id>.md`, `<id>.docx`) inside the shared scratch
//! directory. Concurrent jobs never share a path, so they never see each
//! other's files. The job deletes both artifacts when dropped, which covers
//! success, converter failure, timeout, early `?` returns, panics and a
//! cancelled future alike.
//!
//! ## Bounded blocking
//!
//! The converter runs with `kill_on_drop(true)` inside
//! `tokio::time::timeout`. When the bound elapses the child handle is
//! dropped and the process is killed outright; nothing waits for it to
//! notice.

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The pair of scratch files owned by one conversion.
#[derive(Debug)]
pub struct ConversionJob {
    id: Uuid,
    input_path: PathBuf,
    output_path: PathBuf,
}

impl ConversionJob {
    /// Allocate a fresh job under `scratch_dir`. Nothing is written yet.
    pub fn new(scratch_dir: &Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            input_path: scratch_dir.join(format!("{id}.md")),
            output_path: scratch_dir.join(format!("{id}.docx")),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

impl Drop for ConversionJob {
    fn drop(&mut self) {
        for path in [&self.input_path, &self.output_path] {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(job_id = %self.id, path = %path.display(), "Removed artifact"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                // Never mask the conversion outcome with a cleanup failure.
                Err(e) => warn!(
                    job_id = %self.id,
                    path = %path.display(),
                    error = %e,
                    "Failed to remove artifact"
                ),
            }
        }
    }
}

/// Runs the external converter on isolated per-job artifacts.
pub struct ConversionPipeline {
    config: Arc<ServiceConfig>,
}

impl ConversionPipeline {
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        Self { config }
    }

    /// Convert Markdown text to DOCX bytes.
    ///
    /// # Errors
    /// - [`ServiceError::Validation`] if `markdown` is empty
    /// - [`ServiceError::Conversion`] if the converter cannot start, exits
    ///   non-zero, or leaves no (or an empty) output artifact
    /// - [`ServiceError::Timeout`] if the converter exceeds its bound
    pub async fn convert(&self, markdown: &str) -> Result<Vec<u8>, ServiceError> {
        if markdown.is_empty() {
            return Err(ServiceError::Validation(
                "Markdown text must not be empty".into(),
            ));
        }

        let start = Instant::now();
        let job = ConversionJob::new(&self.config.scratch_dir);
        info!(job_id = %job.id(), bytes = markdown.len(), "Starting conversion");

        tokio::fs::write(job.input_path(), markdown.as_bytes())
            .await
            .map_err(|e| ServiceError::Internal(format!("Failed to write input artifact: {e}")))?;

        let bytes = self.run_converter(&job).await?;

        info!(
            job_id = %job.id(),
            output_bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Conversion complete"
        );
        Ok(bytes)
    }

    fn command(&self, job: &ConversionJob) -> Command {
        let c = &self.config;
        let mut cmd = Command::new(&c.converter_program);
        cmd.args(&c.converter_args)
            .arg("--from")
            .arg(&c.converter_input_format)
            .arg(job.input_path())
            .arg("-o")
            .arg(job.output_path());

        if let Some(reference) = &c.reference_doc {
            let mut arg = OsString::from("--reference-doc=");
            arg.push(reference);
            cmd.arg(arg);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run_converter(&self, job: &ConversionJob) -> Result<Vec<u8>, ServiceError> {
        let program = self.config.converter_program.display().to_string();
        let timeout = self.config.converter_timeout;

        let output = match tokio::time::timeout(timeout, self.command(job).output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!(job_id = %job.id(), program = %program, error = %e, "Failed to start converter");
                return Err(ServiceError::Conversion {
                    message: format!("Failed to start converter '{program}'"),
                    details: Some(e.to_string()),
                });
            }
            Err(_) => {
                warn!(job_id = %job.id(), timeout_ms = timeout.as_millis() as u64, "Converter timed out, killed");
                return Err(ServiceError::Timeout {
                    operation: "Conversion",
                    secs: timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(job_id = %job.id(), status = %output.status, stderr = %stderr, "Converter failed");
            return Err(ServiceError::Conversion {
                message: "Pandoc conversion failed".into(),
                details: Some(stderr),
            });
        }

        // Exit 0 does not guarantee the converter wrote anything.
        match tokio::fs::read(job.output_path()).await {
            Ok(bytes) if bytes.is_empty() => Err(ServiceError::Conversion {
                message: "Converter produced an empty document".into(),
                details: None,
            }),
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!(job_id = %job.id(), "Converter exited 0 without an output artifact");
                Err(ServiceError::Conversion {
                    message: "Converted file not found on server".into(),
                    details: None,
                })
            }
            Err(e) => Err(ServiceError::Internal(format!(
                "Failed to read output artifact: {e}"
            ))),
        }
    }
}
