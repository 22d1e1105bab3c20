//! Capture devices
//!
//! A capture device produces one artifact per unit of work. The worker owns
//! the device exclusively and closes it when it shuts down.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::schedule::Resolution;

/// Capture errors
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture device unavailable: {0}")]
    Unavailable(String),

    #[error("Capture command `{command}` failed: {status}")]
    CommandFailed { command: String, status: String },

    #[error("Capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// A device that produces one artifact per unit of work
#[async_trait]
pub trait CaptureDevice: Send {
    /// Produce an artifact at `target` and return where it was written
    async fn capture_unit(&mut self, target: &Path) -> CaptureResult<PathBuf>;

    /// Release the device
    async fn close(&mut self) {}
}

/// Captures by running an external command
///
/// Arguments may contain `{path}`, `{width}` and `{height}` placeholders.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
    resolution: Resolution,
}

impl CommandCapture {
    pub fn new(command: &[String], resolution: Resolution) -> CaptureResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| CaptureError::Unavailable("empty capture command".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            resolution: resolution.sanitized(),
        })
    }

    /// Arguments with placeholders filled in for `target`
    pub fn render_args(&self, target: &Path) -> Vec<String> {
        let path = target.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{path}", &path)
                    .replace("{width}", &self.resolution.x.to_string())
                    .replace("{height}", &self.resolution.y.to_string())
            })
            .collect()
    }
}

#[async_trait]
impl CaptureDevice for CommandCapture {
    async fn capture_unit(&mut self, target: &Path) -> CaptureResult<PathBuf> {
        let args = self.render_args(target);
        debug!(program = %self.program, ?args, "Running capture command");

        let status = tokio::process::Command::new(&self.program)
            .args(&args)
            .status()
            .await?;

        if !status.success() {
            return Err(CaptureError::CommandFailed {
                command: self.program.clone(),
                status: status.to_string(),
            });
        }
        Ok(target.to_path_buf())
    }
}
