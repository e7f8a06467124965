//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while driving external tools.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("{tool} failed: {message}")]
    ToolFailed {
        tool: String,
        message: String,
        /// Raw output of the tool (stderr then stdout)
        diagnostic: String,
        exit_code: Option<i32>,
    },

    #[error("No pages rendered from {0}")]
    NoPagesRendered(PathBuf),

    #[error("Expected output missing: {0}")]
    OutputMissing(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a tool failure error.
    pub fn tool_failed(
        tool: impl Into<String>,
        message: impl Into<String>,
        diagnostic: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
            diagnostic: diagnostic.into(),
            exit_code,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Human-readable diagnostic suitable for storing on a failed job.
    ///
    /// Prefers the tool's own output when there is any.
    pub fn diagnostic(&self) -> String {
        match self {
            MediaError::ToolFailed {
                message, diagnostic, ..
            } if !diagnostic.trim().is_empty() => {
                format!("{}: {}", message, diagnostic.trim())
            }
            other => other.to_string(),
        }
    }
}
