//! Error taxonomy for the clustering and rendering core.
//!
//! Every failure the core can report maps onto one stable rejection code via
//! [`FacereelError::code`], which is what callers hand back to their clients.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type FacereelResult<T> = Result<T, FacereelError>;

/// Bad, oversized or duplicate input. Nothing has been mutated when this is returned.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("image is {size_kb} KB, limit is {limit_kb} KB")]
    ImageTooLarge { size_kb: u64, limit_kb: u64 },

    #[error("image could not be decoded: {0}")]
    InvalidImage(String),

    #[error("image already uploaded (content hash {hash})")]
    DuplicateImage { hash: String },

    #[error("group id is required")]
    MissingGroupId,
}

/// The identity store could not be durably read or written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("asset write failed for {path}: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image encode failed for {path}: {message}")]
    ImageEncode { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export failed: {0}")]
    Export(String),
}

/// A requested group or its images are absent.
#[derive(Debug, Error)]
pub enum AssetNotFoundError {
    #[error("group {0} not found")]
    GroupNotFound(String),

    #[error("no images found for group {0}")]
    NoImagesForGroup(String),
}

/// The external embedding extractor failed.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no extractor command configured")]
    NotConfigured,

    #[error("extractor command failed (exit code {exit_code:?}): {stderr}")]
    CommandFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("extractor output could not be parsed: {0}")]
    MalformedOutput(#[from] serde_json::Error),

    #[error("image could not be handed to the extractor: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Composition or encoding failure.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("encoder binary not found: {0}")]
    EncoderNotFound(String),

    #[error("timeline has no clips")]
    EmptyTimeline,

    #[error("encoder failed: {message}")]
    EncoderFailed {
        message: String,
        command: Vec<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("audio probe failed for {path}: {message}")]
    ProbeFailed { path: PathBuf, message: String },

    #[error("render task aborted: {0}")]
    Aborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Create an encoder failure error.
    pub fn encoder_failed(
        message: impl Into<String>,
        command: Vec<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::EncoderFailed {
            message: message.into(),
            command,
            stderr,
            exit_code,
        }
    }

    /// Full diagnostic text: message, encoder invocation, exit code and captured stderr.
    pub fn diagnostics(&self) -> String {
        match self {
            RenderError::EncoderFailed {
                message,
                command,
                stderr,
                exit_code,
            } => {
                let mut out = format!("{}\ncommand: {}", message, command.join(" "));
                if let Some(code) = exit_code {
                    out.push_str(&format!("\nexit code: {}", code));
                }
                if let Some(stderr) = stderr {
                    out.push_str("\nstderr:\n");
                    out.push_str(stderr);
                }
                out
            }
            other => {
                let mut out = other.to_string();
                let mut source = std::error::Error::source(other);
                while let Some(cause) = source {
                    out.push_str(&format!("\ncaused by: {}", cause));
                    source = cause.source();
                }
                out
            }
        }
    }
}

/// Top-level error returned across the core boundary.
#[derive(Debug, Error)]
pub enum FacereelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no faces detected")]
    NoFaceDetected,

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    AssetNotFound(#[from] AssetNotFoundError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl FacereelError {
    /// Stable machine-readable rejection code.
    pub fn code(&self) -> &'static str {
        match self {
            FacereelError::Validation(ValidationError::DuplicateImage { .. }) => "duplicate-image",
            FacereelError::Validation(ValidationError::ImageTooLarge { .. }) => "image-too-large",
            FacereelError::Validation(ValidationError::InvalidImage(_)) => "invalid-image",
            FacereelError::Validation(ValidationError::MissingGroupId) => "group-not-found",
            FacereelError::NoFaceDetected => "no-faces-detected",
            FacereelError::Extraction(_) => "extraction-error",
            FacereelError::Persistence(_) => "persistence-error",
            FacereelError::AssetNotFound(AssetNotFoundError::GroupNotFound(_)) => "group-not-found",
            FacereelError::AssetNotFound(AssetNotFoundError::NoImagesForGroup(_)) => {
                "no-images-for-group"
            }
            FacereelError::Render(_) => "render-error",
        }
    }

    /// Extended detail for operators; only render failures carry more than the message.
    pub fn details(&self) -> Option<String> {
        match self {
            FacereelError::Render(e) => Some(e.diagnostics()),
            _ => None,
        }
    }
}
