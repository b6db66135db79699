// ABOUTME: Error types for the thumbnail proxy
// ABOUTME: Request/generation failure taxonomy and its mapping to HTTP status codes

use axum::http::StatusCode;
use bytes::Bytes;
use thiserror::Error;

use crate::media::MediaType;
use crate::storage::StoreError;
use crate::tools::ToolError;

/// Rejections raised while parsing or validating a request path.
/// These never reach the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("bad thumbnail path: {0}")]
    BadRequestShape(String),
    #[error("unsupported source file extension '{0}'")]
    UnsupportedSource(String),
    #[error("unsupported thumbnail file extension '{target}' for source '{source_ext}'")]
    UnsupportedTarget { source_ext: String, target: String },
}

/// Failures raised while generating a thumbnail, one variant per step
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("source object {key} not found")]
    SourceNotFound { key: String, source: StoreError },

    #[error("failed to read source object {key}: {source}")]
    SourceRead { key: String, source: StoreError },

    #[error("failed to read metadata of {key}: {source}")]
    MetadataRead { key: String, source: StoreError },

    #[error("failed to stage source in temporary file: {0}")]
    TempFile(#[source] std::io::Error),

    #[error("no thumbnail handler for media type {0}")]
    NoHandlerForMediaType(MediaType),

    #[error("thumbnail generation failed: {0}")]
    GenerationFailed(#[source] ToolError),

    /// The thumbnail exists but could not be persisted. The bytes are kept so
    /// the caller can still serve them.
    #[error("failed to upload thumbnail {key}: {source}")]
    Upload {
        key: String,
        thumbnail: Bytes,
        source: StoreError,
    },
}

impl GenerateError {
    /// Name of the orchestration step that failed, for logs
    pub fn step(&self) -> &'static str {
        match self {
            GenerateError::SourceNotFound { .. } => "open_read",
            GenerateError::SourceRead { .. } => "read_source",
            GenerateError::MetadataRead { .. } => "source_metadata",
            GenerateError::TempFile(_) => "stage_temp_file",
            GenerateError::NoHandlerForMediaType(_) => "select_handler",
            GenerateError::GenerationFailed(_) => "run_tool",
            GenerateError::Upload { .. } => "upload",
        }
    }

    /// Generated bytes that survive the failure, if any
    pub fn thumbnail(&self) -> Option<&Bytes> {
        match self {
            GenerateError::Upload { thumbnail, .. } => Some(thumbnail),
            _ => None,
        }
    }
}

/// Coarse response classes the HTTP layer distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    NotFound,
    BadRequest,
    InternalError,
}

impl ResponseClass {
    pub fn status_code(self) -> StatusCode {
        match self {
            ResponseClass::NotFound => StatusCode::NOT_FOUND,
            ResponseClass::BadRequest => StatusCode::BAD_REQUEST,
            ResponseClass::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&RequestError> for ResponseClass {
    fn from(_: &RequestError) -> Self {
        ResponseClass::BadRequest
    }
}

impl From<&GenerateError> for ResponseClass {
    fn from(err: &GenerateError) -> Self {
        match err {
            GenerateError::SourceNotFound { .. } => ResponseClass::NotFound,
            GenerateError::SourceRead { .. }
            | GenerateError::MetadataRead { .. }
            | GenerateError::TempFile(_)
            | GenerateError::NoHandlerForMediaType(_)
            | GenerateError::GenerationFailed(_)
            | GenerateError::Upload { .. } => ResponseClass::InternalError,
        }
    }
}
