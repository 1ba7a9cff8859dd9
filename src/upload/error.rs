// Error types for the ingestion pipeline.
//
// `RequestError` aborts a whole upload request before any file is processed.
// `ProcessingError` is scoped to a single uploaded file and never affects its
// siblings.

use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort the whole request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("mkdir {}: {source}", path.display())]
    DirectoryPreparation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("multipart: {0}")]
    MultipartParse(String),

    #[error("multipart: {0}")]
    BodyTooLarge(String),

    #[error("spool upload: {0}")]
    Spool(#[source] std::io::Error),

    #[error("identity {0:?} cannot name a storage directory")]
    UnusableIdentity(String),
}

/// Failures that abort only the pipeline of the file they belong to.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("error loading file {file_name}: file type is not supported. png, jpeg, heic are allowed (got {content_type})")]
    UnsupportedMediaType {
        file_name: String,
        content_type: String,
    },

    #[error("error loading file {file_name}: heic is not supported yet")]
    HeicNotSupported { file_name: String },

    #[error("error decoding file {file_name}: {reason}")]
    DecodeFailure { file_name: String, reason: String },

    #[error("error writing {}: {source}", path.display())]
    FilesystemFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error encoding {}: {reason}", path.display())]
    EncodeFailure { path: PathBuf, reason: String },

    #[error("error generating stored identifier: {0}")]
    IdentifierGenerationFailure(String),

    #[error("worker task failed: {0}")]
    TaskFailure(String),
}

impl ProcessingError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedMediaType { .. } => "UNSUPPORTED_MEDIA_TYPE",
            Self::HeicNotSupported { .. } => "HEIC_NOT_SUPPORTED",
            Self::DecodeFailure { .. } => "DECODE_FAILURE",
            Self::FilesystemFailure { .. } => "FILESYSTEM_FAILURE",
            Self::EncodeFailure { .. } => "ENCODE_FAILURE",
            Self::IdentifierGenerationFailure(_) => "IDENTIFIER_GENERATION_FAILURE",
            Self::TaskFailure(_) => "TASK_FAILURE",
        }
    }
}
