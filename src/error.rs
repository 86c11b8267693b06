//! Error types for schema compilation

use std::path::PathBuf;

use thiserror::Error;

/// Result type for compile operations
pub type Result<T> = std::result::Result<T, CompileError>;

/// Schema compilation errors
///
/// Every variant signals a malformed schema document or caller
/// configuration. Problems with the data being validated are reported
/// separately through [`crate::ValidationErrors`].
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Can not find schema reference: {reference}")]
    ReferenceNotFound { reference: String },

    #[error("Could not resolve type: {type_name}")]
    UnknownType { type_name: String },

    #[error("Invalid schema at '{pointer}': {message}")]
    InvalidSchema { pointer: String, message: String },

    #[error("Schema document not found: {0}")]
    DocumentNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompileError {
    pub(crate) fn invalid_schema(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            pointer: pointer.into(),
            message: message.into(),
        }
    }
}
