use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScribeError {
    /// Dataset file could not be read or written.
    #[error("dataset {}: {source}", .path.display())]
    DatasetIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Dataset file content does not fit the expected JSON shape.
    #[error("dataset {}: {source}", .path.display())]
    DatasetJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// One example inside an otherwise readable dataset breaks an invariant.
    #[error("example {index}: {message}")]
    InvalidExample { index: usize, message: String },
    #[error("config {field}: {message}")]
    InvalidConfig {
        field: &'static str,
        message: String,
    },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    /// Tensor or engine failure, wrapped with the operation that hit it.
    #[error("{context}: {message}")]
    Runtime {
        context: &'static str,
        message: String,
    },
}

impl ScribeError {
    pub(crate) fn dataset_io(path: &Path, source: std::io::Error) -> Self {
        Self::DatasetIo {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn dataset_json(path: &Path, source: serde_json::Error) -> Self {
        Self::DatasetJson {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn invalid_example(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidExample {
            index,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn runtime(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Runtime {
            context,
            message: err.to_string(),
        }
    }
}
