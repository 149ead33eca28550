//! Error types shared by the publish endpoint, the work-directory guard and
//! the HTTP front end.

use std::io;
use std::path::PathBuf;

/// Errors raised while opening or resolving paths inside the work directory.
#[derive(Debug, thiserror::Error)]
pub enum WorkDirError {
    #[error("work directory {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("path {0:?} escapes the work directory")]
    Escape(String),

    #[error("path {0:?} not found")]
    NotFound(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WorkDirError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        WorkDirError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by a [`Publish`](crate::publish::Publish) implementation.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("invalid project name {0:?}: must be a single path segment")]
    InvalidProject(String),

    #[error("unsafe document path {0:?}: must stay inside the project directory")]
    UnsafePath(String),

    #[error("failed writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PublishError {
    /// Rejections that happen before anything touches the disk.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            PublishError::InvalidProject(_) | PublishError::UnsafePath(_)
        )
    }
}

/// Errors seen by [`PublishClient`](crate::publish::PublishClient) callers.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to read {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("path {0} is not valid UTF-8")]
    NonUtf8Path(PathBuf),

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response line exceeds the maximum length")]
    ResponseTooLarge,

    #[error("connection closed before a response arrived")]
    ConnectionClosed,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("publish rejected ({code}): {message}")]
    Remote { code: i64, message: String },
}

impl From<tokio_util::codec::LinesCodecError> for ClientError {
    fn from(err: tokio_util::codec::LinesCodecError) -> Self {
        match err {
            tokio_util::codec::LinesCodecError::Io(e) => ClientError::Io(e),
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => {
                ClientError::ResponseTooLarge
            }
        }
    }
}

#[cfg(feature = "server")]
pub use http::{ErrorDetail, ErrorResponse, ServerError, ServerResult};

#[cfg(feature = "server")]
mod http {
    use super::WorkDirError;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use serde::{Deserialize, Serialize};

    pub type ServerResult<T> = Result<T, ServerError>;

    /// HTTP front end error types
    #[derive(Debug, thiserror::Error)]
    pub enum ServerError {
        #[error("Unauthorized: {0}")]
        Unauthorized(String),

        #[error("Internal server error: {0}")]
        Internal(String),

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Not found")]
        NotFound,
    }

    /// API error response structure
    #[derive(Debug, Serialize, Deserialize)]
    pub struct ErrorResponse {
        pub error: ErrorDetail,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ErrorDetail {
        pub code: String,
        pub message: String,
    }

    impl ServerError {
        /// Get HTTP status code for this error
        pub fn status_code(&self) -> StatusCode {
            match self {
                ServerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                ServerError::NotFound => StatusCode::NOT_FOUND,
                ServerError::Internal(_) | ServerError::Config(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }

        /// Get error code string
        fn error_code(&self) -> &'static str {
            match self {
                ServerError::Unauthorized(_) => "UNAUTHORIZED",
                ServerError::Internal(_) => "INTERNAL_ERROR",
                ServerError::Config(_) => "CONFIG_ERROR",
                ServerError::NotFound => "NOT_FOUND",
            }
        }
    }

    impl IntoResponse for ServerError {
        fn into_response(self) -> Response {
            let status = self.status_code();
            if status.is_server_error() {
                tracing::error!(error = %self, "request failed");
            }

            let body = Json(ErrorResponse {
                error: ErrorDetail {
                    code: self.error_code().to_string(),
                    message: self.to_string(),
                },
            });

            (status, body).into_response()
        }
    }

    impl From<WorkDirError> for ServerError {
        fn from(err: WorkDirError) -> Self {
            match err {
                WorkDirError::Escape(path) => {
                    tracing::warn!(path = %path, "rejected path outside served root");
                    ServerError::Unauthorized(format!("path {path:?} is outside the served root"))
                }
                WorkDirError::NotFound(_) => ServerError::NotFound,
                other => ServerError::Internal(other.to_string()),
            }
        }
    }

    impl From<std::io::Error> for ServerError {
        fn from(err: std::io::Error) -> Self {
            ServerError::Internal(format!("IO error: {err}"))
        }
    }

    impl From<minijinja::Error> for ServerError {
        fn from(err: minijinja::Error) -> Self {
            ServerError::Internal(format!("template error: {err}"))
        }
    }

    impl From<tokio::task::JoinError> for ServerError {
        fn from(err: tokio::task::JoinError) -> Self {
            ServerError::Internal(format!("blocking task failed: {err}"))
        }
    }
}
