use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("db error: {0}")]
    Db(#[from] monitor_db::DbError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("append is not supported in read-only mode")]
    ReadOnly,
    #[error("remote call timed out: {0}")]
    RemoteTimeout(String),
    #[error("remote call failed: {0}")]
    Remote(String),
    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::RemoteTimeout(err.to_string())
        } else {
            AppError::Remote(err.to_string())
        }
    }
}

/// Wire shape for errors crossing the HTTP boundary.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ApiError {
    /// Reconstruct the nearest application error from a wire error, so a
    /// condition like read-only rejection survives a hop through a remote
    /// server.
    pub fn into_app_error(self) -> AppError {
        match self.code.as_deref() {
            Some("invalid_input") => AppError::InvalidInput(self.message),
            Some("not_found") => AppError::NotFound(self.message),
            Some("read_only") => AppError::ReadOnly,
            _ => AppError::Remote(self.message),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let (status, code) = match err {
            AppError::InvalidInput(_) => (400, Some("invalid_input".to_string())),
            AppError::NotFound(_) => (404, Some("not_found".to_string())),
            AppError::ReadOnly => (403, Some("read_only".to_string())),
            AppError::RemoteTimeout(_) => (504, Some("remote_timeout".to_string())),
            AppError::Remote(_) => (502, Some("remote".to_string())),
            AppError::Db(_) | AppError::Io(_) | AppError::Serde(_) | AppError::Message(_) => {
                (500, None)
            }
        };
        Self {
            status,
            message: err.to_string(),
            code,
        }
    }
}
