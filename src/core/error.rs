use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Store '{0}' not found")]
    StoreNotFound(String),

    #[error("Malformed stored document: {0}")]
    MalformedStoredDocument(String),

    #[error("Missing identifier: {0}")]
    MissingIdentifier(String),

    #[error("Backend failure: {0}")]
    BackendFailure(String),

    #[error("Operation queue closed")]
    QueueClosed,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::BackendFailure(msg.into())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::BackendFailure(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::BackendFailure(format!("JSON error: {}", err))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::BackendFailure(format!("blocking task failed: {}", err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::BackendFailure(format!("connection lock poisoned: {}", err))
    }
}
