use report_models::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("report not found")]
    NotFound,
    #[error("report is already closed")]
    AlreadyClosed,
    #[error("metadata store error: {0}")]
    MetaDb(#[from] meta_db::MetaDbError),
    #[error("file store error: {0}")]
    FileStore(#[from] report_fs::FileStoreError),
    #[error("entry serialization failed: {0}")]
    Codec(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the error left engine state untouched and can be reported to
    /// the caller as a client-side problem.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_) | EngineError::NotFound | EngineError::AlreadyClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
