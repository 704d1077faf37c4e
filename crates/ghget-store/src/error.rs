use ghget_model::{ModelError, UpdateState};
use sled::transaction::TransactionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Serialization Error {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database Error {0}")]
    Database(#[from] sled::Error),
    #[error("invalid record: {0}")]
    Invalid(#[from] ModelError),
    #[error("update event not found: {0}")]
    EventNotFound(String),
    #[error("update event {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: UpdateState,
        to: UpdateState,
    },
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(err: TransactionError<StoreError>) -> Self {
        match err {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => StoreError::Database(err),
        }
    }
}
