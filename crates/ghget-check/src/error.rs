use ghget_fetch::FetchError;
use ghget_model::ModelError;
use ghget_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckError>;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(FetchError),

    #[error("invalid subscription: {0}")]
    Invalid(#[from] ModelError),

    #[error("update check cancelled")]
    Cancelled,
}

impl From<FetchError> for CheckError {
    fn from(err: FetchError) -> Self {
        if err.is_cancelled() {
            CheckError::Cancelled
        } else {
            CheckError::Fetch(err)
        }
    }
}
