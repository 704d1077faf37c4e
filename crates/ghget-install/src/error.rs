use ghget_fetch::FetchError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InstallError>;

/// Failures that abort the pipeline before any stage result exists.
///
/// Script and installer failures are not errors; they come back as a
/// `Failed` pipeline state.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("download failed: {0}")]
    Download(#[source] FetchError),

    #[error("pipeline cancelled")]
    Cancelled,
}

impl From<FetchError> for InstallError {
    fn from(err: FetchError) -> Self {
        if err.is_cancelled() {
            InstallError::Cancelled
        } else {
            InstallError::Download(err)
        }
    }
}
