use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("repository is required")]
    EmptyRepository,

    #[error("repository must be in owner/repo format: {0}")]
    InvalidRepository(String),

    #[error("owner must not be empty")]
    EmptyOwner,

    #[error("repo must not be empty")]
    EmptyRepo,

    #[error("timeout must be within [{min}, {max}] seconds, got {actual}")]
    TimeoutOutOfRange { min: u32, max: u32, actual: u32 },
}
