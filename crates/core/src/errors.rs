use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("code must not be empty")]
    EmptyCode,
    #[error("code exceeds {0} characters")]
    CodeTooLong(usize),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage io error: {0}")]
    StorageIo(String),
    #[error("internal error: {0}")]
    Internal(String),
}
