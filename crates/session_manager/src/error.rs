//! Session manager error types

use chat_backend::BackendError;
use chat_stream::StreamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("This operation requires a signed-in conversation")]
    GuestMode,

    #[error("This operation is only available to guest sessions")]
    PersistentMode,

    #[error("No active conversation")]
    NoActiveConversation,
}
