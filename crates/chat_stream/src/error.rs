use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stream request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    /// The server reported an error inside a frame.
    #[error("{0}")]
    Server(String),

    #[error("Stream closed before completion")]
    Closed,
}
