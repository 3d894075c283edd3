pub mod api;
pub mod client_trait;
pub mod error;
pub mod models;

pub use api::client::{build_http_client, HttpChatBackend};
pub use client_trait::ChatBackend;
pub use error::{BackendError, Result};
pub use models::{ChatSummary, StoredMessage};
