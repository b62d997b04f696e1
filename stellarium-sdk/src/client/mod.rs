//! HTTP clients for Horizon and the Telegram Bot API.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the shared types do not pull in `reqwest`.

mod horizon;
mod telegram;

pub use horizon::{HorizonClient, HorizonStream};
pub use telegram::TelegramClient;

use reqwest::StatusCode;

/// Errors produced by the SDK HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("api error: status {status}, body: {body}")]
    Api { status: StatusCode, body: String },

    /// The Bot API answered with `ok: false`.
    #[error("telegram error {code}: {description}")]
    Telegram { code: i64, description: String },

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// Whether the remote rejected the request itself (bad request or
    /// forbidden) rather than failing transiently.
    pub fn is_rejection(&self) -> bool {
        match self {
            ClientError::Telegram { code, .. } => *code == 400 || *code == 403,
            ClientError::Api { status, .. } => {
                *status == StatusCode::BAD_REQUEST || *status == StatusCode::FORBIDDEN
            }
            _ => false,
        }
    }
}
