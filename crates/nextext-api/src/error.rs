use nextext_types::api::{ErrorBody, ErrorDetail};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Fallback shown when a failed login carries no usable detail.
pub const LOGIN_FAILED: &str = "Login failed";

/// Fallback shown when a failed registration carries no usable detail.
pub const REGISTRATION_FAILED: &str = "Registration failed";

#[derive(Debug, Error)]
pub enum ClientError {
    /// Login, registration or identity failure. The payload is the message
    /// meant for the user, already normalized.
    #[error("{0}")]
    Auth(String),

    /// REST call failed in transport or with an error status.
    #[error("network error: {0}")]
    Network(String),

    /// Chat channel could not be opened or is no longer usable.
    #[error("channel error: {0}")]
    Channel(String),

    /// A protected call was attempted without a credential. Nothing was sent.
    #[error("not authenticated")]
    Unauthenticated,

    /// Durable credential storage failed.
    #[error("credential store error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Collapse a backend error body into one display string.
///
/// A list `detail` joins each item's `msg` with `"; "`, a string `detail` is
/// used as-is, and anything else (or an empty result) yields `fallback`.
pub fn display_message(body: &[u8], fallback: &str) -> String {
    let message = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: Some(ErrorDetail::Items(items)),
        }) => items
            .iter()
            .map(|item| item.text())
            .collect::<Vec<_>>()
            .join("; "),
        Ok(ErrorBody {
            detail: Some(ErrorDetail::Text(text)),
        }) => text,
        _ => String::new(),
    };

    if message.is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
