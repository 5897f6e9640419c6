//! Crate-level error type.

use thiserror::Error;

/// Generic message used when the server rejects a request without a `detail`.
pub const GENERIC_API_ERROR: &str = "API Error";

/// Errors surfaced by the transport, the session, and the configuration layer.
///
/// Store mutations never fail; everything here originates from I/O, decoding,
/// or a user action that is not allowed in the current session state.
#[derive(Debug, Error)]
pub enum SantaError {
    /// The server answered with a non-success status.
    #[error("{message}")]
    Api { status: u16, message: String },
    /// The addressed room, poll or participant does not exist. `message` is
    /// the server's own wording, e.g. "Poll not found".
    #[error("{message}")]
    NotFound { status: u16, message: String },
    /// The request could not be sent or its body could not be read.
    #[error("network error: {0}")]
    Network(String),
    /// The live channel failed.
    #[error("live channel error: {0}")]
    Channel(String),
    /// A payload was not the JSON shape we expected.
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
    /// User input rejected before any request was made.
    #[error("{0}")]
    Validation(String),
    #[error("not currently in a room")]
    NotInRoom,
    #[error("only the host can do that")]
    NotHost,
    #[error("the draw has already happened")]
    AlreadyStarted,
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SantaError>;

impl SantaError {
    /// Build the error for a non-success response.
    ///
    /// A 404, or any server message mentioning "not found", is classified as
    /// [`SantaError::NotFound`] and keeps the server's message.
    pub fn from_status(status: u16, detail: Option<String>) -> Self {
        let message = detail.unwrap_or_else(|| GENERIC_API_ERROR.to_string());
        if status == 404 || message.to_lowercase().contains("not found") {
            return SantaError::NotFound { status, message };
        }
        SantaError::Api { status, message }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        SantaError::NotFound {
            status: 404,
            message: message.into(),
        }
    }

    /// Whether the addressed resource is gone. Only a pull of the room itself
    /// turns this into "room closed".
    pub fn is_not_found(&self) -> bool {
        matches!(self, SantaError::NotFound { .. })
    }
}

impl From<reqwest::Error> for SantaError {
    fn from(e: reqwest::Error) -> Self {
        SantaError::Network(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SantaError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SantaError::Channel(e.to_string())
    }
}
