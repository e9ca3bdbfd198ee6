/// Error types for the fleet API layer
use thiserror::Error;

/// Failures surfaced by every Fleet Client accessor
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The request never reached the server or no response came back
    #[error("Erreur réseau : {0}")]
    Network(String),

    /// HTTP 401; the session is no longer valid
    #[error("Non autorisé")]
    Unauthorized,

    /// The server processed the request and refused it
    #[error("{message}")]
    Rejected {
        /// HTTP status code returned by the API
        status: u16,
        /// Server-provided reason (`error` field of the JSON body)
        message: String,
    },

    /// The response body did not match the expected shape
    #[error("Réponse invalide : {0}")]
    Decode(String),

    /// The session guard refused to send because the session is torn down
    #[error("Session fermée")]
    SessionClosed,
}

impl ApiError {
    /// Whether the failure belongs to the session rather than to the request.
    pub fn ends_session(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::SessionClosed)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
