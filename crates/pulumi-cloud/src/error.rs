use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not authorized for stack {identity} (HTTP {status}); check the access token")]
    Auth { identity: String, status: u16 },

    #[error("not found: {identity}")]
    NotFound { identity: String },

    #[error("management API returned HTTP {status} for stack {identity}: {body}")]
    UpstreamUnavailable {
        identity: String,
        status: u16,
        body: String,
    },

    #[error("request for stack {identity} failed: {source}")]
    Transport {
        identity: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid response for stack {identity}: {message}")]
    Decode { identity: String, message: String },

    #[error("invalid management API URL: {0}")]
    InvalidUrl(String),

    #[error("cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ApiError {
    /// Server-side and transport failures are worth another attempt;
    /// auth, not-found and other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::UpstreamUnavailable { status, .. } => *status >= 500 || *status == 429,
            ApiError::Transport { .. } => true,
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth { .. })
    }
}
