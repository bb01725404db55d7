use http::StatusCode;
use thiserror::Error;

/// Why a refresh did not produce a new access token.
///
/// Cloned to every request queued behind the failed refresh.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("malformed refresh response: {0}")]
    MalformedResponse(String),

    #[error("refresh abandoned before completion")]
    Abandoned,
}

impl RefreshError {
    /// Metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            RefreshError::MissingRefreshToken => "missing_refresh_token",
            RefreshError::Rejected { .. } => "rejected",
            RefreshError::Transport(_) => "transport",
            RefreshError::MalformedResponse(_) => "malformed_response",
            RefreshError::Abandoned => "abandoned",
        }
    }
}
