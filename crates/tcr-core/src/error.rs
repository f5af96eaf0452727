use thiserror::Error;

pub type Result<T> = std::result::Result<T, TokenError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token format: {0}")]
    InvalidFormat(String),

    #[error("Token not found or already used: {0}")]
    NotFoundOrUsed(String),

    #[error("Token store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Remote generation failed: {0}")]
    RemoteGenerationFailure(String),

    #[error("No invocations left, redeem a new token")]
    QuotaExhausted,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TokenError {
    /// True for the two denials a caller may show as "wrong or used token".
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            TokenError::InvalidFormat(_) | TokenError::NotFoundOrUsed(_)
        )
    }
}

impl From<tcr_network::NetworkError> for TokenError {
    fn from(e: tcr_network::NetworkError) -> Self {
        TokenError::RemoteGenerationFailure(e.to_string())
    }
}
