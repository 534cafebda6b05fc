use thiserror::Error;

/// Typed error hierarchy for rolodex.
///
/// Use at module boundaries (store calls, ledger verbs, classifier and delivery calls).
/// Internal/leaf functions can continue using `anyhow::Result`; the `Internal` variant
/// allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum RolodexError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Contact '{name}' not found")]
    ContactNotFound { name: String },

    #[error("Classifier error: {message}")]
    Classifier { message: String, retryable: bool },

    #[error("Delivery error: {channel}: {message}")]
    Delivery { channel: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RolodexError {
    /// Whether this error is transient and the operation could be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Classifier { retryable, .. } => *retryable,
            Self::Storage(_) | Self::Delivery { .. } | Self::Internal(_) => true,
            Self::Auth(_) | Self::Config(_) | Self::ContactNotFound { .. } => false,
        }
    }
}

impl From<rusqlite::Error> for RolodexError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
