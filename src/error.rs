use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid account: {0}")]
    InvalidAccount(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Service error [{code}] (HTTP {status}): {message}")]
    Service {
        status: u16,
        code: i64,
        message: String,
    },
    #[error("Stale ownership: {0}")]
    StaleOwnership(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Timed out after {0}ms")]
    Timeout(u64),
    #[error("Operation cancelled")]
    Cancelled,
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    /// Transport and service failures may succeed on a later attempt.
    /// Everything else points at the caller's input or at stale state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Network(_) | LedgerError::Service { .. })
    }

    /// The service reports a head or owner mismatch as a conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Service { status: 409, .. })
    }

    /// Rewrites a conflict into `StaleOwnership`; other errors pass through.
    pub fn into_stale_if_conflict(self, context: &str) -> Self {
        match self {
            LedgerError::Service { status: 409, message, .. } => {
                LedgerError::StaleOwnership(format!("{}: {}", context, message))
            }
            other => other,
        }
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LedgerError::Serialization(err.to_string())
        } else {
            LedgerError::Network(err.to_string())
        }
    }
}

impl From<hex::FromHexError> for LedgerError {
    fn from(err: hex::FromHexError) -> Self {
        LedgerError::Encoding(format!("invalid hex: {}", err))
    }
}

impl From<bs58::decode::Error> for LedgerError {
    fn from(err: bs58::decode::Error) -> Self {
        LedgerError::Encoding(format!("invalid base58: {}", err))
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}
