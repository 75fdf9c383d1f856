/// Error type shared by the engine and its storage and ledger seams
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Strategy not found: {0}")]
    StrategyNotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("State store error: {0}")]
    Store(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Ledger call timed out after {seconds} seconds")]
    LedgerTimeout { seconds: u64 },

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Amount overflow: {0}")]
    AmountOverflow(String),
}

/// How a failure affects the run that observed it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Recorded as a failed attempt, the loop continues
    Attempt,
    /// Aborts the run before any attempt
    Configuration,
    /// Aborts the run mid-flight
    Infrastructure,
}

impl SwapError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        SwapError::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SwapError::Ledger(_) | SwapError::LedgerTimeout { .. } => ErrorCategory::Attempt,
            SwapError::Config(_)
            | SwapError::InvalidConfig { .. }
            | SwapError::StrategyNotFound(_)
            | SwapError::AmountOverflow(_) => ErrorCategory::Configuration,
            SwapError::Database(_)
            | SwapError::Store(_)
            | SwapError::Notify(_)
            | SwapError::Serialization(_)
            | SwapError::Io(_) => ErrorCategory::Infrastructure,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

pub type SwapResult<T> = Result<T, SwapError>;
