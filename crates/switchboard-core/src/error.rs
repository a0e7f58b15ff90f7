//! Error types for Switchboard

use thiserror::Error;

/// Result type alias using Switchboard's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Switchboard error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Embedding errors (E100-E199)
    #[error("Embedding service unavailable: {0}. Check that the embedding host is running.")]
    EmbeddingUnavailable(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding request timed out after {0} seconds")]
    EmbeddingTimeout(u64),

    #[error("Network error: {0}. Check the embedding host address.")]
    NetworkError(#[from] reqwest::Error),

    // Config errors (E200-E299)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // Routing errors (E300-E399)
    #[error("Strategy '{strategy}' abstained: {reason}")]
    StrategyAbstained { strategy: String, reason: String },

    #[error("No experts available for routing")]
    NoExpertsAvailable,

    #[error("Unknown expert '{0}'. Run `switchboard profiles` to see all experts.")]
    UnknownExpert(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmbeddingUnavailable(_) => "E100",
            Self::EmbeddingDimensionMismatch { .. } => "E101",
            Self::EmbeddingTimeout(_) => "E102",
            Self::NetworkError(_) => "E103",
            Self::ConfigurationError(_) => "E200",
            Self::StrategyAbstained { .. } => "E300",
            Self::NoExpertsAvailable => "E301",
            Self::UnknownExpert(_) => "E302",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Json(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::EmbeddingUnavailable(_) | Self::NetworkError(_) => {
                Some("switchboard config get embedding.host".to_string())
            }
            Self::EmbeddingDimensionMismatch { actual, .. } => Some(format!(
                "switchboard config set embedding.dimension {}",
                actual
            )),
            Self::EmbeddingTimeout(_) => {
                Some("switchboard config set embedding.timeout_secs 120".to_string())
            }
            Self::ConfigurationError(_) => Some("switchboard config list".to_string()),
            Self::UnknownExpert(_) => Some("switchboard profiles".to_string()),
            _ => None,
        }
    }

    /// Whether a failed embedding attempt with this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable(_) | Self::EmbeddingTimeout(_) | Self::NetworkError(_)
        )
    }

    /// Shorthand for a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::ConfigurationError(msg.into())
    }
}
