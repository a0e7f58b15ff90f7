//! Error module tests

use crate::error::{Error, Result};

#[test]
fn test_embedding_unavailable_error() {
    let error = Error::EmbeddingUnavailable("HTTP 503".to_string());
    assert_eq!(error.code(), "E100");
    assert_eq!(
        error.suggestion(),
        Some("switchboard config get embedding.host".to_string())
    );
    assert!(error.to_string().contains("HTTP 503"));
    assert!(error.is_retryable());
}

#[test]
fn test_dimension_mismatch_error() {
    let error = Error::EmbeddingDimensionMismatch {
        expected: 768,
        actual: 384,
    };
    assert_eq!(error.code(), "E101");
    assert_eq!(
        error.suggestion(),
        Some("switchboard config set embedding.dimension 384".to_string())
    );
    assert!(error.to_string().contains("768"));
    assert!(!error.is_retryable());
}

#[test]
fn test_timeout_error() {
    let error = Error::EmbeddingTimeout(60);
    assert_eq!(error.code(), "E102");
    assert!(error.to_string().contains("60"));
    assert!(error.is_retryable());
}

#[test]
fn test_configuration_error() {
    let error = Error::config("exploration_rate must be between 0.0 and 1.0");
    assert_eq!(error.code(), "E200");
    assert_eq!(
        error.suggestion(),
        Some("switchboard config list".to_string())
    );
    assert!(error.to_string().contains("exploration_rate"));
    assert!(!error.is_retryable());
}

#[test]
fn test_strategy_abstained_error() {
    let error = Error::StrategyAbstained {
        strategy: "vector".to_string(),
        reason: "boom".to_string(),
    };
    assert_eq!(error.code(), "E300");
    assert_eq!(error.suggestion(), None);
    assert!(error.to_string().contains("vector"));
    assert!(error.to_string().contains("boom"));
}

#[test]
fn test_no_experts_available_error() {
    let error = Error::NoExpertsAvailable;
    assert_eq!(error.code(), "E301");
    assert_eq!(error.suggestion(), None);
}

#[test]
fn test_unknown_expert_error() {
    let error = Error::UnknownExpert("astrology".to_string());
    assert_eq!(error.code(), "E302");
    assert_eq!(error.suggestion(), Some("switchboard profiles".to_string()));
    assert!(error.to_string().contains("astrology"));
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let error: Error = io.into();
    assert_eq!(error.code(), "E9999");
    assert!(error.to_string().contains("missing"));
}

#[test]
fn test_result_alias() {
    fn fails() -> Result<()> {
        Err(Error::InvalidInput("empty prompt".to_string()))
    }
    let err = fails().unwrap_err();
    assert_eq!(err.code(), "E800");
}

#[test]
fn test_error_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Error>();
}
