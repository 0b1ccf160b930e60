use thiserror::Error;

/// Errors surfaced by the predictive engine and its collaborators.
///
/// Several conditions a trading loop runs into are deliberately *not* errors:
/// insufficient funds is a skipped entry, a stale probability is reused, and a
/// training window without positive labels falls back to unit class weight.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Sequence too short for the indicator warm-up plus the label horizon
    #[error("Insufficient data: need {needed} rows, got {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Model error: {0}")]
    Model(String),

    /// Order rejected by the execution collaborator; position state is unchanged
    #[error("Execution failure: {0}")]
    ExecutionFailure(String),

    /// Commit applied to a machine in the wrong state
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = EngineError::InsufficientData {
            needed: 70,
            available: 12,
        };
        assert_eq!(err.to_string(), "Insufficient data: need 70 rows, got 12");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
