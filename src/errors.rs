use serde::Serialize;

/// All engine errors. Insufficient data is never an error; only malformed
/// configuration is.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    // ── Configuration ──
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Parameter sweep ──
    #[error("Invalid value {value} for sweep parameter '{parameter}': {reason}")]
    InvalidSweepValue {
        parameter: String,
        value: f64,
        reason: String,
    },
}

impl EngineError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidConfig(_) => "INVALID_CONFIG",
            EngineError::InvalidSweepValue { .. } => "INVALID_SWEEP_VALUE",
        }
    }
}

/// Serializable error response for the reporting layer.
#[derive(Debug, Serialize, Clone)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        ErrorResponse {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl Serialize for EngineError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        ErrorResponse::from(self).serialize(serializer)
    }
}
