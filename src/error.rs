use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-level error taxonomy, stable across transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Ok,
    InvalidRequest,
    ModelUnavailable,
    ComplexityEvaluationFailed,
    CostLimitExceeded,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::ModelUnavailable => "MODEL_UNAVAILABLE",
            ErrorCode::ComplexityEvaluationFailed => "COMPLEXITY_EVALUATION_FAILED",
            ErrorCode::CostLimitExceeded => "COST_LIMIT_EXCEEDED",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Complexity evaluation failed: {0}")]
    ComplexityEvaluationFailed(String),

    #[error("Cost limit exceeded: {0}")]
    CostLimitExceeded(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// The wire error code this error maps to. Shared by the HTTP response
    /// mapping and the metrics `failure_kind` field so the two never drift.
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            GatewayError::ModelUnavailable(_) => ErrorCode::ModelUnavailable,
            GatewayError::ComplexityEvaluationFailed(_) => ErrorCode::ComplexityEvaluationFailed,
            GatewayError::CostLimitExceeded(_) => ErrorCode::CostLimitExceeded,
            GatewayError::Provider(_) => ErrorCode::ModelUnavailable,
            _ => ErrorCode::Internal,
        }
    }

    pub fn failure_kind(&self) -> &'static str {
        self.code().as_str()
    }
}

// Convert to HTTP response
impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        use axum::Json;
        use serde_json::json;

        let status = match self.code() {
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::ComplexityEvaluationFailed => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::CostLimitExceeded => StatusCode::PAYMENT_REQUIRED,
            ErrorCode::Internal | ErrorCode::Ok => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": {
                "code": self.code().as_str(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
