use std::fmt;

use reqwest::StatusCode;
use tracing::{error, warn};

pub mod categories;

pub use categories::ErrorCategory;


#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub message: String,
    /// Individual reasons, populated for validation failures
    pub reasons: Vec<String>,
    /// Upstream HTTP status when the error came from the backend
    pub status: Option<StatusCode>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub correlation_id: Option<String>,
}

impl AppError {
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Validation failure carrying every reason found
    pub fn validation(reasons: Vec<String>) -> Self {
        let message = if reasons.is_empty() {
            "invalid input".to_string()
        } else {
            reasons.join("; ")
        };
        let mut err = Self::with_category(ErrorCategory::ValidationError, message);
        err.reasons = reasons;
        err
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut err = Self::with_category(ErrorCategory::ValidationError, message.clone());
        err.reasons = vec![message];
        err
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::NetworkError, message)
    }

    pub fn verification_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::VerificationError, message)
    }

    pub fn gateway_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::GatewayError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::NotFound, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::InternalError, message)
    }

    /// Build an error from a non-2xx backend response
    pub fn from_response(status: StatusCode, message: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::from_status(status), message).with_status(status)
    }

    pub fn with_category(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            reasons: Vec::new(),
            status: None,
            source: None,
            correlation_id: None,
        }
    }

    /// True when the backend answered with a 4xx status
    pub fn is_rejection(&self) -> bool {
        self.status.map_or(false, |s| s.is_client_error())
    }

    /// Emit the error once at a level matching its category
    pub fn log(&self) {
        if self.category.is_server_error() {
            error!(
                category = ?self.category,
                code = self.category.error_code(),
                message = %self.message,
                status = ?self.status,
                source = ?self.source,
                correlation_id = ?self.correlation_id,
                "Payment operation failed"
            );
        } else {
            warn!(
                category = ?self.category,
                code = self.category.error_code(),
                message = %self.message,
                reasons = ?self.reasons,
                status = ?self.status,
                correlation_id = ?self.correlation_id,
                "Payment operation rejected"
            );
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal_error(err.to_string())
    }
}

// Malformed backend payloads
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal_error(format!("Malformed response body: {}", err)).with_source(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::internal_error(format!("Malformed response body: {}", err))
                .with_source(err);
        }
        if let Some(status) = err.status() {
            return Self::from_response(status, err.to_string()).with_source(err);
        }
        if err.is_timeout() {
            return Self::network_error("Request timed out").with_source(err);
        }
        Self::network_error(format!("Request failed: {}", err)).with_source(err)
    }
}
