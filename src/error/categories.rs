use std::fmt;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    // Client-side errors
    ValidationError,

    // Backend rejections
    AuthenticationError,
    AuthorizationError,
    NotFound,
    Conflict,
    RateLimited,

    // Payment errors
    VerificationError,
    GatewayError,

    // System errors
    NetworkError,
    ServiceUnavailable,
    InternalError,
}

impl ErrorCategory {
    /// HTTP status this category corresponds to on the backend side
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::AuthenticationError => StatusCode::UNAUTHORIZED,
            Self::AuthorizationError => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::VerificationError => StatusCode::PAYMENT_REQUIRED,
            Self::GatewayError => StatusCode::BAD_GATEWAY,
            Self::NetworkError => StatusCode::GATEWAY_TIMEOUT,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a non-2xx backend response to a category
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::AuthenticationError,
            StatusCode::FORBIDDEN => Self::AuthorizationError,
            StatusCode::NOT_FOUND => Self::NotFound,
            StatusCode::CONFLICT => Self::Conflict,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            StatusCode::SERVICE_UNAVAILABLE => Self::ServiceUnavailable,
            StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => Self::NetworkError,
            s if s.is_client_error() => Self::ValidationError,
            _ => Self::InternalError,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::AuthenticationError => "AUTH_FAILED",
            Self::AuthorizationError => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::VerificationError => "VERIFICATION_FAILED",
            Self::GatewayError => "GATEWAY_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationError
                | Self::AuthenticationError
                | Self::AuthorizationError
                | Self::NotFound
                | Self::Conflict
                | Self::RateLimited
                | Self::VerificationError
        )
    }

    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Whether repeating the same request later may succeed without user input
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::ServiceUnavailable | Self::RateLimited
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error_code())
    }
}
