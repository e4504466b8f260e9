use tracing::{info_span, Span};
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

const MAX_CORRELATION_ID_LENGTH: usize = 200;

/// Identifies one payment flow across every backend call it makes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowContext {
    pub correlation_id: String,
}

impl FlowContext {
    /// Use the supplied correlation id when it is well-formed, else mint one
    pub fn new(correlation_id: Option<String>) -> Self {
        let correlation_id = correlation_id
            .filter(|id| validate_correlation_id(id).is_ok())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self { correlation_id }
    }

    /// Fresh id for a single request within this flow
    pub fn next_request_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    pub fn span(&self, operation: &'static str) -> Span {
        info_span!(
            "payment_flow",
            operation = operation,
            correlation_id = %self.correlation_id,
        )
    }
}

impl Default for FlowContext {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Validate correlation ID format and length
pub fn validate_correlation_id(correlation_id: &str) -> Result<(), &'static str> {
    if correlation_id.is_empty() {
        return Err("Correlation ID cannot be empty");
    }

    if correlation_id.len() > MAX_CORRELATION_ID_LENGTH {
        return Err("Correlation ID exceeds maximum length");
    }

    if !correlation_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("Correlation ID contains invalid characters");
    }

    Ok(())
}
