pub mod correlation;
pub mod logging;
pub mod sanitization;


pub use correlation::{FlowContext, CORRELATION_ID_HEADER, REQUEST_ID_HEADER};
pub use logging::{init_logging, LoggingConfig};
pub use sanitization::{
    sanitize_contact, sanitize_reference, sanitize_signature, sanitize_token,
    SanitizationConfig, SensitiveData, SensitiveDataType,
};
