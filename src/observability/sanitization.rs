use std::fmt;

use tracing::warn;

/// Configuration for sensitive data sanitization
#[derive(Clone, Debug)]
pub struct SanitizationConfig {
    /// Whether to redact buyer email addresses and phone numbers
    pub sanitize_contacts: bool,
    /// Maximum characters to show from start/end of sensitive data
    pub partial_show_chars: usize,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            sanitize_contacts: true,
            partial_show_chars: 4,
        }
    }
}

/// A wrapper for sensitive data that implements safe Display
#[derive(Clone, Debug)]
pub struct SensitiveData<T> {
    inner: T,
    data_type: SensitiveDataType,
    config: SanitizationConfig,
}

#[derive(Clone, Debug, Copy)]
pub enum SensitiveDataType {
    /// Gateway signature over order id and payment id
    GatewaySignature,
    /// Bearer token for the backend
    BearerToken,
    /// Buyer email or phone
    ContactInfo,
    /// Payment or transaction reference
    PaymentReference,
}

impl SensitiveDataType {
    fn display_name(&self) -> &'static str {
        match self {
            Self::GatewaySignature => "signature",
            Self::BearerToken => "token",
            Self::ContactInfo => "contact",
            Self::PaymentReference => "reference",
        }
    }
}

impl<T: fmt::Display> SensitiveData<T> {
    pub fn new(data: T, data_type: SensitiveDataType) -> Self {
        Self {
            inner: data,
            data_type,
            config: SanitizationConfig::default(),
        }
    }

    pub fn with_config(data: T, data_type: SensitiveDataType, config: SanitizationConfig) -> Self {
        Self {
            inner: data,
            data_type,
            config,
        }
    }

    /// Get the raw inner value
    pub fn inner(&self) -> &T {
        warn!(
            data_type = self.data_type.display_name(),
            "Raw sensitive data accessed"
        );
        &self.inner
    }

    fn sanitized_repr(&self) -> String {
        let original = self.inner.to_string();

        let should_sanitize = match self.data_type {
            SensitiveDataType::GatewaySignature => true,
            SensitiveDataType::BearerToken => true,
            SensitiveDataType::ContactInfo => self.config.sanitize_contacts,
            SensitiveDataType::PaymentReference => false,
        };

        if !should_sanitize {
            return original;
        }

        let chars: Vec<char> = original.chars().collect();
        let len = chars.len();
        let show = self.config.partial_show_chars;
        if len <= show * 2 {
            format!(
                "[REDACTED_{}]",
                self.data_type.display_name().to_uppercase()
            )
        } else {
            let start: String = chars[..show].iter().collect();
            let end: String = chars[len - show..].iter().collect();
            format!(
                "{}[REDACTED_{}_{}_CHARS]{}",
                start,
                self.data_type.display_name().to_uppercase(),
                len - show * 2,
                end
            )
        }
    }
}

impl<T: fmt::Display> fmt::Display for SensitiveData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sanitized_repr())
    }
}

pub fn sanitize_signature<T: fmt::Display>(signature: T) -> SensitiveData<T> {
    SensitiveData::new(signature, SensitiveDataType::GatewaySignature)
}

pub fn sanitize_token<T: fmt::Display>(token: T) -> SensitiveData<T> {
    SensitiveData::new(token, SensitiveDataType::BearerToken)
}

pub fn sanitize_contact<T: fmt::Display>(contact: T) -> SensitiveData<T> {
    SensitiveData::new(contact, SensitiveDataType::ContactInfo)
}

pub fn sanitize_reference<T: fmt::Display>(reference: T) -> SensitiveData<T> {
    SensitiveData::new(reference, SensitiveDataType::PaymentReference)
}
