use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use url::Url;

/// Well-known location of the hosted checkout script
pub const DEFAULT_CHECKOUT_SCRIPT_URL: &str = "https://checkout.razorpay.com/v1/checkout.js";

/// Configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the rental backend REST API
    #[serde(rename = "api-base-url", default = "default_api_base_url")]
    pub api_base_url: String,

    /// Bearer token issued by the auth service (optional)
    #[serde(rename = "auth-token", default)]
    pub auth_token: Option<String>,

    /// Per-request timeout for backend calls
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Status poll cadence while waiting for cash confirmation
    #[serde(rename = "poll-interval-secs", default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Hosted checkout settings
    #[serde(rename = "checkout", default)]
    pub checkout: CheckoutConfig,

    /// Logging settings
    #[serde(rename = "logging", default)]
    pub logging: LogSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutConfig {
    #[serde(rename = "script-url", default = "default_script_url")]
    pub script_url: String,

    /// Publishable gateway key, used when the backend does not send one
    #[serde(rename = "key", default)]
    pub key: Option<String>,

    #[serde(rename = "merchant-name", default = "default_merchant_name")]
    pub merchant_name: String,

    #[serde(rename = "currency", default = "default_currency")]
    pub currency: String,

    #[serde(rename = "theme-color", default = "default_theme_color")]
    pub theme_color: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            script_url: default_script_url(),
            key: None,
            merchant_name: default_merchant_name(),
            currency: default_currency(),
            theme_color: default_theme_color(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogSettings {
    #[serde(rename = "level", default = "default_log_level")]
    pub level: String,

    #[serde(rename = "file-output", default)]
    pub file_output: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            auth_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            checkout: CheckoutConfig::default(),
            logging: LogSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file atomically
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;

        // Write to temporary file first
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, contents)?;

        match std::fs::rename(&temp_path, path) {
            Ok(_) => Ok(()),
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e.into())
            }
        }
    }

    /// Load the configuration file, writing defaults when it does not exist.
    /// Returns whether the file was created.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();

        if path.exists() {
            return Ok((Self::load_from_file(path)?, false));
        }

        let config = Self::default();
        config.save_to_file(path)?;
        Ok((config, true))
    }

    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        Url::parse(&self.checkout.script_url)
            .map_err(|e| anyhow::anyhow!("Invalid checkout script-url: {}", e))?;
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll-interval-secs must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request-timeout-secs must be greater than zero");
        }
        Ok(())
    }

    /// Parsed API base URL, always ending in a slash so joins keep the path
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.api_base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url =
            Url::parse(&raw).map_err(|e| anyhow::anyhow!("Invalid api-base-url: {}", e))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(anyhow::anyhow!("Unsupported api-base-url scheme: {}", scheme)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check if requests are authenticated
    pub fn is_auth_enabled(&self) -> bool {
        self.auth_token.is_some()
    }
}

// Default value functions
fn default_api_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_script_url() -> String {
    DEFAULT_CHECKOUT_SCRIPT_URL.to_string()
}

fn default_merchant_name() -> String {
    "RoomRent Pro".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_theme_color() -> String {
    "#3B82F6".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
