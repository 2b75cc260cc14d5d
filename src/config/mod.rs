//! Configuration loading and management.
//!
//! Loads service configuration from `./otpgate.toml` (or
//! `$OTPGATE_CONFIG_PATH`). Environment variables override file values;
//! file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::delivery::queue::QueueSettings;
use crate::driver::webdriver::{BrowserKind, WebDriverSettings};

/// Top-level service configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// HTTP API settings (`[api]`).
    pub api: ApiConfig,
    /// Browser session settings (`[session]`).
    pub session: SessionConfig,
    /// Delivery queue settings (`[delivery]`).
    pub delivery: DeliveryConfig,
    /// Scheduled dispatcher settings (`[scheduler]`).
    pub scheduler: SchedulerConfig,
    /// Filesystem paths (`[paths]`).
    pub paths: PathsConfig,
}

impl GateConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$OTPGATE_CONFIG_PATH` or `./otpgate.toml`.
    /// A missing file is not an error; defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: GateConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(GateConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Parse a config from a TOML string (for tests).
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("OTPGATE_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("otpgate.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("OTPGATE_BIND_ADDR") {
            self.api.bind_addr = v;
        }
        if let Some(v) = env("OTPGATE_WEBDRIVER_URL") {
            self.session.webdriver_url = v;
        }
        if let Some(v) = env("OTPGATE_PROFILE_DIR") {
            self.session.profile_dir = v;
        }
        if let Some(v) = env("OTPGATE_COUNTRY_CODE") {
            self.delivery.default_country_code = v;
        }
        if let Some(v) = env("OTPGATE_MAX_RETRIES") {
            match v.parse() {
                Ok(n) => self.delivery.max_retries = n,
                Err(_) => tracing::warn!(
                    var = "OTPGATE_MAX_RETRIES",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("OTPGATE_RATE_LIMIT_PER_MINUTE") {
            match v.parse() {
                Ok(n) => self.delivery.rate_limit_per_minute = n,
                Err(_) => tracing::warn!(
                    var = "OTPGATE_RATE_LIMIT_PER_MINUTE",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Socket address to bind, e.g. `127.0.0.1:5000`.
    pub bind_addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_owned(),
        }
    }
}

/// Browser session settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// WebDriver endpoint (chromedriver / msedgedriver).
    pub webdriver_url: String,
    /// `chrome` or `edge`.
    pub browser: String,
    /// Persistent browser profile directory holding the WhatsApp login.
    pub profile_dir: String,
    /// Process names killed before launch to free the profile lock.
    pub kill_processes: Vec<String>,
    /// Bound on the authentication wait, seconds.
    pub auth_timeout_secs: u64,
    /// Bound on initial page settling, seconds.
    pub page_settle_secs: u64,
    /// Page load timeout handed to the WebDriver session, seconds.
    pub page_load_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://127.0.0.1:9515".to_owned(),
            browser: "chrome".to_owned(),
            profile_dir: "./whatsapp_profile".to_owned(),
            kill_processes: vec!["chrome".to_owned()],
            auth_timeout_secs: 60,
            page_settle_secs: 10,
            page_load_timeout_secs: 60,
        }
    }
}

impl SessionConfig {
    /// Browser flavour parsed from the config string; unknown values fall
    /// back to Chrome with a warning.
    pub fn browser_kind(&self) -> BrowserKind {
        match self.browser.to_ascii_lowercase().as_str() {
            "edge" | "msedge" => BrowserKind::Edge,
            "chrome" | "chromium" => BrowserKind::Chrome,
            other => {
                tracing::warn!(browser = other, "unknown browser, defaulting to chrome");
                BrowserKind::Chrome
            }
        }
    }

    /// Launch settings for the WebDriver session factory.
    pub fn webdriver_settings(&self) -> WebDriverSettings {
        WebDriverSettings {
            webdriver_url: self.webdriver_url.clone(),
            browser: self.browser_kind(),
            profile_dir: PathBuf::from(&self.profile_dir),
            kill_processes: self.kill_processes.clone(),
            page_load_timeout: Duration::from_secs(self.page_load_timeout_secs),
        }
    }
}

/// Delivery queue settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Maximum attempts per request.
    pub max_retries: u32,
    /// Seconds between attempts.
    pub retry_delay_secs: u64,
    /// Queue capacity.
    pub queue_capacity: usize,
    /// Minimum digit count for destinations.
    pub min_destination_digits: usize,
    /// Country code prepended to local numbers (empty disables).
    pub default_country_code: String,
    /// Maximum payload length in characters.
    pub max_payload_chars: usize,
    /// Outbound requests per minute (0 disables the gate).
    pub rate_limit_per_minute: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        let defaults = QueueSettings::default();
        Self {
            max_retries: defaults.max_retries,
            retry_delay_secs: defaults.retry_delay.as_secs(),
            queue_capacity: defaults.capacity,
            min_destination_digits: defaults.min_destination_digits,
            default_country_code: defaults.default_country_code,
            max_payload_chars: defaults.max_payload_chars,
            rate_limit_per_minute: defaults.rate_limit_per_minute,
        }
    }
}

impl DeliveryConfig {
    /// Queue settings derived from this section.
    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            capacity: self.queue_capacity,
            min_destination_digits: self.min_destination_digits,
            default_country_code: self.default_country_code.clone(),
            max_payload_chars: self.max_payload_chars,
            rate_limit_per_minute: self.rate_limit_per_minute,
        }
    }
}

/// Scheduled dispatcher settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between dispatcher ticks.
    pub tick_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_secs: 30 }
    }
}

/// Filesystem paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// SQLite database file.
    pub database: String,
    /// Directory for rotated JSON logs.
    pub logs_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            database: "./otpgate.db".to_owned(),
            logs_dir: "./logs".to_owned(),
        }
    }
}
