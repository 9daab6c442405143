//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `STOREFRONT_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `SHIPPING_RATES_PATH` - YAML rate table (default: `crates/storefront/config/shipping_rates.yaml`)
//! - `STORE_CURRENCY` - ISO currency code orders are recorded in (default: EGP)
//! - `PHONE_PREFIX` - Required prefix of local phone numbers (default: 01)
//! - `PHONE_DIGITS` - Digit count of local phone numbers (default: 11)
//! - `CHECKOUT_VALIDATION_MODE` - `first_failure` or `aggregate` (default: `first_failure`)
//! - `CHECKOUT_STEP_TIMEOUT_MS` - Timeout per remote checkout step (default: 5000)
//! - `CHECKOUT_MAX_RETRIES` - Retries per idempotent checkout step (default: 2)
//! - `CHECKOUT_RETRY_BACKOFF_MS` - Initial retry delay, doubled per retry (default: 100)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name (default: development)
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Performance trace sample rate (default: 0.1)

use std::collections::HashMap;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use souq_core::{CurrencyCode, PhoneFormat};

use crate::services::checkout::{BackoffStrategy, CheckoutSettings, StepPolicy, ValidationMode};

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Location of the shipping rate table
    pub shipping_rates_path: PathBuf,
    /// Checkout behaviour
    pub checkout: CheckoutConfig,
    /// Error tracking
    pub sentry: SentryConfig,
}

/// Checkout settings as read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Currency orders are recorded in
    pub currency: CurrencyCode,
    /// Required prefix of local phone numbers
    pub phone_prefix: String,
    /// Digit count of local phone numbers
    pub phone_digits: usize,
    /// First-failure or aggregate validation
    pub validation_mode: ValidationMode,
    /// Timeout per remote step
    pub step_timeout: Duration,
    /// Retries per idempotent step
    pub max_retries: u32,
    /// Initial retry delay
    pub retry_backoff: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: CurrencyCode::EGP,
            phone_prefix: "01".to_owned(),
            phone_digits: 11,
            validation_mode: ValidationMode::FirstFailure,
            step_timeout: Duration::from_millis(5000),
            max_retries: 2,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Sentry configuration.
///
/// Implements `Debug` manually to redact the DSN.
#[derive(Clone, Default)]
pub struct SentryConfig {
    /// Sentry DSN; error tracking is off when unset
    pub dsn: Option<String>,
    /// Environment tag
    pub environment: String,
    /// Error event sample rate
    pub sample_rate: f32,
    /// Performance trace sample rate
    pub traces_sample_rate: f32,
}

impl std::fmt::Debug for SentryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentryConfig")
            .field("dsn", &self.dsn.as_ref().map(|_| "[REDACTED]"))
            .field("environment", &self.environment)
            .field("sample_rate", &self.sample_rate)
            .field("traces_sample_rate", &self.traces_sample_rate)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = parse_env_or_default("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env_or_default("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        let session_secret = get_validated_secret("STOREFRONT_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "STOREFRONT_SESSION_SECRET")?;
        let shipping_rates_path = PathBuf::from(get_env_or_default(
            "SHIPPING_RATES_PATH",
            "crates/storefront/config/shipping_rates.yaml",
        ));

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            shipping_rates_path,
            checkout: CheckoutConfig::from_env()?,
            sentry: SentryConfig::from_env()?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the public URL is served over TLS.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl CheckoutConfig {
    /// Load checkout settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` for unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let phone_digits: usize = parse_env_or_default("PHONE_DIGITS", "11")?;
        let phone_prefix = get_env_or_default("PHONE_PREFIX", "01");
        if !phone_prefix.chars().all(|c| c.is_ascii_digit()) || phone_prefix.len() > phone_digits {
            return Err(ConfigError::InvalidEnvVar(
                "PHONE_PREFIX".to_string(),
                format!("must be at most {phone_digits} digits"),
            ));
        }

        Ok(Self {
            currency: parse_env_or_default("STORE_CURRENCY", "EGP")?,
            phone_prefix,
            phone_digits,
            validation_mode: parse_env_or_default("CHECKOUT_VALIDATION_MODE", "first_failure")?,
            step_timeout: Duration::from_millis(parse_env_or_default(
                "CHECKOUT_STEP_TIMEOUT_MS",
                "5000",
            )?),
            max_retries: parse_env_or_default("CHECKOUT_MAX_RETRIES", "2")?,
            retry_backoff: Duration::from_millis(parse_env_or_default(
                "CHECKOUT_RETRY_BACKOFF_MS",
                "100",
            )?),
        })
    }

    /// The settings the checkout orchestrator runs with.
    #[must_use]
    pub fn settings(&self) -> CheckoutSettings {
        let backoff = if self.retry_backoff.is_zero() {
            BackoffStrategy::None
        } else {
            BackoffStrategy::Exponential {
                base: self.retry_backoff,
                max: MAX_BACKOFF.max(self.retry_backoff),
            }
        };
        CheckoutSettings {
            currency: self.currency,
            phone_format: PhoneFormat::new(self.phone_prefix.clone(), self.phone_digits),
            validation_mode: self.validation_mode,
            step_policy: StepPolicy::new(self.step_timeout, self.max_retries, backoff),
        }
    }
}

impl SentryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            dsn: get_optional_env("SENTRY_DSN").filter(|dsn| !dsn.is_empty()),
            environment: get_env_or_default("SENTRY_ENVIRONMENT", "development"),
            sample_rate: parse_env_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            traces_sample_rate: parse_env_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
