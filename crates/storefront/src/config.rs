//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `STOREFRONT_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `STRIPE_SECRET_KEY` - Stripe API secret key
//! - `STRIPE_PUBLISHABLE_KEY` - Stripe publishable key (rendered into the checkout page)
//! - `STRIPE_WEBHOOK_SECRET` - Stripe webhook signing secret
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STRIPE_API_BASE` - Stripe API base URL (default: <https://api.stripe.com>)
//! - `STRIPE_CURRENCY` - ISO 4217 currency code, lowercase (default: usd)
//! - `STRIPE_TIMEOUT_SECS` - Upper bound on a single gateway call (default: 10)
//! - `STRIPE_WEBHOOK_TOLERANCE_SECS` - Accepted webhook timestamp skew (default: 300)
//! - `ORDER_NUMBER_PREFIX` - Order number prefix (default: ORD)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use shopclub_core::OrderNumber;
use thiserror::Error;
use url::Url;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

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
    /// Payment gateway configuration
    pub stripe: StripeConfig,
    /// Prefix of every generated order number
    pub order_number_prefix: String,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Stripe payment gateway configuration.
///
/// Passed to [`StripeClient::new`](crate::payments::StripeClient::new) and the
/// webhook verifier at start-up; nothing reads Stripe credentials from the
/// process environment after that.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    /// API secret key (server-side only)
    pub secret_key: SecretString,
    /// Publishable key (safe to expose in browser)
    pub publishable_key: String,
    /// Webhook endpoint signing secret
    pub webhook_secret: SecretString,
    /// API base URL, overridable for tests
    pub api_base: Url,
    /// Lowercase ISO 4217 currency code
    pub currency: String,
    /// Upper bound on a single gateway call
    pub timeout: Duration,
    /// Maximum age of a webhook signature timestamp
    pub webhook_tolerance: Duration,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("publishable_key", &self.publishable_key)
            .field("webhook_secret", &"[REDACTED]")
            .field("api_base", &self.api_base.as_str())
            .field("currency", &self.currency)
            .field("timeout", &self.timeout)
            .field("webhook_tolerance", &self.webhook_tolerance)
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

        Self::from_vars(&|key: &str| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`StorefrontConfig::from_env`].
    pub fn from_vars(vars: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Vars(vars);

        let database_url = env.database_url("STOREFRONT_DATABASE_URL")?;
        let host = env.parsed_or("STOREFRONT_HOST", "127.0.0.1", str::parse::<IpAddr>)?;
        let port = env.parsed_or("STOREFRONT_PORT", "3000", str::parse::<u16>)?;
        let base_url = env.required("STOREFRONT_BASE_URL")?;
        let session_secret = env.validated_secret("STOREFRONT_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "STOREFRONT_SESSION_SECRET")?;

        let stripe = StripeConfig::from_vars(&env)?;

        let order_number_prefix = env.or_default("ORDER_NUMBER_PREFIX", OrderNumber::DEFAULT_PREFIX);
        OrderNumber::validate_prefix(&order_number_prefix).map_err(|e| {
            ConfigError::InvalidEnvVar("ORDER_NUMBER_PREFIX".to_string(), e.to_string())
        })?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            stripe,
            order_number_prefix,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl StripeConfig {
    fn from_vars(env: &Vars<'_>) -> Result<Self, ConfigError> {
        let currency = env.or_default("STRIPE_CURRENCY", "usd");
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(ConfigError::InvalidEnvVar(
                "STRIPE_CURRENCY".to_string(),
                "must be a lowercase three-letter ISO 4217 code".to_string(),
            ));
        }

        Ok(Self {
            secret_key: env.validated_secret("STRIPE_SECRET_KEY")?,
            publishable_key: env.required("STRIPE_PUBLISHABLE_KEY")?,
            webhook_secret: env.validated_secret("STRIPE_WEBHOOK_SECRET")?,
            api_base: env.parsed_or("STRIPE_API_BASE", "https://api.stripe.com", Url::parse)?,
            currency,
            timeout: Duration::from_secs(env.parsed_or(
                "STRIPE_TIMEOUT_SECS",
                "10",
                str::parse::<u64>,
            )?),
            webhook_tolerance: Duration::from_secs(env.parsed_or(
                "STRIPE_WEBHOOK_TOLERANCE_SECS",
                "300",
                str::parse::<u64>,
            )?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup shared by every loader.
struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional variable.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, falling back to a default literal.
    fn parsed_or<T, E: std::fmt::Display>(
        &self,
        key: &str,
        default: &str,
        parse: impl Fn(&str) -> Result<T, E>,
    ) -> Result<T, ConfigError> {
        parse(&self.or_default(key, default))
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    /// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
    fn database_url(&self, primary_key: &str) -> Result<SecretString, ConfigError> {
        (self.0)(primary_key)
            .or_else(|| (self.0)("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
    }

    /// Load and validate a secret.
    fn validated_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        let value = self.required(key)?;
        validate_secret_strength(&value, key)?;
        Ok(SecretString::from(value))
    }
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

    // Real secrets like API keys have high entropy
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SESSION_SECRET: &str = "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6";
    const STRIPE_KEY: &str = "sk_test_4eC39HqLyjWDarjtT1zdp7dc";
    const WEBHOOK_SECRET: &str = "whsec_8fQz1LmN3pR7tV2xK9cB4dH6";

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("STOREFRONT_DATABASE_URL", "postgres://localhost/shopclub"),
            ("STOREFRONT_BASE_URL", "http://localhost:3000"),
            ("STOREFRONT_SESSION_SECRET", SESSION_SECRET),
            ("STRIPE_SECRET_KEY", STRIPE_KEY),
            ("STRIPE_PUBLISHABLE_KEY", "pk_test_TYooMQauvdEDq54NiTphI7jx"),
            ("STRIPE_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<StorefrontConfig, ConfigError> {
        StorefrontConfig::from_vars(&|key: &str| vars.get(key).map(|v| (*v).to_string()))
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
        assert!(validate_secret_strength("changeme123", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_stripe_style_keys_pass_strength_check() {
        assert!(validate_secret_strength(STRIPE_KEY, "STRIPE_SECRET_KEY").is_ok());
        assert!(validate_secret_strength(WEBHOOK_SECRET, "STRIPE_WEBHOOK_SECRET").is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_err());
    }

    #[test]
    fn test_loads_with_defaults() {
        let config = load(&base_vars()).unwrap();

        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.order_number_prefix, "ORD");
        assert_eq!(config.stripe.currency, "usd");
        assert_eq!(config.stripe.api_base.as_str(), "https://api.stripe.com/");
        assert_eq!(config.stripe.timeout, Duration::from_secs(10));
        assert_eq!(config.stripe.webhook_tolerance, Duration::from_secs(300));
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_database_url_fallback() {
        let mut vars = base_vars();
        vars.remove("STOREFRONT_DATABASE_URL");
        assert!(matches!(load(&vars), Err(ConfigError::MissingEnvVar(_))));

        vars.insert("DATABASE_URL", "postgres://fly/shopclub");
        let config = load(&vars).unwrap();
        assert_eq!(config.database_url.expose_secret(), "postgres://fly/shopclub");
    }

    #[test]
    fn test_missing_webhook_secret() {
        let mut vars = base_vars();
        vars.remove("STRIPE_WEBHOOK_SECRET");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::MissingEnvVar(key)) if key == "STRIPE_WEBHOOK_SECRET"
        ));
    }

    #[test]
    fn test_rejects_bad_currency_and_prefix() {
        let mut vars = base_vars();
        vars.insert("STRIPE_CURRENCY", "USD");
        assert!(matches!(load(&vars), Err(ConfigError::InvalidEnvVar(..))));

        let mut vars = base_vars();
        vars.insert("ORDER_NUMBER_PREFIX", "ord-");
        assert!(matches!(load(&vars), Err(ConfigError::InvalidEnvVar(..))));
    }

    #[test]
    fn test_overrides() {
        let mut vars = base_vars();
        vars.insert("STOREFRONT_PORT", "8080");
        vars.insert("STRIPE_API_BASE", "http://127.0.0.1:9999");
        vars.insert("STRIPE_TIMEOUT_SECS", "2");
        vars.insert("ORDER_NUMBER_PREFIX", "SC");

        let config = load(&vars).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.stripe.api_base.as_str(), "http://127.0.0.1:9999/");
        assert_eq!(config.stripe.timeout, Duration::from_secs(2));
        assert_eq!(config.order_number_prefix, "SC");
    }

    #[test]
    fn test_stripe_config_debug_redacts_secrets() {
        let config = load(&base_vars()).unwrap();
        let debug_output = format!("{:?}", config.stripe);

        assert!(debug_output.contains("pk_test_TYooMQauvdEDq54NiTphI7jx"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains(STRIPE_KEY));
        assert!(!debug_output.contains(WEBHOOK_SECRET));
    }
}
