use std::time::Duration;

const DEFAULT_TABLE_NAME: &str = "fitplans";
const DEFAULT_CHECKOUT_API_BASE: &str = "https://api.stripe.com/v1";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
const DEFAULT_EXTERNAL_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Checkout processor settings.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub api_base: String,
    pub api_key: String,
    pub webhook_secret: String,
    pub currency: String,
    /// Maximum age of a signed webhook before it is rejected.
    pub webhook_tolerance_secs: i64,
}

/// Process-wide settings, read once at cold start.
#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub frontend_url: String,
    pub checkout: CheckoutConfig,
    /// Bound on every store and processor call.
    pub external_timeout: Duration,
    /// Whether `POST /subscriptions` may grant access without payment. Defaults to false.
    pub direct_subscribe_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = get("CHECKOUT_API_KEY").ok_or(ConfigError::Missing("CHECKOUT_API_KEY"))?;
        let webhook_secret = get("CHECKOUT_WEBHOOK_SECRET")
            .ok_or(ConfigError::Missing("CHECKOUT_WEBHOOK_SECRET"))?;

        let webhook_tolerance_secs = match get("WEBHOOK_TOLERANCE_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or(ConfigError::Invalid {
                    name: "WEBHOOK_TOLERANCE_SECS",
                    value: raw,
                })?,
            None => DEFAULT_WEBHOOK_TOLERANCE_SECS,
        };

        let timeout_ms = match get("EXTERNAL_TIMEOUT_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or(ConfigError::Invalid {
                    name: "EXTERNAL_TIMEOUT_MS",
                    value: raw,
                })?,
            None => DEFAULT_EXTERNAL_TIMEOUT_MS,
        };

        let direct_subscribe_enabled = match get("DIRECT_SUBSCRIBE_ENABLED") {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "DIRECT_SUBSCRIBE_ENABLED",
                        value: raw,
                    })
                }
            },
            None => false,
        };

        Ok(Self {
            table_name: get("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            frontend_url: get("FRONTEND_URL")
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            checkout: CheckoutConfig {
                api_base: get("CHECKOUT_API_BASE")
                    .unwrap_or_else(|| DEFAULT_CHECKOUT_API_BASE.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                api_key,
                webhook_secret,
                currency: get("CHECKOUT_CURRENCY")
                    .unwrap_or_else(|| "usd".to_string())
                    .to_ascii_lowercase(),
                webhook_tolerance_secs,
            },
            external_timeout: Duration::from_millis(timeout_ms),
            direct_subscribe_enabled,
        })
    }

    pub fn success_url(&self) -> String {
        format!("{}/dashboard?success=true", self.frontend_url)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}/dashboard?canceled=true", self.frontend_url)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::from_lookup(|name| match name {
            "CHECKOUT_API_KEY" => Some("sk_test".to_string()),
            "CHECKOUT_WEBHOOK_SECRET" => Some("whsec_test".to_string()),
            _ => None,
        })
        .expect("test config")
    }
}
