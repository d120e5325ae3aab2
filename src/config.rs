//! Environment-driven settings.

use crate::error::ConfigError;
use crate::types::DEFAULT_TOKEN_TTL_SECS;

/// Process-wide secrets and endpoints.
///
/// Required values are kept optional here; each component reports its own
/// missing setting when it is built or called.
#[derive(Clone)]
pub struct Settings {
    pub cookie_secret: Option<String>,
    pub cookie_max_age_secs: u64,
    pub webhook_url: Option<String>,
    pub webhook_auth_token: Option<String>,
    pub audit_database_url: Option<String>,
    /// Production-like deployment; adds `Secure` to cookies.
    pub production: bool,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("cookie_secret", &self.cookie_secret.as_ref().map(|_| "<redacted>"))
            .field("cookie_max_age_secs", &self.cookie_max_age_secs)
            .field("webhook_url", &self.webhook_url)
            .field("webhook_auth_token", &self.webhook_auth_token.as_ref().map(|_| "<redacted>"))
            .field("audit_database_url", &self.audit_database_url.as_ref().map(|_| "<redacted>"))
            .field("production", &self.production)
            .finish()
    }
}

impl Settings {
    /// Load from the process environment, merging a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let cookie_max_age_secs = match get("PROMPT_COOKIE_MAX_AGE") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                name: "PROMPT_COOKIE_MAX_AGE",
                value: raw,
            })?,
            None => DEFAULT_TOKEN_TTL_SECS,
        };

        Ok(Self {
            cookie_secret: get("PROMPT_COOKIE_SECRET"),
            cookie_max_age_secs,
            webhook_url: get("N8N_WEBHOOK_URL"),
            webhook_auth_token: get("N8N_WEBHOOK_AUTH_TOKEN"),
            audit_database_url: get("AUDIT_DATABASE_URL").or_else(|| get("DATABASE_URL")),
            production: get("APP_ENV").is_some_and(|env| env.eq_ignore_ascii_case("production")),
        })
    }
}
