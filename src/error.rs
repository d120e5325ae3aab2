use thiserror::Error;

/// Deployment-time misconfiguration. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No signing secret for the prompt cookie.
    #[error("missing PROMPT_COOKIE_SECRET environment variable")]
    MissingCookieSecret,

    /// A numeric setting could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Failure below the HTTP layer: no response was received at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),
}

impl TransportError {
    /// Short kind tag used in audit payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "TimeoutError",
            TransportError::Network(_) => "NetworkError",
        }
    }
}

/// Why a single delivery attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttemptError {
    /// The remote endpoint answered with a non-success status.
    #[error("webhook responded with status {status}")]
    HttpStatus {
        status: u16,
        body: serde_json::Value,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors returned by [`WebhookDispatcher::dispatch`](crate::WebhookDispatcher::dispatch).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No webhook URL configured. Raised before any attempt is made.
    #[error("missing N8N_WEBHOOK_URL environment variable")]
    MissingEndpoint,

    /// Delivery gave up, either on a non-retryable status or after the last attempt.
    #[error("failed to trigger webhook after {attempts} attempt(s)")]
    Failed {
        attempts: u32,
        #[source]
        source: AttemptError,
    },
}

impl DispatchError {
    /// Number of attempts made before giving up (zero for configuration errors).
    pub fn attempts(&self) -> u32 {
        match self {
            DispatchError::MissingEndpoint => 0,
            DispatchError::Failed { attempts, .. } => *attempts,
        }
    }

    /// The last underlying cause, if any attempt was made.
    pub fn last_error(&self) -> Option<&AttemptError> {
        match self {
            DispatchError::MissingEndpoint => None,
            DispatchError::Failed { source, .. } => Some(source),
        }
    }
}

/// Audit sink failures. Always contained by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// No service credential for the audit store.
    #[error("missing audit database credential (AUDIT_DATABASE_URL or DATABASE_URL)")]
    MissingCredential,

    #[error("failed to connect to audit store: {0}")]
    Connect(String),

    #[error("failed to write integration_events row: {0}")]
    Insert(String),

    #[error("audit write timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A cookie store refused a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CookieError {
    #[error("cookies are read-only in this context")]
    ReadOnly,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn failed_dispatch_exposes_last_cause() {
        let err = DispatchError::Failed {
            attempts: 3,
            source: AttemptError::HttpStatus {
                status: 502,
                body: serde_json::Value::Null,
            },
        };
        assert_eq!(err.to_string(), "failed to trigger webhook after 3 attempt(s)");
        assert_eq!(err.attempts(), 3);
        let cause = err.source().map(|e| e.to_string());
        assert_eq!(cause.as_deref(), Some("webhook responded with status 502"));
    }

    #[test]
    fn transport_errors_are_transparent() {
        let err = AttemptError::from(TransportError::Network("connection refused".into()));
        assert_eq!(err.to_string(), "network error: connection refused");
    }

    #[test]
    fn audit_timeout_names_the_bound() {
        let err = SinkError::Timeout(std::time::Duration::from_secs(5));
        assert_eq!(err.to_string(), "audit write timed out after 5s");
    }

    #[test]
    fn missing_endpoint_has_no_cause() {
        let err = DispatchError::MissingEndpoint;
        assert_eq!(err.attempts(), 0);
        assert!(err.last_error().is_none());
    }
}
