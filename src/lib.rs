//! Signed prompt-session cookies and an audited webhook relay.
//!
//! Two independent pieces share process configuration:
//!
//! - [`PromptTokenCodec`] / [`PromptCookie`]: a stateless, HMAC-SHA256 signed,
//!   expiring token carried in the `prompt-id` cookie.
//! - [`WebhookDispatcher`]: POSTs event payloads to an external automation
//!   webhook with bounded exponential-backoff retries, writing one
//!   `integration_events` row per attempt.
//!
//! ## Guarantees
//! - Constant-time signature checks
//! - Invalid, forged and expired tokens read as "no session", never as errors
//! - Exactly one audit row per delivery attempt
//! - Audit failures never change a dispatch outcome, and a stalled audit
//!   store delays an attempt by at most the audit timeout
//!
//! ## Non-Guarantees
//! - Exactly-once delivery
//! - A dispatch deadline (wrap calls in `tokio::time::timeout`)
//! - Server-side session storage or revocation

mod config;
mod cookie;
mod dispatcher;
mod error;
mod relay;
mod signing;
mod storage;
mod telemetry;
mod transport;
mod types;

#[cfg(feature = "postgres")]
mod storage_postgres;

pub use config::Settings;
pub use cookie::{CookieStore, HeaderCookieJar, PromptCookie, SameSite, SetCookie, PROMPT_COOKIE_NAME};
pub use dispatcher::{
    backoff_delay,
    is_retryable_status,
    parse_response_body,
    WebhookConfig,
    WebhookDispatcher,
    DEFAULT_AUDIT_TIMEOUT,
    RETRYABLE_STATUS_CODES,
};
pub use error::{AttemptError, ConfigError, CookieError, DispatchError, SinkError, TransportError};
pub use relay::{PromptRelay, PromptSubmission, PROMPT_SUBMITTED_EVENT};
pub use signing::{compute_signature, verify_signature, PromptTokenCodec, TokenState};
pub use storage::{EventSink, InMemorySink, LazySink, SinkConnector};
pub use telemetry::init_tracing;
pub use transport::{Transport, TransportResponse};
pub use types::{
    DispatchOptions,
    DispatchResult,
    EventStatus,
    IntegrationEvent,
    PromptTokenPayload,
    DEFAULT_BASE_DELAY_MS,
    DEFAULT_MAX_RETRIES,
    DEFAULT_PROVIDER,
    DEFAULT_TOKEN_TTL_SECS,
};

#[cfg(feature = "http")]
pub use transport::HttpTransport;

#[cfg(feature = "postgres")]
pub use storage_postgres::{PostgresConnector, PostgresSink};
