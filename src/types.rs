use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default lifetime of a prompt session token (7 days).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 60 * 60 * 24 * 7;

/// Provider tag written to audit rows when the caller does not set one.
pub const DEFAULT_PROVIDER: &str = "n8n";

pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Self-describing content of a signed prompt token.
///
/// Timestamps are milliseconds since the Unix epoch. The field names are
/// part of the cookie wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTokenPayload {
    pub prompt_id: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

impl PromptTokenPayload {
    pub fn new(prompt_id: impl Into<String>, issued_at: u64, ttl_secs: u64) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            issued_at,
            expires_at: issued_at.saturating_add(ttl_secs.saturating_mul(1_000)),
        }
    }

    /// A token is expired once `now` reaches `expires_at`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}

/// Outcome of one delivery attempt, as stored in `integration_events.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Retry,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Success => "success",
            EventStatus::Retry => "retry",
            EventStatus::Error => "error",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only `integration_events` row. `created_at` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationEvent {
    pub provider: String,
    pub status: EventStatus,
    pub event_type: String,
    pub reference_id: Option<String>,
    pub payload: serde_json::Value,
}

/// Per-call dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Caller-defined event tag stored on every audit row.
    pub event_type: String,

    /// Optional correlation id, typically the prompt id from the session cookie.
    pub reference_id: Option<String>,

    pub provider: String,

    /// Total number of attempts, including the first.
    pub max_retries: u32,

    /// Delay before the second attempt; doubles for each attempt after that.
    pub base_delay: Duration,
}

impl DispatchOptions {
    /// Options with the default provider, 3 attempts and a 500ms base delay.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            reference_id: None,
            provider: DEFAULT_PROVIDER.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }

    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }
}

/// Successful delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    /// 1-indexed attempt that succeeded.
    pub attempt: u32,
    pub status: u16,
    pub ok: bool,
    /// Response body: parsed JSON, raw text as a JSON string, or null when empty.
    pub data: serde_json::Value,
}
