use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::Settings;
use crate::error::{AttemptError, DispatchError, SinkError};
use crate::storage::EventSink;
use crate::transport::Transport;
use crate::types::{DispatchOptions, DispatchResult, EventStatus, IntegrationEvent};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::counter!(name).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// Upper bound on a single audit write, connection setup included.
pub const DEFAULT_AUDIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Statuses worth another attempt: timeouts, conflicts, throttling and
/// upstream/gateway failures (including Cloudflare 522/524).
pub const RETRYABLE_STATUS_CODES: [u16; 10] = [408, 409, 425, 429, 500, 502, 503, 504, 522, 524];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}

/// Delay before the attempt after `attempt` (1-indexed): `base * 2^(attempt-1)`.
/// No jitter, no cap.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let pow = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(pow)
}

/// JSON if the body parses, the raw text otherwise, `null` when empty.
pub fn parse_response_body(body: &str) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

/// Target of the relay.
#[derive(Clone, Default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub auth_token: Option<String>,
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("url", &self.url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            url: settings.webhook_url.clone(),
            auth_token: settings.webhook_auth_token.clone(),
        }
    }
}

/// Relays event payloads to the configured webhook.
///
/// Each call retries transient failures with exponential backoff and writes
/// one audit row per attempt. Audit writes are best-effort: a failing or
/// stalled sink is logged and never changes the result of a dispatch. Each
/// write is bounded by the audit timeout ([`DEFAULT_AUDIT_TIMEOUT`] unless set).
///
/// Calls are independent; the transport and sink are shared. The retry loop
/// has no deadline of its own, so wrap calls in `tokio::time::timeout` when
/// one is needed.
pub struct WebhookDispatcher {
    config: WebhookConfig,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
    audit_timeout: Duration,
}

impl WebhookDispatcher {
    pub fn new(config: WebhookConfig, transport: Arc<dyn Transport>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            transport,
            sink,
            audit_timeout: DEFAULT_AUDIT_TIMEOUT,
        }
    }

    /// Bound each audit write. A write that takes longer is abandoned and
    /// logged like a failed insert.
    pub fn with_audit_timeout(mut self, audit_timeout: Duration) -> Self {
        self.audit_timeout = audit_timeout;
        self
    }

    /// Dispatcher over `reqwest` for the configured webhook.
    #[cfg(feature = "http")]
    pub fn from_settings(settings: &Settings, sink: Arc<dyn EventSink>) -> Self {
        Self::new(
            WebhookConfig::from_settings(settings),
            Arc::new(crate::transport::HttpTransport::new()),
            sink,
        )
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// POST `payload` to the webhook, retrying up to `options.max_retries` attempts.
    ///
    /// A `max_retries` of zero is treated as one attempt.
    pub async fn dispatch(
        &self,
        payload: &Value,
        options: &DispatchOptions,
    ) -> Result<DispatchResult, DispatchError> {
        let Some(url) = self.config.url.as_deref() else {
            return Err(DispatchError::MissingEndpoint);
        };
        let auth_token = self.config.auth_token.as_deref();
        let max_attempts = options.max_retries.max(1);

        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            let attempts_remain = attempt < max_attempts;

            tracing::debug!(
                attempt,
                max_attempts,
                event_type = %options.event_type,
                "posting webhook"
            );

            match self.transport.post_json(url, auth_token, payload).await {
                Ok(response) => {
                    let data = parse_response_body(&response.body);
                    let audit = json!({
                        "request": payload,
                        "response": data.clone(),
                        "statusCode": response.status,
                        "attempt": attempt,
                    });

                    if response.is_success() {
                        self.record(options, EventStatus::Success, audit).await;
                        metric_inc("relay.dispatch.success");
                        return Ok(DispatchResult {
                            attempt,
                            status: response.status,
                            ok: true,
                            data,
                        });
                    }

                    let error = AttemptError::HttpStatus {
                        status: response.status,
                        body: data,
                    };

                    if !(is_retryable_status(response.status) && attempts_remain) {
                        self.record(options, EventStatus::Error, audit).await;
                        metric_inc("relay.dispatch.error");
                        tracing::error!(
                            attempt,
                            status = response.status,
                            event_type = %options.event_type,
                            "webhook delivery failed"
                        );
                        return Err(DispatchError::Failed {
                            attempts: attempt,
                            source: error,
                        });
                    }

                    self.record(options, EventStatus::Retry, audit).await;
                    metric_inc("relay.dispatch.retry");
                    tracing::warn!(
                        attempt,
                        status = response.status,
                        event_type = %options.event_type,
                        "webhook returned retryable status"
                    );
                }
                Err(err) => {
                    let audit = json!({
                        "request": payload,
                        "error": { "name": err.kind(), "message": err.to_string() },
                        "attempt": attempt,
                    });

                    if !attempts_remain {
                        self.record(options, EventStatus::Error, audit).await;
                        metric_inc("relay.dispatch.error");
                        tracing::error!(
                            attempt,
                            error = %err,
                            event_type = %options.event_type,
                            "webhook delivery failed after all attempts"
                        );
                        break AttemptError::Transport(err);
                    }

                    self.record(options, EventStatus::Retry, audit).await;
                    metric_inc("relay.dispatch.retry");
                    tracing::warn!(
                        attempt,
                        error = %err,
                        event_type = %options.event_type,
                        "webhook request failed, retrying"
                    );
                }
            }

            tokio::time::sleep(backoff_delay(options.base_delay, attempt)).await;
        };

        Err(DispatchError::Failed {
            attempts: attempt,
            source: last_error,
        })
    }

    async fn record(&self, options: &DispatchOptions, status: EventStatus, payload: Value) {
        let event = IntegrationEvent {
            provider: options.provider.clone(),
            status,
            event_type: options.event_type.clone(),
            reference_id: options.reference_id.clone(),
            payload,
        };

        let written = match tokio::time::timeout(self.audit_timeout, self.sink.insert(&event)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(self.audit_timeout)),
        };

        if let Err(err) = written {
            metric_inc("relay.audit.failure");
            tracing::error!(
                error = %err,
                status = %status,
                event_type = %options.event_type,
                "failed to write integration_events row"
            );
        }
    }
}
