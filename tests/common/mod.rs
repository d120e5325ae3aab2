#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use prompt_relay::{
    EventSink, InMemorySink, IntegrationEvent, SinkConnector, SinkError, Transport, TransportError,
    TransportResponse, WebhookConfig, WebhookDispatcher,
};
use tokio::time::Instant;

pub const WEBHOOK_URL: &str = "https://automation.example.com/webhook/prompt";

pub type Step = Result<TransportResponse, TransportError>;

/// A request as seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub at: Instant,
    pub url: String,
    pub bearer_token: Option<String>,
    pub body: serde_json::Value,
}

/// Replays a fixed script of responses, then repeats `fallback`.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Step>, fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn statuses(statuses: &[u16]) -> Arc<Self> {
        let script = statuses.iter().map(|s| Ok(status(*s))).collect();
        Self::new(script, Ok(status(200)))
    }

    pub fn always(step: Step) -> Arc<Self> {
        Self::new(Vec::new(), step)
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(
        &self,
        url: &str,
        bearer_token: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError> {
        self.seen.lock().unwrap().push(SeenRequest {
            at: Instant::now(),
            url: url.to_string(),
            bearer_token: bearer_token.map(str::to_string),
            body: body.clone(),
        });
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn status(code: u16) -> TransportResponse {
    TransportResponse::new(code, "")
}

pub fn network_error() -> TransportError {
    TransportError::Network("connection reset by peer".to_string())
}

pub fn dispatcher(
    transport: Arc<ScriptedTransport>,
    sink: Arc<InMemorySink>,
) -> WebhookDispatcher {
    WebhookDispatcher::new(WebhookConfig::new(WEBHOOK_URL), transport, sink)
}

/// Audit sink whose inserts never complete.
pub struct HangingSink;

#[async_trait]
impl EventSink for HangingSink {
    async fn insert(&self, _event: &IntegrationEvent) -> Result<(), SinkError> {
        std::future::pending().await
    }
}

/// Connector that never finishes connecting, like a database behind a black hole.
pub struct HangingConnector;

#[async_trait]
impl SinkConnector for HangingConnector {
    async fn connect(&self) -> Result<Arc<dyn EventSink>, SinkError> {
        std::future::pending().await
    }
}
