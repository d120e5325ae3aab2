use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};

use crate::error::SinkError;
use crate::types::{EventStatus, IntegrationEvent};

/// Insert-only audit store for `integration_events` rows.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn insert(&self, event: &IntegrationEvent) -> Result<(), SinkError>;
}

/// Builds a sink on demand, e.g. by opening a database connection.
#[async_trait]
pub trait SinkConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn EventSink>, SinkError>;
}

/// Process-wide sink constructed on first use.
///
/// A failed construction is not cached: the next insert tries to connect
/// again. Once a sink is built it is reused for the life of the value.
pub struct LazySink<C> {
    connector: C,
    sink: OnceCell<Arc<dyn EventSink>>,
}

impl<C: SinkConnector> LazySink<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            sink: OnceCell::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.sink.initialized()
    }

    async fn sink(&self) -> Result<&Arc<dyn EventSink>, SinkError> {
        self.sink.get_or_try_init(|| self.connector.connect()).await
    }
}

#[async_trait]
impl<C: SinkConnector> EventSink for LazySink<C> {
    async fn insert(&self, event: &IntegrationEvent) -> Result<(), SinkError> {
        self.sink().await?.insert(event).await
    }
}

/// In-memory sink for tests and embedded use. Rows are kept in insertion order.
#[derive(Default)]
pub struct InMemorySink {
    events: Mutex<Vec<IntegrationEvent>>,
    failing: AtomicBool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every insert fails.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<IntegrationEvent> {
        self.events.lock().await.clone()
    }

    pub async fn statuses(&self) -> Vec<EventStatus> {
        self.events.lock().await.iter().map(|e| e.status).collect()
    }
}

#[async_trait]
impl EventSink for InMemorySink {
    async fn insert(&self, event: &IntegrationEvent) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Insert("in-memory sink set to fail".to_string()));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
