#[cfg(feature = "postgres")]
use std::sync::Arc;
#[cfg(feature = "postgres")]
use std::time::Duration;

#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use tokio_postgres::{Client, Config, NoTls};

#[cfg(feature = "postgres")]
use crate::config::Settings;
#[cfg(feature = "postgres")]
use crate::error::SinkError;
#[cfg(feature = "postgres")]
use crate::storage::{EventSink, SinkConnector};
#[cfg(feature = "postgres")]
use crate::types::IntegrationEvent;

/// Upper bound on establishing the audit database connection.
#[cfg(feature = "postgres")]
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Writes audit rows to the `integration_events` table.
#[cfg(feature = "postgres")]
pub struct PostgresSink {
    client: Client,
}

#[cfg(feature = "postgres")]
impl PostgresSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl EventSink for PostgresSink {
    async fn insert(&self, event: &IntegrationEvent) -> Result<(), SinkError> {
        self.client
            .execute(
                "INSERT INTO integration_events (provider, status, event_type, reference_id, payload)
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &event.provider,
                    &event.status.as_str(),
                    &event.event_type,
                    &event.reference_id,
                    &event.payload,
                ],
            )
            .await
            .map_err(|e| SinkError::Insert(e.to_string()))?;
        Ok(())
    }
}

/// Opens a [`PostgresSink`] from the service-role connection string.
#[cfg(feature = "postgres")]
#[derive(Clone)]
pub struct PostgresConnector {
    database_url: Option<String>,
}

#[cfg(feature = "postgres")]
impl PostgresConnector {
    pub fn new(database_url: Option<String>) -> Self {
        Self { database_url }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.audit_database_url.clone())
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl SinkConnector for PostgresConnector {
    async fn connect(&self) -> Result<Arc<dyn EventSink>, SinkError> {
        let url = self
            .database_url
            .as_deref()
            .ok_or(SinkError::MissingCredential)?;

        let mut config: Config = url
            .parse()
            .map_err(|e: tokio_postgres::Error| SinkError::Connect(e.to_string()))?;
        config.connect_timeout(CONNECT_TIMEOUT);

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| SinkError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "audit database connection closed");
            }
        });

        let sink: Arc<dyn EventSink> = Arc::new(PostgresSink::new(client));
        Ok(sink)
    }
}
