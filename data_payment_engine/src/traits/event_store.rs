use thiserror::Error;

use crate::db_types::GatewayEvent;

#[derive(Debug, Clone, Error)]
pub enum EventStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for EventStoreError {
    fn from(e: sqlx::Error) -> Self {
        EventStoreError::DatabaseError(e.to_string())
    }
}

/// Durable, keyed record of every accepted gateway event.
#[allow(async_fn_in_trait)]
pub trait EventStore: Clone {
    /// Stores the event if its `event_key` has never been seen. Under concurrent delivery of the same key exactly one
    /// caller gets `true`.
    async fn record_if_new(&self, event: &GatewayEvent) -> Result<bool, EventStoreError>;

    /// Removes a recorded event so that a redelivery of the same key is treated as new. Used when the event could not
    /// be applied to the ledger.
    async fn forget_event(&self, event_key: &str) -> Result<(), EventStoreError>;

    async fn fetch_event(&self, event_key: &str) -> Result<Option<GatewayEvent>, EventStoreError>;

    /// Every event recorded for the provider reference, oldest first.
    async fn fetch_events_for_provider_ref(
        &self,
        provider_id: &str,
        provider_ref: &str,
    ) -> Result<Vec<GatewayEvent>, EventStoreError>;
}
