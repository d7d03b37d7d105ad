use chrono::Duration;
use thiserror::Error;

use crate::db_types::{EffectRecord, EffectType, Order, OrderId};

#[derive(Debug, Clone, Error)]
pub enum EffectStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No {1} effect has been claimed for order {0}")]
    NotClaimed(OrderId, EffectType),
}

impl From<sqlx::Error> for EffectStoreError {
    fn from(e: sqlx::Error) -> Self {
        EffectStoreError::DatabaseError(e.to_string())
    }
}

/// Idempotency bookkeeping for side effects, keyed by (`order_id`, `effect_type`).
///
/// A claim succeeds if no record exists, if the previous attempt `failed`, or if a `running` claim is older than
/// `lease` (its owner is presumed dead). A `done` record can never be claimed again.
#[allow(async_fn_in_trait)]
pub trait EffectStore: Clone {
    async fn claim_effect(&self, order_id: &OrderId, effect: EffectType, lease: Duration)
        -> Result<bool, EffectStoreError>;

    async fn complete_effect(&self, order_id: &OrderId, effect: EffectType) -> Result<(), EffectStoreError>;

    async fn fail_effect(&self, order_id: &OrderId, effect: EffectType, error: &str) -> Result<(), EffectStoreError>;

    async fn fetch_effect(&self, order_id: &OrderId, effect: EffectType)
        -> Result<Option<EffectRecord>, EffectStoreError>;

    async fn fetch_effects_for_order(&self, order_id: &OrderId) -> Result<Vec<EffectRecord>, EffectStoreError>;

    /// Completed orders with outstanding work: delivery still pending, or a requested receipt that has not been
    /// issued. Oldest first, at most `limit` orders.
    async fn fetch_effect_backlog(&self, limit: i64) -> Result<Vec<Order>, EffectStoreError>;
}
