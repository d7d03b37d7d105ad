//! `SqliteDatabase` is the persistent backend of the reconciliation engine.
//!
//! It implements all the storage traits defined in [`crate::traits`]. Idempotency comes from the unique keys on
//! `gateway_events.event_key`, `orders (provider_id, provider_ref)` and `side_effects (order_id, effect_type)`; payment
//! updates are compare-and-swap statements run inside a transaction, never blind overwrites.
use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;
use sqlx::{migrate, SqlitePool};

use super::{db_url, effects, events, new_pool, orders, SqliteDatabaseError};
use crate::{
    db::MAX_EFFECT_ATTEMPTS,
    db_types::{EffectRecord, EffectType, GatewayEvent, NewOrder, Order, OrderId, PaymentStatus},
    order_objects::{OrderQueryFilter, OrderStats},
    traits::{
        EffectStore,
        EffectStoreError,
        EventStore,
        EventStoreError,
        LedgerError,
        OrderLedger,
        OrderManagement,
        OrderQueryError,
        PaymentTransition,
        PaymentUpdate,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `DPG_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order_by_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_id(order_id, &mut conn).await?)
    }

    async fn fetch_order_by_provider_ref(
        &self,
        provider_id: &str,
        provider_ref: &str,
    ) -> Result<Option<Order>, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_provider_ref(provider_id, provider_ref, &mut conn).await?)
    }

    async fn fetch_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, OrderQueryError> {
        let query = OrderQueryFilter::default().with_user_id(user_id);
        self.search_orders(query).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderQueryError> {
        if query.limit.is_some_and(|l| l <= 0) {
            return Err(OrderQueryError::QueryError("limit must be positive".into()));
        }
        let mut conn = self.pool.acquire().await?;
        Ok(orders::search_orders(query, &mut conn).await?)
    }

    async fn fetch_order_stats(&self) -> Result<OrderStats, OrderQueryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_stats(&mut conn).await?)
    }
}

impl OrderLedger for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_pending_order(&self, order: NewOrder) -> Result<(Order, bool), LedgerError> {
        order.validate()?;
        let mut tx = self.pool.begin().await?;
        let inserted = orders::insert_order(&order, PaymentStatus::Pending, Utc::now(), &mut tx).await?;
        let existing = orders::fetch_order_by_provider_ref(&order.provider_id, &order.provider_ref, &mut tx).await?;
        tx.commit().await?;
        match existing {
            Some(o) => {
                if !inserted {
                    debug!("🗃️ Order for {}:{} already exists as {}", o.provider_id, o.provider_ref, o.order_id);
                }
                Ok((o, inserted))
            },
            None => Err(LedgerError::OrderIdInUse(order.order_id)),
        }
    }

    async fn apply_payment_outcome(&self, update: PaymentUpdate) -> Result<PaymentTransition, LedgerError> {
        update.validate()?;
        let PaymentUpdate { provider_id, provider_ref, status, at, late_order } = update;
        // Write first, so that the transaction holds the write lock before it reads anything
        let mut tx = self.pool.begin().await?;
        let transitioned = orders::transition_pending(&provider_id, &provider_ref, status, at, &mut tx).await?;
        let created = match (transitioned, &late_order, status) {
            (false, Some(order), PaymentStatus::Completed) => {
                orders::insert_order(order, PaymentStatus::Completed, at, &mut tx).await?
            },
            _ => false,
        };
        let order = orders::fetch_order_by_provider_ref(&provider_id, &provider_ref, &mut tx).await?;
        tx.commit().await?;
        let result = match order {
            Some(o) if transitioned => PaymentTransition::Transitioned(o),
            Some(o) if created => PaymentTransition::Created(o),
            Some(o) if o.payment_status == status => PaymentTransition::AlreadyApplied(o),
            Some(o) => PaymentTransition::Conflict { order: o, attempted: status },
            None => PaymentTransition::NotFound,
        };
        Ok(result)
    }

    async fn apply_delivery_mint(&self, order_id: &OrderId, delivery_url: &str) -> Result<Option<Order>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let updated = orders::mark_delivered(order_id, delivery_url, Utc::now(), &mut tx).await?;
        let order = if updated { orders::fetch_order_by_id(order_id, &mut tx).await? } else { None };
        tx.commit().await?;
        Ok(order)
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl EventStore for SqliteDatabase {
    async fn record_if_new(&self, event: &GatewayEvent) -> Result<bool, EventStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::insert_if_new(event, &mut conn).await?)
    }

    async fn forget_event(&self, event_key: &str) -> Result<(), EventStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::delete_event(event_key, &mut conn).await?)
    }

    async fn fetch_event(&self, event_key: &str) -> Result<Option<GatewayEvent>, EventStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::fetch_event(event_key, &mut conn).await?)
    }

    async fn fetch_events_for_provider_ref(
        &self,
        provider_id: &str,
        provider_ref: &str,
    ) -> Result<Vec<GatewayEvent>, EventStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::fetch_events_for_provider_ref(provider_id, provider_ref, &mut conn).await?)
    }
}

impl EffectStore for SqliteDatabase {
    async fn claim_effect(
        &self,
        order_id: &OrderId,
        effect: EffectType,
        lease: Duration,
    ) -> Result<bool, EffectStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(effects::claim(order_id, effect, lease, &mut conn).await?)
    }

    async fn complete_effect(&self, order_id: &OrderId, effect: EffectType) -> Result<(), EffectStoreError> {
        let mut conn = self.pool.acquire().await?;
        if effects::settle(order_id, effect, None, &mut conn).await? {
            Ok(())
        } else {
            Err(EffectStoreError::NotClaimed(order_id.clone(), effect))
        }
    }

    async fn fail_effect(&self, order_id: &OrderId, effect: EffectType, error: &str) -> Result<(), EffectStoreError> {
        let mut conn = self.pool.acquire().await?;
        if effects::settle(order_id, effect, Some(error), &mut conn).await? {
            Ok(())
        } else {
            Err(EffectStoreError::NotClaimed(order_id.clone(), effect))
        }
    }

    async fn fetch_effect(
        &self,
        order_id: &OrderId,
        effect: EffectType,
    ) -> Result<Option<EffectRecord>, EffectStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(effects::fetch_effect(order_id, effect, &mut conn).await?)
    }

    async fn fetch_effects_for_order(&self, order_id: &OrderId) -> Result<Vec<EffectRecord>, EffectStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(effects::fetch_effects_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_effect_backlog(&self, limit: i64) -> Result<Vec<Order>, EffectStoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_effect_backlog(limit, MAX_EFFECT_ATTEMPTS, &mut conn).await?)
    }
}
