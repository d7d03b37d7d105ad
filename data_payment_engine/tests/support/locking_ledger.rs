use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chrono::Duration;
use data_payment_engine::{
    db_types::{EffectRecord, EffectType, GatewayEvent, NewOrder, Order, OrderId},
    order_objects::{OrderQueryFilter, OrderStats},
    traits::{
        EffectStoreError,
        EventStoreError,
        LedgerError,
        OrderQueryError,
        PaymentTransition,
        PaymentUpdate,
    },
    EffectStore,
    EventStore,
    OrderLedger,
    OrderManagement,
};

/// Wraps a backend so that the first `failures` payment outcomes fail with a database error, the way a busy SQLite
/// file does.
#[derive(Clone)]
pub struct LockingLedger<B> {
    inner: B,
    failures: Arc<AtomicUsize>,
}

impl<B> LockingLedger<B> {
    pub fn new(inner: B, failures: usize) -> Self {
        Self { inner, failures: Arc::new(AtomicUsize::new(failures)) }
    }
}

impl<B: OrderManagement> OrderManagement for LockingLedger<B> {
    async fn fetch_order_by_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderQueryError> {
        self.inner.fetch_order_by_id(order_id).await
    }

    async fn fetch_order_by_provider_ref(
        &self,
        provider_id: &str,
        provider_ref: &str,
    ) -> Result<Option<Order>, OrderQueryError> {
        self.inner.fetch_order_by_provider_ref(provider_id, provider_ref).await
    }

    async fn fetch_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, OrderQueryError> {
        self.inner.fetch_orders_for_user(user_id).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderQueryError> {
        self.inner.search_orders(query).await
    }

    async fn fetch_order_stats(&self) -> Result<OrderStats, OrderQueryError> {
        self.inner.fetch_order_stats().await
    }
}

impl<B: OrderLedger> OrderLedger for LockingLedger<B> {
    fn url(&self) -> &str {
        self.inner.url()
    }

    async fn insert_pending_order(&self, order: NewOrder) -> Result<(Order, bool), LedgerError> {
        self.inner.insert_pending_order(order).await
    }

    async fn apply_payment_outcome(&self, update: PaymentUpdate) -> Result<PaymentTransition, LedgerError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(LedgerError::DatabaseError("database is locked".into()));
        }
        self.inner.apply_payment_outcome(update).await
    }

    async fn apply_delivery_mint(&self, order_id: &OrderId, delivery_url: &str) -> Result<Option<Order>, LedgerError> {
        self.inner.apply_delivery_mint(order_id, delivery_url).await
    }
}

impl<B: EventStore> EventStore for LockingLedger<B> {
    async fn record_if_new(&self, event: &GatewayEvent) -> Result<bool, EventStoreError> {
        self.inner.record_if_new(event).await
    }

    async fn forget_event(&self, event_key: &str) -> Result<(), EventStoreError> {
        self.inner.forget_event(event_key).await
    }

    async fn fetch_event(&self, event_key: &str) -> Result<Option<GatewayEvent>, EventStoreError> {
        self.inner.fetch_event(event_key).await
    }

    async fn fetch_events_for_provider_ref(
        &self,
        provider_id: &str,
        provider_ref: &str,
    ) -> Result<Vec<GatewayEvent>, EventStoreError> {
        self.inner.fetch_events_for_provider_ref(provider_id, provider_ref).await
    }
}

impl<B: EffectStore> EffectStore for LockingLedger<B> {
    async fn claim_effect(
        &self,
        order_id: &OrderId,
        effect: EffectType,
        lease: Duration,
    ) -> Result<bool, EffectStoreError> {
        self.inner.claim_effect(order_id, effect, lease).await
    }

    async fn complete_effect(&self, order_id: &OrderId, effect: EffectType) -> Result<(), EffectStoreError> {
        self.inner.complete_effect(order_id, effect).await
    }

    async fn fail_effect(&self, order_id: &OrderId, effect: EffectType, error: &str) -> Result<(), EffectStoreError> {
        self.inner.fail_effect(order_id, effect, error).await
    }

    async fn fetch_effect(
        &self,
        order_id: &OrderId,
        effect: EffectType,
    ) -> Result<Option<EffectRecord>, EffectStoreError> {
        self.inner.fetch_effect(order_id, effect).await
    }

    async fn fetch_effects_for_order(&self, order_id: &OrderId) -> Result<Vec<EffectRecord>, EffectStoreError> {
        self.inner.fetch_effects_for_order(order_id).await
    }

    async fn fetch_effect_backlog(&self, limit: i64) -> Result<Vec<Order>, EffectStoreError> {
        self.inner.fetch_effect_backlog(limit).await
    }
}
