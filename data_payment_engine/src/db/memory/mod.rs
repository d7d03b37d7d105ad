//! In-memory backend.
//!
//! All state sits behind a single async mutex, which is the serialization point for every guarded update. The
//! semantics match the SQLite backend exactly; only durability is lost.
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use log::*;
use tokio::sync::Mutex;

use crate::{
    db::MAX_EFFECT_ATTEMPTS,
    db_types::{
        DeliveryStatus,
        EffectRecord,
        EffectStatus,
        EffectType,
        GatewayEvent,
        NewOrder,
        Order,
        OrderId,
        PaymentStatus,
        Won,
    },
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

type RefKey = (String, String);

#[derive(Default)]
struct MemoryState {
    orders: HashMap<OrderId, Order>,
    refs: HashMap<RefKey, OrderId>,
    events: HashMap<String, GatewayEvent>,
    effects: HashMap<(OrderId, EffectType), (EffectRecord, DateTime<Utc>)>,
}

impl MemoryState {
    fn order_for_ref(&self, provider_id: &str, provider_ref: &str) -> Option<&Order> {
        let key = (provider_id.to_string(), provider_ref.to_string());
        self.refs.get(&key).and_then(|id| self.orders.get(id))
    }

    fn order_for_ref_mut(&mut self, provider_id: &str, provider_ref: &str) -> Option<&mut Order> {
        let key = (provider_id.to_string(), provider_ref.to_string());
        match self.refs.get(&key) {
            Some(id) => self.orders.get_mut(id),
            None => None,
        }
    }

    /// Same conflict rules as the SQLite unique keys: both the order id and the provider reference must be free.
    fn insert(&mut self, order: NewOrder, status: PaymentStatus, at: DateTime<Utc>) -> bool {
        let key = (order.provider_id.clone(), order.provider_ref.clone());
        if self.refs.contains_key(&key) || self.orders.contains_key(&order.order_id) {
            return false;
        }
        let order = Order::from_new(order, status, at);
        self.refs.insert(key, order.order_id.clone());
        self.orders.insert(order.order_id.clone(), order);
        true
    }

    fn effect_settled(&self, order_id: &OrderId, effect: EffectType) -> bool {
        self.effects
            .get(&(order_id.clone(), effect))
            .is_some_and(|(r, _)| r.status == EffectStatus::Done || r.attempts >= MAX_EFFECT_ATTEMPTS)
    }
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryDatabase")
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_newest_first(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

impl OrderManagement for MemoryDatabase {
    async fn fetch_order_by_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderQueryError> {
        let state = self.state.lock().await;
        Ok(state.orders.get(order_id).cloned())
    }

    async fn fetch_order_by_provider_ref(
        &self,
        provider_id: &str,
        provider_ref: &str,
    ) -> Result<Option<Order>, OrderQueryError> {
        let state = self.state.lock().await;
        Ok(state.order_for_ref(provider_id, provider_ref).cloned())
    }

    async fn fetch_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, OrderQueryError> {
        self.search_orders(OrderQueryFilter::default().with_user_id(user_id)).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderQueryError> {
        let limit = match query.limit {
            Some(l) if l <= 0 => return Err(OrderQueryError::QueryError("limit must be positive".into())),
            Some(l) => usize::try_from(l).unwrap_or(usize::MAX),
            None => usize::MAX,
        };
        let state = self.state.lock().await;
        let orders = state.orders.values().filter(|o| query.matches(o)).cloned().collect();
        let mut orders = Self::sorted_newest_first(orders);
        orders.truncate(limit);
        Ok(orders)
    }

    async fn fetch_order_stats(&self) -> Result<OrderStats, OrderQueryError> {
        let state = self.state.lock().await;
        let completed = state.orders.values().filter(|o| o.is_completed());
        let (completed_orders, total_revenue) =
            completed.fold((0i64, Won::default()), |(n, sum), o| (n + 1, sum + o.price));
        let total_orders = state.orders.len() as i64;
        Ok(OrderStats { total_revenue, total_orders, completed_orders })
    }
}

impl OrderLedger for MemoryDatabase {
    fn url(&self) -> &str {
        "memory://"
    }

    async fn insert_pending_order(&self, order: NewOrder) -> Result<(Order, bool), LedgerError> {
        order.validate()?;
        let mut state = self.state.lock().await;
        let order_id = order.order_id.clone();
        let (provider_id, provider_ref) = (order.provider_id.clone(), order.provider_ref.clone());
        let inserted = state.insert(order, PaymentStatus::Pending, Utc::now());
        match state.order_for_ref(&provider_id, &provider_ref) {
            Some(o) => Ok((o.clone(), inserted)),
            None => Err(LedgerError::OrderIdInUse(order_id)),
        }
    }

    async fn apply_payment_outcome(&self, update: PaymentUpdate) -> Result<PaymentTransition, LedgerError> {
        update.validate()?;
        let PaymentUpdate { provider_id, provider_ref, status, at, late_order } = update;
        let mut state = self.state.lock().await;
        if let Some(order) = state.order_for_ref_mut(&provider_id, &provider_ref) {
            let result = match order.payment_status {
                PaymentStatus::Pending => {
                    order.payment_status = status;
                    if status == PaymentStatus::Completed {
                        order.completed_at = Some(at);
                    }
                    order.updated_at = at;
                    PaymentTransition::Transitioned(order.clone())
                },
                s if s == status => PaymentTransition::AlreadyApplied(order.clone()),
                _ => PaymentTransition::Conflict { order: order.clone(), attempted: status },
            };
            return Ok(result);
        }
        match late_order {
            Some(order) if status == PaymentStatus::Completed => {
                if state.insert(order, PaymentStatus::Completed, at) {
                    let created = state.order_for_ref(&provider_id, &provider_ref).cloned();
                    Ok(created.map(PaymentTransition::Created).unwrap_or(PaymentTransition::NotFound))
                } else {
                    warn!("🗃️ Late order for {provider_id}:{provider_ref} collided with an existing order id");
                    Ok(PaymentTransition::NotFound)
                }
            },
            _ => Ok(PaymentTransition::NotFound),
        }
    }

    async fn apply_delivery_mint(&self, order_id: &OrderId, delivery_url: &str) -> Result<Option<Order>, LedgerError> {
        let mut state = self.state.lock().await;
        match state.orders.get_mut(order_id) {
            Some(order) if order.is_completed() && order.delivery_status == DeliveryStatus::Pending => {
                order.delivery_status = DeliveryStatus::Delivered;
                order.delivery_url = Some(delivery_url.to_string());
                order.updated_at = Utc::now();
                Ok(Some(order.clone()))
            },
            _ => Ok(None),
        }
    }
}

impl EventStore for MemoryDatabase {
    async fn record_if_new(&self, event: &GatewayEvent) -> Result<bool, EventStoreError> {
        let mut state = self.state.lock().await;
        if state.events.contains_key(&event.event_key) {
            return Ok(false);
        }
        state.events.insert(event.event_key.clone(), event.clone());
        Ok(true)
    }

    async fn forget_event(&self, event_key: &str) -> Result<(), EventStoreError> {
        let mut state = self.state.lock().await;
        state.events.remove(event_key);
        Ok(())
    }

    async fn fetch_event(&self, event_key: &str) -> Result<Option<GatewayEvent>, EventStoreError> {
        let state = self.state.lock().await;
        Ok(state.events.get(event_key).cloned())
    }

    async fn fetch_events_for_provider_ref(
        &self,
        provider_id: &str,
        provider_ref: &str,
    ) -> Result<Vec<GatewayEvent>, EventStoreError> {
        let state = self.state.lock().await;
        let mut events = state
            .events
            .values()
            .filter(|e| e.provider_id == provider_id && e.provider_ref == provider_ref)
            .cloned()
            .collect::<Vec<GatewayEvent>>();
        events.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        Ok(events)
    }
}

impl EffectStore for MemoryDatabase {
    async fn claim_effect(
        &self,
        order_id: &OrderId,
        effect: EffectType,
        lease: Duration,
    ) -> Result<bool, EffectStoreError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let key = (order_id.clone(), effect);
        match state.effects.get_mut(&key) {
            None => {
                let record = EffectRecord {
                    order_id: order_id.clone(),
                    effect_type: effect,
                    status: EffectStatus::Running,
                    attempts: 1,
                    last_error: None,
                    claimed_at: now,
                    created_at: now,
                    updated_at: now,
                };
                state.effects.insert(key, (record, now + lease));
                Ok(true)
            },
            Some((record, expires)) => {
                let reclaimable = match record.status {
                    EffectStatus::Failed => true,
                    EffectStatus::Running => *expires < now,
                    EffectStatus::Done => false,
                };
                if reclaimable {
                    record.status = EffectStatus::Running;
                    record.attempts += 1;
                    record.claimed_at = now;
                    record.updated_at = now;
                    *expires = now + lease;
                    debug!("🗃️ Re-claimed {effect} for order {order_id}");
                }
                Ok(reclaimable)
            },
        }
    }

    async fn complete_effect(&self, order_id: &OrderId, effect: EffectType) -> Result<(), EffectStoreError> {
        let mut state = self.state.lock().await;
        match state.effects.get_mut(&(order_id.clone(), effect)) {
            Some((record, _)) if record.status == EffectStatus::Running => {
                record.status = EffectStatus::Done;
                record.updated_at = Utc::now();
                Ok(())
            },
            _ => Err(EffectStoreError::NotClaimed(order_id.clone(), effect)),
        }
    }

    async fn fail_effect(&self, order_id: &OrderId, effect: EffectType, error: &str) -> Result<(), EffectStoreError> {
        let mut state = self.state.lock().await;
        match state.effects.get_mut(&(order_id.clone(), effect)) {
            Some((record, _)) if record.status == EffectStatus::Running => {
                record.status = EffectStatus::Failed;
                record.last_error = Some(error.to_string());
                record.updated_at = Utc::now();
                Ok(())
            },
            _ => Err(EffectStoreError::NotClaimed(order_id.clone(), effect)),
        }
    }

    async fn fetch_effect(
        &self,
        order_id: &OrderId,
        effect: EffectType,
    ) -> Result<Option<EffectRecord>, EffectStoreError> {
        let state = self.state.lock().await;
        Ok(state.effects.get(&(order_id.clone(), effect)).map(|(r, _)| r.clone()))
    }

    async fn fetch_effects_for_order(&self, order_id: &OrderId) -> Result<Vec<EffectRecord>, EffectStoreError> {
        let state = self.state.lock().await;
        let mut records =
            state.effects.values().filter(|(r, _)| &r.order_id == order_id).map(|(r, _)| r.clone()).collect::<Vec<_>>();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn fetch_effect_backlog(&self, limit: i64) -> Result<Vec<Order>, EffectStoreError> {
        let state = self.state.lock().await;
        let mut backlog = state
            .orders
            .values()
            .filter(|o| o.is_completed())
            .filter(|o| {
                let delivery_due = o.delivery_status == DeliveryStatus::Pending &&
                    !state.effect_settled(&o.order_id, EffectType::Delivery);
                let receipt_due =
                    o.receipt_type.is_requested() && !state.effect_settled(&o.order_id, EffectType::Receipt);
                delivery_due || receipt_due
            })
            .cloned()
            .collect::<Vec<Order>>();
        backlog.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        backlog.truncate(usize::try_from(limit.max(0)).unwrap_or(0));
        Ok(backlog)
    }
}
