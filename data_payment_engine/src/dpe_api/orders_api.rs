use std::fmt::Debug;

use crate::{
    db_types::{EffectRecord, GatewayEvent, Order, OrderId},
    order_objects::{OrderQueryFilter, OrderResult, OrderStats},
    traits::{EffectStore, EventStore, OrderManagement, OrderQueryError},
};

/// Read-only projection of the order ledger, for "my purchases" pages and admin listings.
pub struct OrdersApi<B> {
    db: B,
}

impl<B> Debug for OrdersApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrdersApi")
    }
}

impl<B> OrdersApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> OrdersApi<B>
where B: OrderManagement
{
    pub async fn order_by_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderQueryError> {
        self.db.fetch_order_by_id(order_id).await
    }

    pub async fn order_by_provider_ref(
        &self,
        provider_id: &str,
        provider_ref: &str,
    ) -> Result<Option<Order>, OrderQueryError> {
        self.db.fetch_order_by_provider_ref(provider_id, provider_ref).await
    }

    pub async fn orders_for_user(&self, user_id: &str) -> Result<OrderResult, OrderQueryError> {
        let orders = self.db.fetch_orders_for_user(user_id).await?;
        Ok(OrderResult::new(orders))
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<OrderResult, OrderQueryError> {
        let orders = self.db.search_orders(query).await?;
        Ok(OrderResult::new(orders))
    }

    pub async fn order_stats(&self) -> Result<OrderStats, OrderQueryError> {
        self.db.fetch_order_stats().await
    }
}

impl<B> OrdersApi<B>
where B: OrderManagement + EventStore
{
    /// Every gateway event recorded against the order's gateway reference, oldest first. `None` if the order does
    /// not exist.
    pub async fn events_for_order(&self, order_id: &OrderId) -> Result<Option<Vec<GatewayEvent>>, OrderQueryError> {
        let Some(order) = self.db.fetch_order_by_id(order_id).await? else {
            return Ok(None);
        };
        let events = self.db.fetch_events_for_provider_ref(&order.provider_id, &order.provider_ref).await?;
        Ok(Some(events))
    }
}

impl<B> OrdersApi<B>
where B: EffectStore
{
    pub async fn effects_for_order(&self, order_id: &OrderId) -> Result<Vec<EffectRecord>, OrderQueryError> {
        Ok(self.db.fetch_effects_for_order(order_id).await?)
    }
}
