use thiserror::Error;

use crate::{
    db_types::{Order, OrderId},
    order_objects::{OrderQueryFilter, OrderStats},
};

#[derive(Debug, Clone, Error)]
pub enum OrderQueryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for OrderQueryError {
    fn from(e: sqlx::Error) -> Self {
        OrderQueryError::DatabaseError(e.to_string())
    }
}

/// Read-only queries against the order ledger.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order_by_id(&self, order_id: &OrderId) -> Result<Option<Order>, OrderQueryError>;

    async fn fetch_order_by_provider_ref(
        &self,
        provider_id: &str,
        provider_ref: &str,
    ) -> Result<Option<Order>, OrderQueryError>;

    /// All orders placed by the given user, newest first.
    async fn fetch_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, OrderQueryError>;

    /// Orders matching the filter, newest first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderQueryError>;

    async fn fetch_order_stats(&self) -> Result<OrderStats, OrderQueryError>;
}
