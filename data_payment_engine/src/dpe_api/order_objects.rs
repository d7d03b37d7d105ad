use serde::{Deserialize, Serialize};

use crate::db_types::{DeliveryStatus, Order, PaymentStatus, Won};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub provider_id: Option<String>,
    pub dataset_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub payment_statuses: Vec<PaymentStatus>,
    pub delivery_status: Option<DeliveryStatus>,
    pub limit: Option<i64>,
}

impl OrderQueryFilter {
    pub fn with_provider_id<S: Into<String>>(mut self, provider_id: S) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_dataset_id<S: Into<String>>(mut self, dataset_id: S) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }

    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_statuses.push(status);
        self
    }

    pub fn with_delivery_status(mut self, status: DeliveryStatus) -> Self {
        self.delivery_status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.provider_id.is_none() &&
            self.dataset_id.is_none() &&
            self.user_id.is_none() &&
            self.payment_statuses.is_empty() &&
            self.delivery_status.is_none()
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.provider_id.as_ref().map_or(true, |p| p == &order.provider_id) &&
            self.dataset_id.as_ref().map_or(true, |d| d == &order.dataset_id) &&
            self.user_id.as_ref().map_or(true, |u| Some(u) == order.user_id.as_ref()) &&
            (self.payment_statuses.is_empty() || self.payment_statuses.contains(&order.payment_status)) &&
            self.delivery_status.map_or(true, |s| s == order.delivery_status)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    /// Sum of the prices of completed orders.
    pub total_revenue: Won,
    pub total_orders: i64,
    pub completed_orders: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub total_orders: i64,
    pub orders: Vec<Order>,
}

impl OrderResult {
    pub fn new(orders: Vec<Order>) -> Self {
        Self { total_orders: orders.len() as i64, orders }
    }
}
