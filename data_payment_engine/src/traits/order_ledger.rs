use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderId, PaymentStatus},
    traits::OrderManagement,
};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid ledger update. {0}")]
    InvalidUpdate(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order id {0} is already in use by another order")]
    OrderIdInUse(OrderId),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

/// A payment outcome reported by a gateway, addressed by the gateway's reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUpdate {
    pub provider_id: String,
    pub provider_ref: String,
    /// Must be terminal: `Completed` or `Failed`.
    pub status: PaymentStatus,
    pub at: DateTime<Utc>,
    /// When set, a completion for an unknown reference creates this order directly in `Completed`.
    pub late_order: Option<NewOrder>,
}

impl PaymentUpdate {
    pub fn new<S: Into<String>>(provider_id: S, provider_ref: S, status: PaymentStatus) -> Self {
        Self {
            provider_id: provider_id.into(),
            provider_ref: provider_ref.into(),
            status,
            at: Utc::now(),
            late_order: None,
        }
    }

    pub fn with_late_order(mut self, order: NewOrder) -> Self {
        self.late_order = Some(order);
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.status.is_terminal() {
            return Err(LedgerError::InvalidUpdate(format!("{} is not a terminal payment status", self.status)));
        }
        if let Some(order) = &self.late_order {
            if order.provider_id != self.provider_id || order.provider_ref != self.provider_ref {
                return Err(LedgerError::InvalidUpdate(format!(
                    "Late order is for {}:{}, but the update is for {}:{}",
                    order.provider_id, order.provider_ref, self.provider_id, self.provider_ref
                )));
            }
            order.validate()?;
        }
        Ok(())
    }
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.price.is_positive() {
            return Err(LedgerError::InvalidUpdate(format!("Order price must be positive, got {}", self.price)));
        }
        if self.provider_id.trim().is_empty() || self.provider_ref.trim().is_empty() {
            return Err(LedgerError::InvalidUpdate("Orders need a provider id and a provider reference".into()));
        }
        if self.dataset_id.trim().is_empty() {
            return Err(LedgerError::InvalidUpdate("Orders need a dataset id".into()));
        }
        Ok(())
    }
}

/// The result of a guarded payment update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentTransition {
    /// No order existed for the reference; one was created directly in `Completed`.
    Created(Order),
    /// `pending` moved to the requested terminal status.
    Transitioned(Order),
    /// The order already had the requested status. Nothing changed.
    AlreadyApplied(Order),
    /// The order is terminal with a different status. Nothing changed.
    Conflict { order: Order, attempted: PaymentStatus },
    /// No order exists for the reference, and the update did not allow creating one.
    NotFound,
}

impl PaymentTransition {
    pub fn order(&self) -> Option<&Order> {
        match self {
            PaymentTransition::Created(o) |
            PaymentTransition::Transitioned(o) |
            PaymentTransition::AlreadyApplied(o) |
            PaymentTransition::Conflict { order: o, .. } => Some(o),
            PaymentTransition::NotFound => None,
        }
    }

    /// True if this call changed the ledger.
    pub fn is_mutation(&self) -> bool {
        matches!(self, PaymentTransition::Created(_) | PaymentTransition::Transitioned(_))
    }

    /// The order, if it is (now or already) completed and therefore eligible for side effects.
    pub fn completed_order(&self) -> Option<&Order> {
        match self {
            PaymentTransition::Created(o) | PaymentTransition::Transitioned(o) | PaymentTransition::AlreadyApplied(o)
                if o.is_completed() =>
            {
                Some(o)
            },
            _ => None,
        }
    }
}

/// The authoritative per-order state machine.
///
/// ```text
///   pending ──► completed ──► delivered
///      │
///      └──────► failed
/// ```
///
/// Terminal payment states never revert. Backends must make every method atomic with respect to concurrent callers
/// touching the same provider reference or order id.
#[allow(async_fn_in_trait)]
pub trait OrderLedger: Clone + OrderManagement {
    /// The URL of the backing store
    fn url(&self) -> &str;

    /// Registers a `pending` order. Idempotent on (`provider_id`, `provider_ref`): if an order already exists for the
    /// reference (e.g. a callback raced ahead and created it) that order is returned untouched, with `false`.
    async fn insert_pending_order(&self, order: NewOrder) -> Result<(Order, bool), LedgerError>;

    /// Applies a terminal payment outcome as a guarded upsert. See [`PaymentTransition`] for the possible results.
    async fn apply_payment_outcome(&self, update: PaymentUpdate) -> Result<PaymentTransition, LedgerError>;

    /// Records the delivery URL and marks the order `delivered`. Only effective on a completed order whose delivery
    /// is still pending. Returns the updated order if the call changed anything.
    async fn apply_delivery_mint(&self, order_id: &OrderId, delivery_url: &str) -> Result<Option<Order>, LedgerError>;

    /// Closes the store. No further calls should be made.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}
