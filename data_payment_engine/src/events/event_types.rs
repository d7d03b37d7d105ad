use serde::{Deserialize, Serialize};

use crate::db_types::{Order, PaymentStatus};

/// Emitted once per order, when its payment first becomes `completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompletedEvent {
    pub order: Order,
    /// True if the order was created by the completion itself, i.e. the gateway reported a payment the server had
    /// never registered.
    pub created_on_completion: bool,
}

impl OrderCompletedEvent {
    pub fn new(order: Order, created_on_completion: bool) -> Self {
        Self { order, created_on_completion }
    }
}

/// Emitted once per order, when its payment becomes `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFailedEvent {
    pub order: Order,
}

impl OrderFailedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted when a gateway reports an outcome that contradicts an order's terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionConflictEvent {
    pub order: Order,
    pub attempted: PaymentStatus,
}

impl TransitionConflictEvent {
    pub fn new(order: Order, attempted: PaymentStatus) -> Self {
        Self { order, attempted }
    }
}
