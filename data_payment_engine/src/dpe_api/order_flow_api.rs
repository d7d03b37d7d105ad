use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewOrder, Order, OrderId, PaymentStatus},
    events::{EventProducers, OrderCompletedEvent, OrderFailedEvent, TransitionConflictEvent},
    traits::{LedgerError, OrderLedger, PaymentTransition, PaymentUpdate},
};

/// `OrderFlowApi` is the write side of the order ledger. It applies checkout registrations and payment outcomes, and
/// notifies event hook subscribers of every status change.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: OrderLedger
{
    /// Registers an order that is waiting for its payment callback.
    ///
    /// The insert is idempotent on the gateway reference. If a callback raced ahead of the checkout and already
    /// created the order, that order is returned untouched and the flag is `false`.
    pub async fn create_pending_order(&self, order: NewOrder) -> Result<(Order, bool), LedgerError> {
        let (order, inserted) = self.db.insert_pending_order(order).await?;
        if inserted {
            info!(
                "🔄️📦️ Order {} registered as pending for {}:{} ({})",
                order.order_id, order.provider_id, order.provider_ref, order.price
            );
        } else {
            info!(
                "🔄️📦️ Order {} for {}:{} already exists with payment status {}",
                order.order_id, order.provider_id, order.provider_ref, order.payment_status
            );
        }
        Ok((order, inserted))
    }

    /// Applies a terminal payment outcome to the order with the update's gateway reference.
    ///
    /// Contradictions (a `failed` after a `completed`, or vice versa) are logged and reported as
    /// [`PaymentTransition::Conflict`]. They are not errors: the ledger is left as it was.
    pub async fn apply_payment_outcome(&self, update: PaymentUpdate) -> Result<PaymentTransition, LedgerError> {
        let reference = format!("{}:{}", update.provider_id, update.provider_ref);
        let transition = self.db.apply_payment_outcome(update).await?;
        match &transition {
            PaymentTransition::Created(order) => {
                info!("🔄️✅️ Order {} created as completed on first sight of {reference}", order.order_id);
                self.call_order_completed_hook(order, true).await;
            },
            PaymentTransition::Transitioned(order) if order.payment_status == PaymentStatus::Completed => {
                info!("🔄️✅️ Order {} is paid ({reference})", order.order_id);
                self.call_order_completed_hook(order, false).await;
            },
            PaymentTransition::Transitioned(order) => {
                info!("🔄️❌️ Payment for order {} failed ({reference})", order.order_id);
                self.call_order_failed_hook(order).await;
            },
            PaymentTransition::AlreadyApplied(order) => {
                debug!("🔄️ Order {} is already {}. Nothing to do", order.order_id, order.payment_status);
            },
            PaymentTransition::Conflict { order, attempted } => {
                error!(
                    "🔄️🚨️ Transition conflict for order {} ({reference}). It is {} and the gateway now reports {}. \
                     The update has been rejected.",
                    order.order_id, order.payment_status, attempted
                );
                self.call_transition_conflict_hook(order, *attempted).await;
            },
            PaymentTransition::NotFound => {
                warn!("🔄️ No order exists for {reference}, and the update may not create one. Ignoring it.");
            },
        }
        Ok(transition)
    }

    /// Records the delivery URL of a completed order. Returns `None` if the order is not awaiting delivery.
    pub async fn mint_delivery(&self, order_id: &OrderId, delivery_url: &str) -> Result<Option<Order>, LedgerError> {
        let order = self.db.apply_delivery_mint(order_id, delivery_url).await?;
        match &order {
            Some(_) => debug!("🔄️📦️ Order {order_id} is delivered"),
            None => debug!("🔄️📦️ Order {order_id} is not awaiting delivery"),
        }
        Ok(order)
    }

    async fn call_order_completed_hook(&self, order: &Order, created: bool) {
        for emitter in &self.producers.order_completed_producer {
            debug!("🔄️📬️ Notifying order completed hook subscribers");
            emitter.publish_event(OrderCompletedEvent::new(order.clone(), created)).await;
        }
    }

    async fn call_order_failed_hook(&self, order: &Order) {
        for emitter in &self.producers.order_failed_producer {
            debug!("🔄️📬️ Notifying order failed hook subscribers");
            emitter.publish_event(OrderFailedEvent::new(order.clone())).await;
        }
    }

    async fn call_transition_conflict_hook(&self, order: &Order, attempted: PaymentStatus) {
        for emitter in &self.producers.transition_conflict_producer {
            emitter.publish_event(TransitionConflictEvent::new(order.clone(), attempted)).await;
        }
    }
}
