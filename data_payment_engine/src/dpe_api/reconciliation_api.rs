//! The reconciliation core: record the gateway event, apply its outcome to the ledger, and dispatch side effects.
//!
//! The two idempotency keys are independent. A replayed event stops at the event store, while a new event for an
//! order whose effects already ran stops at the effect store. A new event for an order whose receipt previously
//! failed therefore re-drives the receipt.
use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{EventOutcome, GatewayEvent, PaymentStatus},
    events::EventProducers,
    traits::{EffectStore, EventStore, OrderLedger, PaymentTransition, PaymentUpdate, ReceiptIssuer},
    DispatchSummary,
    OrderFlowApi,
    ReconciliationError,
    SideEffectApi,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    /// The event key has been seen before. Nothing was changed.
    Duplicate,
    /// The event was recorded, but its outcome does not affect payment status.
    Ignored,
    /// The event was recorded and applied to the ledger. `effects` is set when the order is completed.
    Applied { transition: PaymentTransition, effects: Option<DispatchSummary> },
}

pub struct ReconciliationApi<B, R> {
    db: B,
    flow: OrderFlowApi<B>,
    effects: SideEffectApi<B, R>,
}

impl<B, R> Debug for ReconciliationApi<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B: Clone, R> Clone for ReconciliationApi<B, R> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), flow: self.flow.clone(), effects: self.effects.clone() }
    }
}

impl<B: Clone, R> ReconciliationApi<B, R> {
    pub fn new(db: B, producers: EventProducers, effects: SideEffectApi<B, R>) -> Self {
        let flow = OrderFlowApi::new(db.clone(), producers);
        Self { db, flow, effects }
    }

    pub fn order_flow(&self) -> &OrderFlowApi<B> {
        &self.flow
    }

    pub fn side_effects(&self) -> &SideEffectApi<B, R> {
        &self.effects
    }
}

impl<B, R> ReconciliationApi<B, R>
where
    B: OrderLedger + EventStore + EffectStore,
    R: ReceiptIssuer,
{
    /// Reconciles one authenticated gateway event.
    ///
    /// `allow_late_creation` lets a completion for an unknown gateway reference create its order on the spot, for
    /// channels that open payment sessions the server never registered.
    pub async fn process_event(
        &self,
        event: &GatewayEvent,
        allow_late_creation: bool,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        if !self.db.record_if_new(event).await? {
            info!("🔄️ Event {} has already been processed. Acknowledging without changes", event.event_key);
            return Ok(ReconciliationOutcome::Duplicate);
        }
        debug!("🔄️ Recorded new event {} ({})", event.event_key, event.outcome);
        let status = match event.outcome {
            EventOutcome::Success => PaymentStatus::Completed,
            EventOutcome::Failure => PaymentStatus::Failed,
            EventOutcome::Other => {
                debug!("🔄️ Event {} carries no payment outcome", event.event_key);
                return Ok(ReconciliationOutcome::Ignored);
            },
        };
        let mut update =
            PaymentUpdate::new(event.provider_id.clone(), event.provider_ref.clone(), status).at(event.received_at);
        if status == PaymentStatus::Completed && allow_late_creation {
            match event.to_late_order() {
                Some(order) => update = update.with_late_order(order),
                None => debug!("🔄️ Event {} lacks the details to create an order on first sight", event.event_key),
            }
        }
        let transition = match self.flow.apply_payment_outcome(update).await {
            Ok(t) => t,
            Err(e) => {
                let e = ReconciliationError::from(e);
                if e.needs_redelivery() {
                    self.release_event(event).await;
                }
                return Err(e);
            },
        };
        let effects = match transition.completed_order() {
            Some(order) => {
                let summary = self.effects.dispatch(order).await?;
                if summary.has_failures() {
                    warn!("🔄️ Some side effects for order {} failed. They will be retried", order.order_id);
                }
                Some(summary)
            },
            None => None,
        };
        Ok(ReconciliationOutcome::Applied { transition, effects })
    }

    async fn release_event(&self, event: &GatewayEvent) {
        match self.db.forget_event(&event.event_key).await {
            Ok(()) => warn!("🔄️ Event {} could not be applied. It has been released for redelivery", event.event_key),
            Err(e) => error!(
                "🔄️ Event {} could not be applied, and releasing it failed too. Replays of it will be ignored. {e}",
                event.event_key
            ),
        }
    }
}
