//! Order lifecycle audit trail.
//!
//! The engine publishes an event whenever an order completes, fails, or receives a contradicting outcome. The hooks
//! created here write each of these to the log under the `dpg::audit` target, so that operators can follow payments
//! (and spot conflicts) without querying the database.
//!
//! Conflicts are logged at `error` level. A conflict means a provider reported a payment as failed after it had
//! already completed, or vice versa, and someone should look at it.
use data_payment_engine::events::{
    EventHandlers,
    EventHooks,
    OrderCompletedEvent,
    OrderFailedEvent,
    TransitionConflictEvent,
};
use log::*;

pub const AUDIT_EVENT_BUFFER: usize = 25;
const AUDIT_TARGET: &str = "dpg::audit";

pub fn create_audit_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_order_completed(|ev| {
        Box::pin(async move {
            info!(target: AUDIT_TARGET, "📬️ {}", completed_message(&ev));
        })
    });
    hooks.on_order_failed(|ev| {
        Box::pin(async move {
            info!(target: AUDIT_TARGET, "📬️ {}", failed_message(&ev));
        })
    });
    hooks.on_transition_conflict(|ev| {
        Box::pin(async move {
            error!(target: AUDIT_TARGET, "📬️ {}", conflict_message(&ev));
        })
    });
    EventHandlers::new(AUDIT_EVENT_BUFFER, hooks)
}

fn completed_message(ev: &OrderCompletedEvent) -> String {
    let order = &ev.order;
    let origin = if ev.created_on_completion { " (first seen in the completion callback)" } else { "" };
    format!(
        "Order {} completed{origin}. {} paid {} for {} via {} [{}]",
        order.order_id, order.buyer_contact, order.price, order.dataset_id, order.provider_id, order.provider_ref
    )
}

fn failed_message(ev: &OrderFailedEvent) -> String {
    let order = &ev.order;
    format!("Order {} failed. {} [{}]", order.order_id, order.provider_id, order.provider_ref)
}

fn conflict_message(ev: &TransitionConflictEvent) -> String {
    let order = &ev.order;
    format!(
        "CONFLICT on order {}: {} reported {} for [{}], but the order is already {}. The order was not changed.",
        order.order_id, order.provider_id, ev.attempted, order.provider_ref, order.payment_status
    )
}
