//! # Reconciliation orchestrator
//!
//! Glue between the HTTP layer, the gateway adapters and the engine.
//!
//! [`handle_callback`] takes a provider callback through: resolve adapter → parse → verify → reconcile → ack.
//! Only an unknown provider (404), an unparseable body from a provider that accepts errors (400), a failed
//! authenticity check (401) and an event the store could not apply (503) produce a non-success response. In the last
//! case the event has been released, and the provider's redelivery is processed as new. Anything else that goes
//! wrong after the callback has been authenticated is logged and acknowledged. The effect-retry worker picks up
//! outstanding side effects.
//!
//! [`create_checkout`] registers a pending order and asks the provider for a payment session, in the order the
//! provider's [`ReferenceMode`] requires.
//!
//! [`issue_receipt_on_demand`] lets an operator push a cash receipt through for a completed order, through the same
//! claim bookkeeping the callback path uses.
use data_payment_engine::{
    db_types::{EffectType, NewOrder, OrderId},
    traits::{OrderLedger, PaymentTransition, ReceiptIssuer, ReconciliationStore},
    EffectRun,
    OrderFlowApi,
    OrdersApi,
    ReconciliationApi,
    ReconciliationOutcome,
};
use log::*;

use crate::{
    data_objects::{CheckoutResponse, ReceiptIssueResponse},
    errors::{GatewayError, ServerError},
    integrations::{AckResponse, CheckoutIntent, GatewayRegistry, GatewayTransport, RawCallback, ReferenceMode},
};

pub async fn handle_callback<B, R>(
    api: &ReconciliationApi<B, R>,
    registry: &GatewayRegistry,
    provider_id: &str,
    raw: RawCallback,
) -> Result<AckResponse, ServerError>
where
    B: ReconciliationStore,
    R: ReceiptIssuer,
{
    let adapter = registry.get(provider_id).ok_or_else(|| {
        warn!("💳️ Callback for unknown provider '{provider_id}'");
        ServerError::UnknownProvider(provider_id.to_string())
    })?;
    let event = match adapter.parse_callback(&raw) {
        Ok(event) => event,
        Err(e) if adapter.acks_unconditionally() => {
            warn!("💳️ Could not parse {provider_id} callback. Acknowledging it anyway. {e}");
            return Ok(adapter.ack_response(None));
        },
        Err(e) => {
            warn!("💳️ Could not parse {provider_id} callback. {e}");
            return Err(e.into());
        },
    };
    if !adapter.verification_enabled() {
        warn!(
            "🔐️ Verification is disabled for {provider_id}. Accepting {} without checking its authenticity.",
            event.event_key
        );
    } else if !adapter.verify_authenticity(&raw, &event) {
        warn!(
            "🔐️🚨️ SECURITY: {provider_id} callback {} failed authenticity checks and was rejected. Reference: {}, \
             reported outcome: {}",
            event.event_key, event.provider_ref, event.outcome
        );
        return Err(ServerError::CallbackNotAuthentic);
    }
    trace!("🔐️ {} is authentic", event.event_key);
    match api.process_event(&event, adapter.allows_late_creation()).await {
        Ok(ReconciliationOutcome::Duplicate) => debug!("💳️ {} was a replay", event.event_key),
        Ok(ReconciliationOutcome::Ignored) => debug!("💳️ {} carried no payment outcome", event.event_key),
        Ok(ReconciliationOutcome::Applied { transition: PaymentTransition::NotFound, .. }) => {
            warn!("💳️ {} refers to an order we do not know about. It was recorded, but not applied.", event.event_key)
        },
        Ok(ReconciliationOutcome::Applied { transition, effects }) => {
            let order_id = transition.order().map(|o| o.order_id.to_string()).unwrap_or_default();
            debug!("💳️ {} was applied to order {order_id}. Side effects: {effects:?}", event.event_key);
        },
        Err(e) if e.needs_redelivery() => {
            error!("💳️ {} could not be applied. Asking {provider_id} to deliver it again. {e}", event.event_key);
            return Err(ServerError::RedeliveryRequired(event.event_key.clone()));
        },
        Err(e) => {
            error!(
                "💳️ Reconciling {} failed after the callback was authenticated. The provider will still be \
                 acknowledged. {e}",
                event.event_key
            );
        },
    }
    Ok(adapter.ack_response(Some(&event)))
}

pub async fn create_checkout<B, T>(
    flow: &OrderFlowApi<B>,
    registry: &GatewayRegistry,
    transport: &T,
    provider_id: &str,
    intent: CheckoutIntent,
    callback_url: &str,
) -> Result<CheckoutResponse, ServerError>
where
    B: OrderLedger,
    T: GatewayTransport,
{
    let adapter = registry.get(provider_id).ok_or_else(|| ServerError::UnknownProvider(provider_id.to_string()))?;
    intent.validate()?;
    let call = adapter.initiate_checkout(&intent, callback_url)?;
    let mut order_id = intent.order_id.clone();
    if adapter.reference_mode() == ReferenceMode::ClientChosen {
        let provider_ref = call.provider_ref.clone().unwrap_or_else(|| intent.order_id.to_string());
        let (order, _) = flow.create_pending_order(pending_order(provider_id, &provider_ref, &intent)).await?;
        order_id = order.order_id;
    }
    debug!("💳️ Starting {provider_id} checkout for order {order_id}: {}", call.request);
    let response = transport.send(&call.request).await.map_err(|e| {
        let e = GatewayError::from(e);
        match (&e, adapter.reference_mode()) {
            (GatewayError::Timeout(_), ReferenceMode::ClientChosen) => warn!(
                "💳️ {provider_id} checkout for order {order_id} timed out. The order stays pending until a \
                 callback arrives."
            ),
            _ => warn!("💳️ {provider_id} checkout for order {order_id} failed. {e}"),
        }
        e
    })?;
    let session = adapter.parse_checkout_response(&intent, &response).map_err(|e| {
        warn!("💳️ {provider_id} did not open a session for order {order_id}. {e}");
        e
    })?;
    if adapter.reference_mode() == ReferenceMode::GatewayAssigned {
        let (order, _) = flow.create_pending_order(pending_order(provider_id, &session.provider_ref, &intent)).await?;
        order_id = order.order_id;
    }
    info!("💳️ {provider_id} checkout opened for order {order_id} as {}", session.provider_ref);
    Ok(CheckoutResponse {
        order_id,
        provider_ref: session.provider_ref,
        redirect_url: session.redirect_url,
        payment_handle: session.payment_handle,
    })
}

/// Issues the cash receipt of a completed order unless it has already been issued. A receipt that is issued or in
/// flight is reported as `skipped`. A failed attempt is recorded, so the retry worker keeps trying after a 502.
pub async fn issue_receipt_on_demand<B, R>(
    orders: &OrdersApi<B>,
    api: &ReconciliationApi<B, R>,
    order_id: &OrderId,
) -> Result<ReceiptIssueResponse, ServerError>
where
    B: ReconciliationStore,
    R: ReceiptIssuer,
{
    let order = orders
        .order_by_id(order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id} does not exist")))?;
    let receipt = api.side_effects().issue_receipt_for(&order).await.map_err(|e| {
        error!("💳️ Receipt bookkeeping for order {order_id} failed. {e}");
        ServerError::BackendError(e.to_string())
    })?;
    match &receipt {
        EffectRun::NotRequired => {
            let reason = if order.is_completed() { "no cash receipt was requested" } else { "it is not paid" };
            return Err(ServerError::OrderStateConflict(format!("Order {order_id} cannot get a receipt: {reason}")));
        },
        EffectRun::Failed(e) => {
            warn!("💳️ On-demand receipt for order {order_id} failed. {e}");
            return Err(GatewayError::Upstream(e.clone()).into());
        },
        EffectRun::Ran => info!("💳️ Cash receipt for order {order_id} issued on request"),
        EffectRun::Skipped => debug!("💳️ Cash receipt for order {order_id} was already issued or is in flight"),
    }
    let record = orders.effects_for_order(order_id).await?.into_iter().find(|r| r.effect_type == EffectType::Receipt);
    Ok(ReceiptIssueResponse { order_id: order_id.clone(), receipt, record })
}

fn pending_order(provider_id: &str, provider_ref: &str, intent: &CheckoutIntent) -> NewOrder {
    let order = NewOrder::new(provider_id, provider_ref, intent.dataset_id.as_str(), intent.price)
        .with_order_id(intent.order_id.clone())
        .with_display_name(intent.display_name.as_str())
        .with_buyer_contact(intent.buyer_contact.as_str())
        .with_receipt(intent.receipt_type, intent.receipt_identifier());
    match &intent.user_id {
        Some(user_id) => order.with_user_id(user_id.as_str()),
        None => order,
    }
}
