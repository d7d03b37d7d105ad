//! The side-effect dispatcher.
//!
//! A completed order has up to two side effects: the cash receipt (if the buyer asked for one) and the delivery URL.
//! Each is guarded by a claim on (`order_id`, `effect_type`) in the [`EffectStore`], so that concurrent and replayed
//! triggers execute the action at most once. A failed action leaves a `failed` record behind, which a later trigger
//! (usually the retry worker) may claim again.
use std::{fmt::Debug, future::Future, sync::Arc};

use chrono::Duration;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{CashReceipt, EffectType, Order, OrderId},
    helpers::DeliveryMinter,
    traits::{EffectStore, OrderLedger, ReceiptIssuer},
    SideEffectError,
};

pub const DEFAULT_EFFECT_LEASE_SECS: i64 = 300;

/// What happened when a side effect was triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result", content = "error")]
pub enum EffectRun {
    /// This call claimed the effect and the action succeeded.
    Ran,
    /// Another caller holds or has finished the effect. The action was not executed.
    Skipped,
    /// The order does not need this effect.
    NotRequired,
    /// This call claimed the effect, but the action failed. It is eligible for retry.
    Failed(String),
}

impl EffectRun {
    pub fn ran(&self) -> bool {
        matches!(self, EffectRun::Ran)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub order_id: OrderId,
    pub receipt: EffectRun,
    pub delivery: EffectRun,
}

impl DispatchSummary {
    pub fn has_failures(&self) -> bool {
        matches!(self.receipt, EffectRun::Failed(_)) || matches!(self.delivery, EffectRun::Failed(_))
    }
}

pub struct SideEffectApi<B, R> {
    db: B,
    issuer: Arc<R>,
    minter: DeliveryMinter,
    lease: Duration,
}

impl<B, R> Debug for SideEffectApi<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SideEffectApi({:?}, lease {}s)", self.minter, self.lease.num_seconds())
    }
}

impl<B: Clone, R> Clone for SideEffectApi<B, R> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            issuer: Arc::clone(&self.issuer),
            minter: self.minter.clone(),
            lease: self.lease,
        }
    }
}

impl<B, R> SideEffectApi<B, R> {
    pub fn new(db: B, issuer: Arc<R>, minter: DeliveryMinter) -> Self {
        Self { db, issuer, minter, lease: Duration::seconds(DEFAULT_EFFECT_LEASE_SECS) }
    }

    /// How long a `running` claim is honoured before another caller may take it over.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn minter(&self) -> &DeliveryMinter {
        &self.minter
    }
}

impl<B, R> SideEffectApi<B, R>
where
    B: OrderLedger + EffectStore,
    R: ReceiptIssuer,
{
    /// Executes `action` if, and only if, this call wins the claim on (`order_id`, `effect`).
    ///
    /// The action's own failure is reported as [`EffectRun::Failed`], not as an error. `Err` means the bookkeeping
    /// itself failed.
    pub async fn run_once<F, Fut>(
        &self,
        order_id: &OrderId,
        effect: EffectType,
        action: F,
    ) -> Result<EffectRun, SideEffectError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), String>>,
    {
        if !self.db.claim_effect(order_id, effect, self.lease).await? {
            debug!("🔄️ {effect} effect for order {order_id} is already claimed or done. Skipping");
            return Ok(EffectRun::Skipped);
        }
        trace!("🔄️ Claimed {effect} effect for order {order_id}");
        match action().await {
            Ok(()) => {
                self.db.complete_effect(order_id, effect).await?;
                info!("🔄️ {effect} effect for order {order_id} is done");
                Ok(EffectRun::Ran)
            },
            Err(e) => {
                self.db.fail_effect(order_id, effect, &e).await?;
                warn!("🔄️ {effect} effect for order {order_id} failed and will be retried. {e}");
                Ok(EffectRun::Failed(e))
            },
        }
    }

    /// Issues the cash receipt the buyer asked for, at most once.
    pub async fn issue_receipt_for(&self, order: &Order) -> Result<EffectRun, SideEffectError> {
        if !order.is_completed() || !order.receipt_type.is_requested() {
            return Ok(EffectRun::NotRequired);
        }
        let receipt = CashReceipt::for_order(order);
        let issuer = Arc::clone(&self.issuer);
        self.run_once(&order.order_id, EffectType::Receipt, || async move {
            match receipt {
                Some(receipt) => issuer.issue_receipt(&receipt).await.map_err(|e| e.to_string()),
                None => Err(format!("A {} receipt was requested, but no identifier was supplied", order.receipt_type)),
            }
        })
        .await
    }

    /// Mints the download URL and moves the order to `delivered`.
    pub async fn mint_delivery_for(&self, order: &Order) -> Result<EffectRun, SideEffectError> {
        if !order.is_completed() {
            return Ok(EffectRun::NotRequired);
        }
        if order.is_delivered() {
            return Ok(EffectRun::Skipped);
        }
        let url = self.minter.mint(order);
        let db = self.db.clone();
        self.run_once(&order.order_id, EffectType::Delivery, || async move {
            match db.apply_delivery_mint(&order.order_id, &url).await {
                Ok(Some(_)) => Ok(()),
                Ok(None) => {
                    debug!("🔄️ Order {} was delivered by another caller", order.order_id);
                    Ok(())
                },
                Err(e) => Err(e.to_string()),
            }
        })
        .await
    }

    /// Triggers every side effect of a completed order. One failing effect does not hold back the other.
    pub async fn dispatch(&self, order: &Order) -> Result<DispatchSummary, SideEffectError> {
        let receipt = self.issue_receipt_for(order).await?;
        let delivery = self.mint_delivery_for(order).await?;
        Ok(DispatchSummary { order_id: order.order_id.clone(), receipt, delivery })
    }

    /// Re-drives side effects for up to `limit` completed orders that still have outstanding work.
    pub async fn retry_pending(&self, limit: i64) -> Result<Vec<DispatchSummary>, SideEffectError> {
        let backlog = self.db.fetch_effect_backlog(limit).await?;
        if backlog.is_empty() {
            trace!("🔄️ No outstanding side effects");
            return Ok(Vec::new());
        }
        debug!("🔄️ Retrying side effects for {} orders", backlog.len());
        let mut result = Vec::with_capacity(backlog.len());
        for order in &backlog {
            result.push(self.dispatch(order).await?);
        }
        Ok(result)
    }
}
