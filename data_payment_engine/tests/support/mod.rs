#![allow(dead_code)]
pub mod locking_ledger;
pub mod prepare_env;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use data_payment_engine::{
    db_types::{CashReceipt, EventOutcome, GatewayEvent, NewOrder, ReceiptType, Won},
    helpers::DeliveryMinter,
    traits::ReceiptError,
    ReceiptIssuer,
    SideEffectApi,
};
use dpg_common::Secret;
use tokio::sync::Mutex;

/// A receipt issuer that records every call, and fails the first `failures` of them.
#[derive(Default)]
pub struct CountingIssuer {
    calls: AtomicUsize,
    failures: AtomicUsize,
    issued: Mutex<Vec<CashReceipt>>,
}

impl CountingIssuer {
    pub fn failing(failures: usize) -> Self {
        Self { failures: AtomicUsize::new(failures), ..Default::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn issued(&self) -> Vec<CashReceipt> {
        self.issued.lock().await.clone()
    }
}

impl ReceiptIssuer for CountingIssuer {
    async fn issue_receipt(&self, receipt: &CashReceipt) -> Result<(), ReceiptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to interleave
        tokio::task::yield_now().await;
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ReceiptError::Unavailable("receipt service timed out".into()));
        }
        self.issued.lock().await.push(receipt.clone());
        Ok(())
    }
}

pub fn minter() -> DeliveryMinter {
    DeliveryMinter::new("https://data.example.com", Secret::new("test-delivery-secret".to_string()))
}

pub fn side_effects<B>(db: B, issuer: Arc<CountingIssuer>) -> SideEffectApi<B, CountingIssuer> {
    SideEffectApi::new(db, issuer, minter())
}

pub fn pending_order(provider_ref: &str, price: i64) -> NewOrder {
    NewOrder::new("payapp", provider_ref, "ds-traffic-2024", Won::from(price))
        .with_display_name("Seoul traffic 2024")
        .with_buyer_contact("01012345678")
        .with_user_id("alice")
        .with_receipt(ReceiptType::Personal, None)
}

pub fn success_event(provider_ref: &str, price: i64) -> GatewayEvent {
    GatewayEvent::new("payapp", provider_ref, "paid", EventOutcome::Success)
        .with_amount(Won::from(price))
        .with_buyer_contact("01098765432")
        .with_dataset_id("ds-traffic-2024")
        .with_display_name("Seoul traffic 2024")
        .with_receipt(ReceiptType::Personal, None)
}

pub fn failure_event(provider_ref: &str) -> GatewayEvent {
    GatewayEvent::new("payapp", provider_ref, "failed", EventOutcome::Failure)
}
