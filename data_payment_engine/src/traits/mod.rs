//! # Storage traits
//!
//! These traits define the contracts a storage backend must fulfil to drive the reconciliation engine. Both the
//! SQLite backend and the in-memory backend implement all of them, and the engine's guarantees (single creation per
//! provider reference, terminal states never reverting, one winner per event key and per effect claim) must hold for
//! either one.
//!
//! * [`OrderManagement`] read-only order queries.
//! * [`OrderLedger`] the payment/delivery state machine. Every mutation is a guarded, conditional update.
//! * [`EventStore`] the idempotent record of accepted gateway events.
//! * [`EffectStore`] claim/complete/fail bookkeeping for side effects, keyed by order id and effect type.
//! * [`ReceiptIssuer`] the external collaborator that registers cash receipts.
//! * [`ReconciliationStore`] shorthand for a backend that implements the ledger, event and effect stores.
mod effect_store;
mod event_store;
mod order_ledger;
mod order_management;
mod receipt_issuer;

pub use effect_store::{EffectStore, EffectStoreError};
pub use event_store::{EventStore, EventStoreError};
pub use order_ledger::{LedgerError, OrderLedger, PaymentTransition, PaymentUpdate};
pub use order_management::{OrderManagement, OrderQueryError};
pub use receipt_issuer::{ReceiptError, ReceiptIssuer};

/// Everything the reconciliation core needs from a single backend.
pub trait ReconciliationStore: OrderLedger + EventStore + EffectStore {}

impl<T> ReconciliationStore for T where T: OrderLedger + EventStore + EffectStore {}
