//! Data Payment Engine
//!
//! The engine reconciles asynchronous payment-gateway notifications into a single consistent order record. It is
//! provider-agnostic: gateway adapters live in the server, and hand the engine canonical [`db_types::GatewayEvent`]s.
//!
//! The library is divided into these sections:
//! 1. Storage backends ([`mod@db`]). A SQLite backend and an in-memory backend implement the same traits, defined
//!    in [`mod@traits`]:
//!    * [`OrderLedger`] is the per-order payment state machine. Every mutation is conditional on the current state.
//!    * [`EventStore`] records every accepted gateway event under a provider-scoped key and detects replays.
//!    * [`EffectStore`] keeps the idempotency bookkeeping for side effects (receipts and delivery URLs).
//! 2. The public API ([`mod@dpe_api`]). [`ReconciliationApi`] wires the pieces together: record the event, apply
//!    the payment outcome, then dispatch the side effects through [`SideEffectApi`].
//!
//! The engine also emits events (see [`mod@events`]) when an order completes or fails, so that other parts of the
//! system can hook into the order lifecycle.
pub mod db;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

mod dpe_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use db::memory::MemoryDatabase;
#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use dpe_api::{
    errors::{ReconciliationError, SideEffectError},
    order_flow_api::OrderFlowApi,
    order_objects,
    orders_api::OrdersApi,
    reconciliation_api::{ReconciliationApi, ReconciliationOutcome},
    side_effects_api::{DispatchSummary, EffectRun, SideEffectApi},
};
pub use traits::{EffectStore, EventStore, OrderLedger, OrderManagement, ReceiptIssuer, ReconciliationStore};
