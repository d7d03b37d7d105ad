//! # Data payment engine public API
//!
//! The API is modular, so that clients can pick the parts they need. Every API object is created by handing it a
//! storage backend that implements the traits that API requires.
//!
//! * [`order_flow_api`] applies payment outcomes to the order ledger and notifies event hook subscribers.
//! * [`side_effects_api`] runs the at-most-once side effects of a completed order (cash receipt, delivery URL).
//! * [`reconciliation_api`] ties the two together with the event store: record, apply, dispatch.
//! * [`orders_api`] is the read-only query surface over orders, events and effects.
//!
//! ```rust,ignore
//! use data_payment_engine::{MemoryDatabase, OrdersApi};
//! let db = MemoryDatabase::new();
//! let api = OrdersApi::new(db);
//! let order = api.order_by_id(&order_id).await?;
//! ```

pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
pub mod orders_api;
pub mod reconciliation_api;
pub mod side_effects_api;
