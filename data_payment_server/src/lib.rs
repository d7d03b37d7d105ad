//! # Data payment gateway server
//!
//! This crate hosts the HTTP surface of the data payment gateway. It is responsible for:
//! * Initiating checkouts with a payment provider on behalf of the storefront.
//! * Receiving payment callbacks from the providers, verifying them, and handing them to the reconciliation engine.
//! * Answering each provider with the exact acknowledgement it expects, so that it stops retrying.
//! * Serving read-only order queries.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/callback/{provider_id}`: Payment callbacks. Each provider posts to its own path.
//! * `/api/checkout/{provider_id}`: Starts a checkout with the given provider.
//! * `/api/orders/...`: Order queries.
//! * `/api/admin/...`: Order search, statistics and the event log of an order. Requires the admin token.

pub mod audit;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod effect_retry_worker;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod orchestrator;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
