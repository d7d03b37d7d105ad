//! # Gateway tools
//!
//! Provider-facing plumbing shared by the gateway adapters of the data payment server:
//!
//! * [`GatewayHttpClient`] sends prepared [`OutboundRequest`]s with a bounded timeout. Timeouts are reported as
//!   [`GatewayApiError::Timeout`] so callers can treat them as retryable rather than as a payment failure.
//! * [`codec`] decodes callback bodies that arrive either as `key=value&...` blobs or as JSON objects, and encodes
//!   form bodies for the providers that want them.
//! * [`PayAppApi`] talks to PayApp's `apiLoad` endpoint (payment requests and cash receipts).
//! * [`helpers`] contains display-name, phone-number and HMAC utilities.
mod api;
mod config;
mod error;
mod payapp;

pub mod codec;
pub mod data_objects;
pub mod helpers;

pub use api::GatewayHttpClient;
pub use config::{PayAppConfig, SignedJsonConfig, DEFAULT_HTTP_TIMEOUT};
pub use data_objects::{BodyEncoding, GatewayHttpResponse, OutboundRequest};
pub use error::GatewayApiError;
pub use payapp::{CashReceiptForm, PayAppApi, PayAppReply, PayRequestForm, ReceiptValueType};
