//! # Gateway adapters
//!
//! Every payment provider speaks its own dialect. An adapter translates between that dialect and the engine's
//! canonical types:
//! * outbound, a [`CheckoutIntent`] becomes a provider-specific [`OutboundRequest`], and the provider's answer becomes
//!   a [`CheckoutSession`];
//! * inbound, a [`RawCallback`] becomes a [`GatewayEvent`], is checked for authenticity, and is answered with the
//!   exact [`AckResponse`] the provider expects.
//!
//! Adapters do no I/O. The orchestrator sends what they build and hands them what comes back, which keeps them
//! trivially testable. The orchestrator only knows about the [`GatewayAdapter`] trait, and finds adapters in a
//! [`GatewayRegistry`] keyed by provider id.
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use bytes::Bytes;
use data_payment_engine::db_types::{GatewayEvent, OrderId, ReceiptType};
use dpg_common::Won;
use gateway_tools::{
    helpers::{is_valid_business_number, is_valid_mobile_number},
    GatewayApiError,
    GatewayHttpClient,
    GatewayHttpResponse,
    OutboundRequest,
};

use crate::errors::GatewayError;

pub mod payapp;
pub mod signed_json;

pub use payapp::{PayAppAdapter, PayAppReceiptIssuer, PAYAPP_PROVIDER_ID};
pub use signed_json::{SignedJsonAdapter, SIGNED_JSON_PROVIDER_ID};

/// A validated request to sell one dataset to one buyer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutIntent {
    pub order_id: OrderId,
    pub dataset_id: String,
    pub display_name: String,
    pub price: Won,
    pub buyer_contact: String,
    pub user_id: Option<String>,
    pub receipt_type: ReceiptType,
    /// Required for business receipts.
    pub business_number: Option<String>,
}

impl CheckoutIntent {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.dataset_id.trim().is_empty() {
            return Err(GatewayError::Validation("A dataset id is required".into()));
        }
        if self.display_name.trim().is_empty() {
            return Err(GatewayError::Validation("A display name is required".into()));
        }
        if !self.price.is_positive() {
            return Err(GatewayError::Validation(format!("The price must be positive, but was {}", self.price)));
        }
        if !is_valid_mobile_number(&self.buyer_contact) {
            return Err(GatewayError::Validation(format!(
                "'{}' is not a valid mobile phone number",
                self.buyer_contact
            )));
        }
        if self.receipt_type == ReceiptType::Business {
            match self.business_number.as_deref() {
                Some(n) if is_valid_business_number(n) => {},
                Some(n) => {
                    return Err(GatewayError::Validation(format!("'{n}' is not a valid business registration number")))
                },
                None => {
                    return Err(GatewayError::Validation(
                        "A business registration number is required for business receipts".into(),
                    ))
                },
            }
        }
        Ok(())
    }

    /// The identifier a cash receipt for this checkout would be issued against.
    pub fn receipt_identifier(&self) -> Option<String> {
        match self.receipt_type {
            ReceiptType::None => None,
            ReceiptType::Personal => Some(self.buyer_contact.clone()),
            ReceiptType::Business => self.business_number.clone(),
        }
    }
}

/// Who decides the provider reference of a new payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceMode {
    /// The provider assigns the reference in its checkout response. The pending order is registered after the call.
    GatewayAssigned,
    /// We choose the reference (the order id) and the provider echoes it back in callbacks. The pending order is
    /// registered before the call, so a fast callback never beats the order into the ledger.
    ClientChosen,
}

/// An outbound checkout call, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCall {
    pub request: OutboundRequest,
    /// Set when the reference is known before the call is made.
    pub provider_ref: Option<String>,
}

/// What the provider told us about a new payment session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub provider_ref: String,
    /// Where to send the buyer to pay.
    pub redirect_url: Option<String>,
    /// An opaque handle for client-side payment widgets.
    pub payment_handle: Option<String>,
}

/// A callback exactly as it reached us. Header names are lowercase.
#[derive(Debug, Clone, Default)]
pub struct RawCallback {
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RawCallback {
    pub fn new<B: Into<Bytes>>(body: B) -> Self {
        Self { headers: Vec::new(), body: body.into() }
    }

    pub fn with_header<K: AsRef<str>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.push((key.as_ref().to_ascii_lowercase(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str())
    }
}

/// The HTTP answer a provider expects for a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl AckResponse {
    pub fn text<S: Into<String>>(body: S) -> Self {
        Self { status: 200, content_type: "text/plain; charset=utf-8", body: body.into() }
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self { status, content_type: "application/json", body: body.to_string() }
    }
}

/// The capability set every payment provider integration offers.
pub trait GatewayAdapter: Send + Sync + Debug {
    fn provider_id(&self) -> &str;

    fn reference_mode(&self) -> ReferenceMode;

    /// Whether a success callback for a reference we never registered may create the order on first sight.
    fn allows_late_creation(&self) -> bool;

    /// Whether the provider must get its success acknowledgement even for callbacks we could not parse.
    fn acks_unconditionally(&self) -> bool;

    /// `false` when no shared secret is configured, and every callback is accepted unverified.
    fn verification_enabled(&self) -> bool;

    fn initiate_checkout(&self, intent: &CheckoutIntent, callback_url: &str) -> Result<CheckoutCall, GatewayError>;

    fn parse_checkout_response(
        &self,
        intent: &CheckoutIntent,
        response: &GatewayHttpResponse,
    ) -> Result<CheckoutSession, GatewayError>;

    fn parse_callback(&self, raw: &RawCallback) -> Result<GatewayEvent, GatewayError>;

    fn verify_authenticity(&self, raw: &RawCallback, event: &GatewayEvent) -> bool;

    /// The answer for a callback. `None` means the callback could not be parsed.
    fn ack_response(&self, event: Option<&GatewayEvent>) -> AckResponse;
}

/// Sends prepared provider calls. Timeouts must be reported as [`GatewayApiError::Timeout`].
#[allow(async_fn_in_trait)]
pub trait GatewayTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<GatewayHttpResponse, GatewayApiError>;
}

impl GatewayTransport for GatewayHttpClient {
    async fn send(&self, request: &OutboundRequest) -> Result<GatewayHttpResponse, GatewayApiError> {
        GatewayHttpClient::send(self, request).await
    }
}

impl<T: GatewayTransport> GatewayTransport for Arc<T> {
    async fn send(&self, request: &OutboundRequest) -> Result<GatewayHttpResponse, GatewayApiError> {
        self.as_ref().send(request).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct GatewayRegistry {
    adapters: HashMap<String, Arc<dyn GatewayAdapter>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A: GatewayAdapter + 'static>(&mut self, adapter: A) -> &mut Self {
        self.adapters.insert(adapter.provider_id().to_string(), Arc::new(adapter));
        self
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn GatewayAdapter>> {
        self.adapters.get(provider_id).cloned()
    }

    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids = self.adapters.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }
}
