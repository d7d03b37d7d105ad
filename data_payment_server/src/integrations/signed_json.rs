//! Integration for JSON payment providers that sign their callbacks.
//!
//! Checkouts are `POST`ed as JSON, carrying our order id as `requestId`. The provider echoes it back in every
//! callback, so the pending order is registered before the checkout call is made. Callbacks carry an HMAC-SHA256 of
//! the exact raw body in a configurable header (`X-Signature` by default), base64 or hex encoded.
//!
//! Checkout request:
//! ```json
//! { "merchantId": "m-1", "requestId": "<order id>", "orderName": "..", "amount": 50000, "buyerContact": "010..",
//!   "callbackUrl": "https://../callback/signed", "datasetId": "..", "receiptType": "personal" }
//! ```
//! Checkout response: `{ "checkoutUrl": "..", "sessionId": ".." }`
//!
//! Callback: `{ "eventId": "..", "requestId": "<order id>", "status": "PAID", "amount": 50000, .. }`
use data_payment_engine::db_types::{EventOutcome, GatewayEvent, ReceiptType};
use dpg_common::Won;
use gateway_tools::{
    codec::{parse_callback_body, CallbackFields},
    helpers::{calculate_hmac, normalize_digits, truncate_display_name, verify_hmac_signature},
    GatewayApiError,
    GatewayHttpResponse,
    OutboundRequest,
    SignedJsonConfig,
};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    errors::GatewayError,
    integrations::{
        AckResponse,
        CheckoutCall,
        CheckoutIntent,
        CheckoutSession,
        GatewayAdapter,
        RawCallback,
        ReferenceMode,
    },
};

pub const SIGNED_JSON_PROVIDER_ID: &str = "signed";
pub const SIGNED_JSON_MAX_NAME_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequestBody<'a> {
    merchant_id: &'a str,
    request_id: &'a str,
    order_name: String,
    amount: i64,
    buyer_contact: String,
    callback_url: &'a str,
    dataset_id: &'a str,
    receipt_type: ReceiptType,
    #[serde(skip_serializing_if = "Option::is_none")]
    business_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResponseBody {
    checkout_url: Option<String>,
    session_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignedJsonAdapter {
    config: SignedJsonConfig,
}

impl SignedJsonAdapter {
    pub fn new(config: SignedJsonConfig) -> Self {
        Self { config }
    }

    pub fn outcome_for(status: &str) -> EventOutcome {
        match status.to_ascii_uppercase().as_str() {
            "PAID" | "DONE" | "COMPLETED" => EventOutcome::Success,
            "FAILED" | "CANCELLED" | "CANCELED" | "ABORTED" | "EXPIRED" => EventOutcome::Failure,
            _ => EventOutcome::Other,
        }
    }

    /// Signs an outbound body the same way the provider signs its callbacks.
    fn sign(&self, request: OutboundRequest) -> OutboundRequest {
        match &self.config.secret {
            Some(secret) => {
                let signature = calculate_hmac(secret.reveal(), request.body.as_bytes());
                request.with_header(self.config.signature_header.as_str(), signature)
            },
            None => request,
        }
    }

    fn event_from_fields(&self, fields: &CallbackFields) -> Result<GatewayEvent, GatewayError> {
        let request_id =
            fields.non_empty("requestId").ok_or_else(|| GatewayError::Parse("requestId is missing".into()))?;
        let status = fields.non_empty("status").ok_or_else(|| GatewayError::Parse("status is missing".into()))?;
        let outcome = Self::outcome_for(status);
        let event_type = status.to_ascii_lowercase();
        let mut event = GatewayEvent::new(SIGNED_JSON_PROVIDER_ID, request_id, event_type.as_str(), outcome);
        if let Some(event_id) = fields.non_empty("eventId") {
            event = event.with_event_id(event_id);
        }
        if let Some(amount) = fields.non_empty("amount") {
            let amount = amount.parse::<Won>().map_err(|e| GatewayError::Parse(e.to_string()))?;
            event = event.with_amount(amount);
        }
        if let Some(contact) = fields.non_empty("buyerContact") {
            event = event.with_buyer_contact(contact);
        }
        if let Some(dataset_id) = fields.non_empty("datasetId") {
            event = event.with_dataset_id(dataset_id);
        }
        if let Some(name) = fields.non_empty("orderName") {
            event = event.with_display_name(name);
        }
        if let Some(user_id) = fields.non_empty("userId") {
            event = event.with_user_id(user_id);
        }
        let receipt_type = fields
            .non_empty("receiptType")
            .map(|s| s.parse::<ReceiptType>())
            .transpose()
            .map_err(|e| GatewayError::Parse(e.to_string()))?
            .unwrap_or_default();
        let identifier = match receipt_type {
            ReceiptType::None => None,
            ReceiptType::Personal => fields.non_empty("buyerContact").map(String::from),
            ReceiptType::Business => fields.non_empty("businessNumber").map(String::from),
        };
        Ok(event.with_receipt(receipt_type, identifier))
    }
}

impl GatewayAdapter for SignedJsonAdapter {
    fn provider_id(&self) -> &str {
        SIGNED_JSON_PROVIDER_ID
    }

    fn reference_mode(&self) -> ReferenceMode {
        ReferenceMode::ClientChosen
    }

    fn allows_late_creation(&self) -> bool {
        false
    }

    fn acks_unconditionally(&self) -> bool {
        false
    }

    fn verification_enabled(&self) -> bool {
        self.config.verification_enabled()
    }

    fn initiate_checkout(&self, intent: &CheckoutIntent, callback_url: &str) -> Result<CheckoutCall, GatewayError> {
        if !self.config.is_enabled() {
            return Err(GatewayError::Validation(
                "DPG_SIGNED_JSON_MERCHANT_ID and DPG_SIGNED_JSON_API_URL must both be set".into(),
            ));
        }
        intent.validate()?;
        let request_id = intent.order_id.as_str();
        let body = CheckoutRequestBody {
            merchant_id: self.config.merchant_id.as_str(),
            request_id,
            order_name: truncate_display_name(&intent.display_name, SIGNED_JSON_MAX_NAME_CHARS),
            amount: intent.price.value(),
            buyer_contact: normalize_digits(&intent.buyer_contact),
            callback_url,
            dataset_id: intent.dataset_id.as_str(),
            receipt_type: intent.receipt_type,
            business_number: intent.business_number.as_deref().map(normalize_digits),
            user_id: intent.user_id.as_deref(),
        };
        let body = serde_json::to_string(&body).map_err(|e| GatewayError::Validation(e.to_string()))?;
        let request = self.sign(OutboundRequest::json(self.config.api_url.as_str(), body));
        Ok(CheckoutCall { request, provider_ref: Some(request_id.to_string()) })
    }

    fn parse_checkout_response(
        &self,
        intent: &CheckoutIntent,
        response: &GatewayHttpResponse,
    ) -> Result<CheckoutSession, GatewayError> {
        match response.status {
            200..=299 => {},
            400..=499 => return Err(GatewayError::Rejected(response.body.clone())),
            status => return Err(GatewayApiError::QueryError { status, message: response.body.clone() }.into()),
        }
        let body = serde_json::from_str::<CheckoutResponseBody>(&response.body)
            .map_err(|e| GatewayError::Parse(format!("Invalid checkout response. {e}")))?;
        if body.checkout_url.is_none() && body.session_id.is_none() {
            return Err(GatewayError::Parse("The checkout response has neither a checkoutUrl nor a sessionId".into()));
        }
        Ok(CheckoutSession {
            provider_ref: intent.order_id.to_string(),
            redirect_url: body.checkout_url,
            payment_handle: body.session_id,
        })
    }

    fn parse_callback(&self, raw: &RawCallback) -> Result<GatewayEvent, GatewayError> {
        let fields = parse_callback_body(&raw.body).map_err(|e| GatewayError::Parse(e.to_string()))?;
        self.event_from_fields(&fields)
    }

    fn verify_authenticity(&self, raw: &RawCallback, event: &GatewayEvent) -> bool {
        let Some(secret) = &self.config.secret else {
            return true;
        };
        match raw.header(&self.config.signature_header) {
            Some(signature) => verify_hmac_signature(secret.reveal(), &raw.body, signature),
            None => {
                debug!("🔐️ Callback {} has no {} header", event.event_key, self.config.signature_header);
                false
            },
        }
    }

    fn ack_response(&self, event: Option<&GatewayEvent>) -> AckResponse {
        match event {
            Some(e) => AckResponse::json(200, json!({ "success": true, "eventKey": e.event_key })),
            None => AckResponse::json(200, json!({ "success": true })),
        }
    }
}
