//! PayApp integration.
//!
//! PayApp speaks `application/x-www-form-urlencoded` in both directions. A `payrequest` call answers with
//! `state=1&mul_no=..&payurl=..`, and from then on PayApp posts "feedback" to our callback URL every time the payment
//! changes state, until we answer with the literal body `SUCCESS`. The payment is identified by `mul_no`, which PayApp
//! assigns. The dataset id, receipt type and business number travel through the `var1`..`var3` pass-through fields.
//!
//! PayApp's JS widget can start payments that this server never registered, so feedback for an unknown `mul_no` may
//! create the order on first sight.
use data_payment_engine::{
    db_types::{CashReceipt, EventOutcome, GatewayEvent, ReceiptType},
    traits::{ReceiptError, ReceiptIssuer},
};
use dpg_common::Won;
use gateway_tools::{
    codec::{parse_callback_body, CallbackFields},
    helpers::{tokens_match, truncate_display_name},
    CashReceiptForm,
    GatewayApiError,
    GatewayHttpResponse,
    PayAppApi,
    PayAppConfig,
    PayAppReply,
    PayRequestForm,
    ReceiptValueType,
};
use log::*;

use crate::{
    errors::GatewayError,
    integrations::{AckResponse, CheckoutCall, CheckoutIntent, CheckoutSession, GatewayAdapter, RawCallback},
};

pub const PAYAPP_PROVIDER_ID: &str = "payapp";
/// PayApp truncates longer product names on its payment page.
pub const PAYAPP_MAX_NAME_CHARS: usize = 20;
/// `pay_state` of a completed payment.
pub const PAY_STATE_COMPLETED: &str = "4";
/// `pay_state` values that end a payment without taking the money: cancellations, refunds and expiry.
pub const PAY_STATES_FAILED: [&str; 6] = ["8", "16", "32", "64", "70", "71"];

#[derive(Debug, Clone)]
pub struct PayAppAdapter {
    config: PayAppConfig,
}

impl PayAppAdapter {
    pub fn new(config: PayAppConfig) -> Self {
        Self { config }
    }

    pub fn outcome_for(pay_state: &str) -> EventOutcome {
        match pay_state {
            PAY_STATE_COMPLETED => EventOutcome::Success,
            s if PAY_STATES_FAILED.contains(&s) => EventOutcome::Failure,
            _ => EventOutcome::Other,
        }
    }

    fn event_from_fields(&self, fields: &CallbackFields) -> Result<GatewayEvent, GatewayError> {
        let mul_no = fields.non_empty("mul_no").ok_or_else(|| GatewayError::Parse("mul_no is missing".into()))?;
        let pay_state =
            fields.non_empty("pay_state").ok_or_else(|| GatewayError::Parse("pay_state is missing".into()))?;
        let outcome = Self::outcome_for(pay_state);
        let event_type = format!("pay_state_{pay_state}");
        let mut event = GatewayEvent::new(PAYAPP_PROVIDER_ID, mul_no, event_type.as_str(), outcome);
        if let Some(price) = fields.non_empty("price") {
            match price.parse::<Won>() {
                Ok(amount) => event = event.with_amount(amount),
                Err(e) => warn!("💳️ PayApp feedback for {mul_no} has an unreadable price. {e}"),
            }
        }
        if let Some(phone) = fields.non_empty("recvphone") {
            event = event.with_buyer_contact(phone);
        }
        if let Some(dataset_id) = fields.non_empty("var1") {
            event = event.with_dataset_id(dataset_id);
        }
        if let Some(name) = fields.non_empty("goodname") {
            event = event.with_display_name(name);
        }
        let receipt_type = fields.non_empty("var2").map_or(ReceiptType::None, |s| {
            s.parse::<ReceiptType>().unwrap_or_else(|e| {
                warn!("💳️ PayApp feedback for {mul_no} has an unknown receipt type. {e}");
                ReceiptType::None
            })
        });
        let identifier = match receipt_type {
            ReceiptType::None => None,
            ReceiptType::Personal => fields.non_empty("recvphone").map(String::from),
            ReceiptType::Business => fields.non_empty("var3").map(String::from),
        };
        Ok(event.with_receipt(receipt_type, identifier))
    }
}

impl GatewayAdapter for PayAppAdapter {
    fn provider_id(&self) -> &str {
        PAYAPP_PROVIDER_ID
    }

    fn reference_mode(&self) -> super::ReferenceMode {
        super::ReferenceMode::GatewayAssigned
    }

    fn allows_late_creation(&self) -> bool {
        true
    }

    fn acks_unconditionally(&self) -> bool {
        true
    }

    fn verification_enabled(&self) -> bool {
        self.config.verification_enabled()
    }

    fn initiate_checkout(&self, intent: &CheckoutIntent, callback_url: &str) -> Result<CheckoutCall, GatewayError> {
        if self.config.user_id.trim().is_empty() {
            return Err(GatewayError::Validation("No PayApp merchant id. Set DPG_PAYAPP_USER_ID".into()));
        }
        intent.validate()?;
        let form = PayRequestForm {
            user_id: self.config.user_id.clone(),
            good_name: truncate_display_name(&intent.display_name, PAYAPP_MAX_NAME_CHARS),
            price: intent.price,
            recv_phone: intent.buyer_contact.clone(),
            feedback_url: callback_url.to_string(),
            dataset_id: intent.dataset_id.clone(),
            receipt_type: intent.receipt_type.to_string(),
            business_number: intent.business_number.clone().unwrap_or_default(),
        };
        Ok(CheckoutCall { request: form.to_request(&self.config.api_url)?, provider_ref: None })
    }

    fn parse_checkout_response(
        &self,
        _intent: &CheckoutIntent,
        response: &GatewayHttpResponse,
    ) -> Result<CheckoutSession, GatewayError> {
        if !response.is_success() {
            return Err(GatewayApiError::QueryError { status: response.status, message: response.body.clone() }.into());
        }
        let reply = PayAppReply::parse(&response.body)?;
        if !reply.is_success() {
            return Err(GatewayError::Rejected(reply.error_message()));
        }
        let provider_ref =
            reply.mul_no.ok_or_else(|| GatewayError::Parse("PayApp accepted the payment without a mul_no".into()))?;
        Ok(CheckoutSession { provider_ref, redirect_url: reply.pay_url, payment_handle: None })
    }

    fn parse_callback(&self, raw: &RawCallback) -> Result<GatewayEvent, GatewayError> {
        let fields = parse_callback_body(&raw.body).map_err(|e| GatewayError::Parse(e.to_string()))?;
        self.event_from_fields(&fields)
    }

    fn verify_authenticity(&self, raw: &RawCallback, _event: &GatewayEvent) -> bool {
        let (Some(key), Some(val)) = (&self.config.link_key, &self.config.link_val) else {
            return true;
        };
        let Ok(fields) = parse_callback_body(&raw.body) else {
            return false;
        };
        let key_ok = tokens_match(key.reveal(), fields.get("linkkey").unwrap_or_default());
        let val_ok = tokens_match(val.reveal(), fields.get("linkval").unwrap_or_default());
        key_ok && val_ok
    }

    fn ack_response(&self, _event: Option<&GatewayEvent>) -> AckResponse {
        AckResponse::text(self.config.ack.as_str())
    }
}

/// Registers cash receipts through PayApp's `cashreceipt_regist` command.
#[derive(Clone)]
pub struct PayAppReceiptIssuer {
    api: PayAppApi,
}

impl PayAppReceiptIssuer {
    pub fn new(api: PayAppApi) -> Self {
        Self { api }
    }
}

impl ReceiptIssuer for PayAppReceiptIssuer {
    async fn issue_receipt(&self, receipt: &CashReceipt) -> Result<(), ReceiptError> {
        let value_type = match receipt.receipt_type {
            ReceiptType::Personal => ReceiptValueType::Personal,
            ReceiptType::Business => ReceiptValueType::Business,
            ReceiptType::None => {
                return Err(ReceiptError::Rejected(format!("Order {} did not request a receipt", receipt.order_id)))
            },
        };
        let form = CashReceiptForm {
            good_name: truncate_display_name(&receipt.display_name, PAYAPP_MAX_NAME_CHARS),
            buyer_phone: receipt.buyer_contact.clone(),
            id_info: receipt.id_info.clone(),
            price: receipt.price,
            value_type,
        };
        debug!("💳️ Registering a {} cash receipt for order {}", receipt.receipt_type, receipt.order_id);
        self.api.register_cash_receipt(&form).await.map(|_| ()).map_err(|e| match e {
            GatewayApiError::NotConfigured(s) => ReceiptError::NotConfigured(s),
            e if e.is_retryable() => ReceiptError::Unavailable(e.to_string()),
            e => ReceiptError::Rejected(e.to_string()),
        })
    }
}
