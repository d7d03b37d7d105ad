use std::fmt::Display;

use dpg_common::Won;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    codec::{encode_form, parse_form_blob, CallbackFields},
    helpers::normalize_digits,
    GatewayApiError,
    GatewayHttpClient,
    OutboundRequest,
    PayAppConfig,
};

/// Form fields of a PayApp `payrequest` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayRequestForm {
    pub user_id: String,
    pub good_name: String,
    pub price: Won,
    pub recv_phone: String,
    pub feedback_url: String,
    pub dataset_id: String,
    pub receipt_type: String,
    pub business_number: String,
}

/// The `payrequest` body as it goes over the wire. Field order is the order PayApp documents.
#[derive(Serialize)]
struct PayRequestBody<'a> {
    cmd: &'static str,
    userid: &'a str,
    goodname: &'a str,
    price: i64,
    recvphone: String,
    smsuse: &'static str,
    feedbackurl: &'a str,
    var1: &'a str,
    var2: &'a str,
    var3: &'a str,
}

impl PayRequestForm {
    pub fn to_request(&self, api_url: &str) -> Result<OutboundRequest, GatewayApiError> {
        let body = PayRequestBody {
            cmd: "payrequest",
            userid: self.user_id.as_str(),
            goodname: self.good_name.as_str(),
            price: self.price.value(),
            recvphone: normalize_digits(&self.recv_phone),
            smsuse: "n",
            feedbackurl: self.feedback_url.as_str(),
            var1: self.dataset_id.as_str(),
            var2: self.receipt_type.as_str(),
            var3: self.business_number.as_str(),
        };
        let body = encode_form(&body).map_err(|e| GatewayApiError::InvalidRequest(e.to_string()))?;
        Ok(OutboundRequest::form(api_url, body))
    }
}

/// `val_type` of a cash receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptValueType {
    /// Income deduction receipt, identified by the buyer's phone number.
    Personal,
    /// Expense proof receipt, identified by a business registration number.
    Business,
}

impl ReceiptValueType {
    pub fn code(&self) -> &'static str {
        match self {
            ReceiptValueType::Personal => "1",
            ReceiptValueType::Business => "2",
        }
    }
}

impl Display for ReceiptValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashReceiptForm {
    pub good_name: String,
    pub buyer_phone: String,
    pub id_info: String,
    pub price: Won,
    pub value_type: ReceiptValueType,
}

#[derive(Serialize)]
struct CashReceiptBody<'a> {
    cmd: &'static str,
    userid: &'a str,
    good_name: &'a str,
    buy_tel: String,
    id_info: String,
    price: i64,
    val_type: &'static str,
}

/// The `key=value&...` answer PayApp gives to every `apiLoad` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayAppReply {
    pub state: String,
    pub mul_no: Option<String>,
    pub pay_url: Option<String>,
    pub message: Option<String>,
}

impl PayAppReply {
    pub fn parse(body: &str) -> Result<Self, GatewayApiError> {
        let fields = parse_form_blob(body.trim()).map_err(|e| GatewayApiError::InvalidResponse(e.to_string()))?;
        Ok(Self::from_fields(&fields))
    }

    pub fn from_fields(fields: &CallbackFields) -> Self {
        let owned = |k: &str| fields.non_empty(k).map(String::from);
        Self {
            state: fields.get("state").unwrap_or_default().trim().to_string(),
            mul_no: owned("mul_no"),
            pay_url: owned("payurl"),
            message: owned("errorMessage").or_else(|| owned("msg")),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == "1"
    }

    pub fn error_message(&self) -> String {
        self.message.clone().unwrap_or_else(|| format!("PayApp returned state '{}'", self.state))
    }
}

/// Client for the PayApp commands the server issues on its own (as opposed to the checkout call, which the PayApp
/// adapter prepares and the orchestrator sends).
#[derive(Clone)]
pub struct PayAppApi {
    config: PayAppConfig,
    http: GatewayHttpClient,
}

impl PayAppApi {
    pub fn new(config: PayAppConfig, http: GatewayHttpClient) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &PayAppConfig {
        &self.config
    }

    pub fn cash_receipt_request(&self, form: &CashReceiptForm) -> Result<OutboundRequest, GatewayApiError> {
        let body = CashReceiptBody {
            cmd: "cashreceipt_regist",
            userid: self.config.user_id.as_str(),
            good_name: form.good_name.as_str(),
            buy_tel: normalize_digits(&form.buyer_phone),
            id_info: normalize_digits(&form.id_info),
            price: form.price.value(),
            val_type: form.value_type.code(),
        };
        let body = encode_form(&body).map_err(|e| GatewayApiError::InvalidRequest(e.to_string()))?;
        Ok(OutboundRequest::form(self.config.api_url.as_str(), body))
    }

    /// Registers a cash receipt. A reply with `state != 1` is reported as a [`GatewayApiError::QueryError`].
    pub async fn register_cash_receipt(&self, form: &CashReceiptForm) -> Result<PayAppReply, GatewayApiError> {
        if self.config.user_id.trim().is_empty() {
            return Err(GatewayApiError::NotConfigured("DPG_PAYAPP_USER_ID is not set".into()));
        }
        let request = self.cash_receipt_request(form)?;
        let response = self.http.send(&request).await?;
        if !response.is_success() {
            return Err(GatewayApiError::QueryError { status: response.status, message: response.body });
        }
        let reply = PayAppReply::parse(&response.body)?;
        if reply.is_success() {
            info!("💳️ PayApp registered a {:?} cash receipt for {}", form.value_type, form.price);
            Ok(reply)
        } else {
            Err(GatewayApiError::QueryError { status: response.status, message: reply.error_message() })
        }
    }
}
