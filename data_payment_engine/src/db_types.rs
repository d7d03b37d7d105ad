use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use dpg_common::Won;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {field}: {value}")]
pub struct ConversionError {
    pub field: &'static str,
    pub value: String,
}

impl ConversionError {
    fn new(field: &'static str, value: &str) -> Self {
        Self { field, value: value.to_string() }
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    /// A fresh, never-reused order id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// The order is registered and waiting for the gateway to report an outcome.
    Pending,
    /// Terminal. The gateway reported a successful payment.
    Completed,
    /// Terminal. The gateway reported a failed or cancelled payment.
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Completed => write!(f, "completed"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ConversionError::new("payment status", s)),
        }
    }
}

//--------------------------------------     DeliveryStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
        }
    }
}

//--------------------------------------      ReceiptType      ---------------------------------------------------------
/// The kind of cash receipt the buyer asked for at checkout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReceiptType {
    #[default]
    None,
    /// Income deduction receipt, issued against the buyer's phone number.
    Personal,
    /// Expense proof receipt, issued against a business registration number.
    Business,
}

impl ReceiptType {
    pub fn is_requested(&self) -> bool {
        !matches!(self, ReceiptType::None)
    }
}

impl Display for ReceiptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiptType::None => write!(f, "none"),
            ReceiptType::Personal => write!(f, "personal"),
            ReceiptType::Business => write!(f, "business"),
        }
    }
}

impl FromStr for ReceiptType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "personal" => Ok(Self::Personal),
            "business" => Ok(Self::Business),
            _ => Err(ConversionError::new("receipt type", s)),
        }
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub provider_id: String,
    /// The gateway's reference for this order. Unique per provider.
    pub provider_ref: String,
    pub user_id: Option<String>,
    pub dataset_id: String,
    pub display_name: String,
    pub price: Won,
    pub buyer_contact: String,
    pub receipt_type: ReceiptType,
    /// Business registration number for business receipts. Personal receipts use the buyer contact.
    pub receipt_identifier: Option<String>,
    pub payment_status: PaymentStatus,
    pub delivery_status: DeliveryStatus,
    pub delivery_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds the record for a freshly registered order.
    pub fn from_new(order: NewOrder, payment_status: PaymentStatus, at: DateTime<Utc>) -> Self {
        let completed_at = (payment_status == PaymentStatus::Completed).then_some(at);
        Self {
            order_id: order.order_id,
            provider_id: order.provider_id,
            provider_ref: order.provider_ref,
            user_id: order.user_id,
            dataset_id: order.dataset_id,
            display_name: order.display_name,
            price: order.price,
            buyer_contact: order.buyer_contact,
            receipt_type: order.receipt_type,
            receipt_identifier: order.receipt_identifier,
            payment_status,
            delivery_status: DeliveryStatus::Pending,
            delivery_url: None,
            created_at: at,
            completed_at,
            updated_at: at,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.payment_status == PaymentStatus::Completed
    }

    pub fn is_delivered(&self) -> bool {
        self.delivery_status == DeliveryStatus::Delivered
    }

    /// The identifier a cash receipt is issued against, if the buyer asked for one.
    pub fn receipt_id_info(&self) -> Option<&str> {
        match self.receipt_type {
            ReceiptType::None => None,
            ReceiptType::Personal => Some(self.buyer_contact.as_str()),
            ReceiptType::Business => self.receipt_identifier.as_deref(),
        }
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub provider_id: String,
    pub provider_ref: String,
    pub user_id: Option<String>,
    pub dataset_id: String,
    pub display_name: String,
    pub price: Won,
    pub buyer_contact: String,
    pub receipt_type: ReceiptType,
    pub receipt_identifier: Option<String>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(provider_id: S, provider_ref: S, dataset_id: S, price: Won) -> Self {
        Self {
            order_id: OrderId::random(),
            provider_id: provider_id.into(),
            provider_ref: provider_ref.into(),
            user_id: None,
            dataset_id: dataset_id.into(),
            display_name: String::default(),
            price,
            buyer_contact: String::default(),
            receipt_type: ReceiptType::None,
            receipt_identifier: None,
        }
    }

    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = order_id;
        self
    }

    pub fn with_display_name<S: Into<String>>(mut self, name: S) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_buyer_contact<S: Into<String>>(mut self, contact: S) -> Self {
        self.buyer_contact = contact.into();
        self
    }

    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_receipt(mut self, receipt_type: ReceiptType, identifier: Option<String>) -> Self {
        self.receipt_type = receipt_type;
        self.receipt_identifier = identifier;
        self
    }
}

//--------------------------------------      EventOutcome     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    Success,
    Failure,
    /// Informational notifications (partial refunds, pending notices and the like). Recorded, never applied.
    Other,
}

impl Display for EventOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventOutcome::Success => write!(f, "success"),
            EventOutcome::Failure => write!(f, "failure"),
            EventOutcome::Other => write!(f, "other"),
        }
    }
}

//--------------------------------------      GatewayEvent     ---------------------------------------------------------
/// An immutable fact received from a payment provider, normalised by the provider's adapter.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// Provider-scoped dedupe key. See [`GatewayEvent::key_for`] and [`GatewayEvent::key_for_event_id`].
    pub event_key: String,
    pub provider_id: String,
    pub provider_ref: String,
    pub event_type: String,
    pub outcome: EventOutcome,
    pub amount: Option<Won>,
    pub buyer_contact: Option<String>,
    pub dataset_id: Option<String>,
    pub display_name: Option<String>,
    pub user_id: Option<String>,
    pub receipt_type: ReceiptType,
    pub receipt_identifier: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl GatewayEvent {
    pub fn new<S: Into<String>>(provider_id: S, provider_ref: S, event_type: S, outcome: EventOutcome) -> Self {
        let provider_id = provider_id.into();
        let provider_ref = provider_ref.into();
        let event_type = event_type.into();
        let event_key = Self::key_for(&provider_id, &provider_ref, &event_type);
        Self {
            event_key,
            provider_id,
            provider_ref,
            event_type,
            outcome,
            amount: None,
            buyer_contact: None,
            dataset_id: None,
            display_name: None,
            user_id: None,
            receipt_type: ReceiptType::None,
            receipt_identifier: None,
            received_at: Utc::now(),
        }
    }

    pub fn key_for(provider_id: &str, provider_ref: &str, event_type: &str) -> String {
        format!("{provider_id}:{provider_ref}:{event_type}")
    }

    pub fn key_for_event_id(provider_id: &str, event_id: &str) -> String {
        format!("{provider_id}:{event_id}")
    }

    /// Use the provider's own event id as the dedupe key.
    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_key = Self::key_for_event_id(&self.provider_id, event_id);
        self
    }

    pub fn with_amount(mut self, amount: Won) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_buyer_contact<S: Into<String>>(mut self, contact: S) -> Self {
        self.buyer_contact = Some(contact.into());
        self
    }

    pub fn with_dataset_id<S: Into<String>>(mut self, dataset_id: S) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }

    pub fn with_display_name<S: Into<String>>(mut self, name: S) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_receipt(mut self, receipt_type: ReceiptType, identifier: Option<String>) -> Self {
        self.receipt_type = receipt_type;
        self.receipt_identifier = identifier;
        self
    }

    /// The order a success event describes, for channels where the gateway may report payments the server never
    /// registered. Returns `None` if the event lacks the amount or dataset needed to create one.
    pub fn to_late_order(&self) -> Option<NewOrder> {
        let amount = self.amount.filter(|a| a.is_positive())?;
        let dataset_id = self.dataset_id.clone().filter(|d| !d.is_empty())?;
        Some(NewOrder {
            order_id: OrderId::random(),
            provider_id: self.provider_id.clone(),
            provider_ref: self.provider_ref.clone(),
            user_id: self.user_id.clone(),
            dataset_id,
            display_name: self.display_name.clone().unwrap_or_default(),
            price: amount,
            buyer_contact: self.buyer_contact.clone().unwrap_or_default(),
            receipt_type: self.receipt_type,
            receipt_identifier: self.receipt_identifier.clone(),
        })
    }
}

//--------------------------------------       EffectType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EffectType {
    Receipt,
    Delivery,
}

impl Display for EffectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffectType::Receipt => write!(f, "receipt"),
            EffectType::Delivery => write!(f, "delivery"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EffectStatus {
    Running,
    Done,
    Failed,
}

impl Display for EffectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffectStatus::Running => write!(f, "running"),
            EffectStatus::Done => write!(f, "done"),
            EffectStatus::Failed => write!(f, "failed"),
        }
    }
}

//--------------------------------------      EffectRecord     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct EffectRecord {
    pub order_id: OrderId,
    pub effect_type: EffectType,
    pub status: EffectStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub claimed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      CashReceipt      ---------------------------------------------------------
/// Everything the receipt issuer needs to register a cash receipt for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashReceipt {
    pub order_id: OrderId,
    pub receipt_type: ReceiptType,
    pub id_info: String,
    pub buyer_contact: String,
    pub display_name: String,
    pub price: Won,
}

impl CashReceipt {
    /// `None` if the order did not ask for a receipt, or lacks the identifier to issue one against.
    pub fn for_order(order: &Order) -> Option<Self> {
        let id_info = order.receipt_id_info().map(str::trim).filter(|s| !s.is_empty())?;
        Some(Self {
            order_id: order.order_id.clone(),
            receipt_type: order.receipt_type,
            id_info: id_info.to_string(),
            buyer_contact: order.buyer_contact.clone(),
            display_name: order.display_name.clone(),
            price: order.price,
        })
    }
}
