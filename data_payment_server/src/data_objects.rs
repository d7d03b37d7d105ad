use data_payment_engine::{
    db_types::{DeliveryStatus, EffectRecord, GatewayEvent, Order, OrderId, PaymentStatus, ReceiptType},
    order_objects::OrderQueryFilter,
    EffectRun,
};
use dpg_common::Won;
use serde::{Deserialize, Serialize};

use crate::{errors::ServerError, integrations::CheckoutIntent};

/// Body of `POST /api/checkout/{provider_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub dataset_id: String,
    pub display_name: String,
    pub price: Won,
    pub buyer_contact: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub receipt_type: ReceiptType,
    pub business_number: Option<String>,
}

impl CheckoutRequest {
    /// Converts the request into an intent with a fresh order id. Blank optional fields are dropped.
    pub fn into_intent(self) -> CheckoutIntent {
        let non_blank = |s: Option<String>| s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        CheckoutIntent {
            order_id: OrderId::random(),
            dataset_id: self.dataset_id.trim().to_string(),
            display_name: self.display_name,
            price: self.price,
            buyer_contact: self.buyer_contact.trim().to_string(),
            user_id: non_blank(self.user_id),
            receipt_type: self.receipt_type,
            business_number: non_blank(self.business_number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: OrderId,
    pub provider_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_handle: Option<String>,
}

/// Answer to `POST /api/admin/orders/{order_id}/receipt`. `receipt` says what this call did, and `record` is the
/// receipt's bookkeeping after the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptIssueResponse {
    pub order_id: OrderId,
    pub receipt: EffectRun,
    pub record: Option<EffectRecord>,
}

/// Query string of `GET /api/admin/orders`. `status` is a comma-separated list of payment statuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminOrderQuery {
    pub status: Option<String>,
    pub delivery: Option<DeliveryStatus>,
    pub provider: Option<String>,
    pub dataset: Option<String>,
    pub user: Option<String>,
    pub limit: Option<i64>,
}

impl TryFrom<AdminOrderQuery> for OrderQueryFilter {
    type Error = ServerError;

    fn try_from(query: AdminOrderQuery) -> Result<Self, Self::Error> {
        let mut filter = OrderQueryFilter::default();
        if let Some(statuses) = query.status {
            for s in statuses.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let status = s.parse::<PaymentStatus>().map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
                filter = filter.with_payment_status(status);
            }
        }
        if let Some(delivery) = query.delivery {
            filter = filter.with_delivery_status(delivery);
        }
        if let Some(provider) = query.provider {
            filter = filter.with_provider_id(provider);
        }
        if let Some(dataset) = query.dataset {
            filter = filter.with_dataset_id(dataset);
        }
        if let Some(user) = query.user {
            filter = filter.with_user_id(user);
        }
        if let Some(limit) = query.limit {
            filter = filter.with_limit(limit);
        }
        Ok(filter)
    }
}

/// Everything we know about one order: the order itself, the gateway events recorded for it, and its side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEventLog {
    pub order: Order,
    pub events: Vec<GatewayEvent>,
    pub effects: Vec<EffectRecord>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn admin_query_to_filter() {
        let query = AdminOrderQuery {
            status: Some("completed, failed".into()),
            provider: Some("payapp".into()),
            limit: Some(10),
            ..Default::default()
        };
        let filter = OrderQueryFilter::try_from(query).unwrap();
        assert_eq!(filter.payment_statuses, vec![PaymentStatus::Completed, PaymentStatus::Failed]);
        assert_eq!(filter.provider_id.as_deref(), Some("payapp"));
        assert_eq!(filter.limit, Some(10));
        let bad = AdminOrderQuery { status: Some("paid".into()), ..Default::default() };
        assert!(OrderQueryFilter::try_from(bad).is_err());
    }

    #[test]
    fn checkout_request_defaults() {
        let json = r#"{"datasetId":" ds-1 ","displayName":"Data","price":5000,"buyerContact":"01012345678",
                       "businessNumber":"  "}"#;
        let req = serde_json::from_str::<CheckoutRequest>(json).unwrap();
        assert_eq!(req.receipt_type, ReceiptType::None);
        let intent = req.into_intent();
        assert_eq!(intent.dataset_id, "ds-1");
        assert_eq!(intent.business_number, None);
        assert_eq!(intent.user_id, None);
        assert_eq!(intent.price, Won::from(5000));
    }
}
