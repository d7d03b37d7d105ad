use data_payment_engine::{
    db_types::CashReceipt,
    traits::{ReceiptError, ReceiptIssuer},
};
use gateway_tools::{GatewayApiError, GatewayHttpResponse, OutboundRequest};
use mockall::mock;

use crate::integrations::GatewayTransport;

mock! {
    pub ReceiptService {}
    impl ReceiptIssuer for ReceiptService {
        async fn issue_receipt(&self, receipt: &CashReceipt) -> Result<(), ReceiptError>;
    }
}

mock! {
    pub ProviderTransport {}
    impl GatewayTransport for ProviderTransport {
        async fn send(&self, request: &OutboundRequest) -> Result<GatewayHttpResponse, GatewayApiError>;
    }
}
