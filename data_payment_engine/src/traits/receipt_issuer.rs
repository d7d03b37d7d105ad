use thiserror::Error;

use crate::db_types::CashReceipt;

#[derive(Debug, Clone, Error)]
pub enum ReceiptError {
    #[error("The receipt request was rejected. {0}")]
    Rejected(String),
    #[error("The receipt service is unavailable. {0}")]
    Unavailable(String),
    #[error("Receipts cannot be issued. {0}")]
    NotConfigured(String),
}

/// Registers cash receipts with an external service.
#[allow(async_fn_in_trait)]
pub trait ReceiptIssuer {
    async fn issue_receipt(&self, receipt: &CashReceipt) -> Result<(), ReceiptError>;
}
