use thiserror::Error;

use crate::traits::{EffectStoreError, EventStoreError, LedgerError, OrderQueryError};

#[derive(Debug, Clone, Error)]
pub enum SideEffectError {
    #[error("Effect bookkeeping failed. {0}")]
    EffectStore(#[from] EffectStoreError),
    #[error("Could not update the order ledger. {0}")]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("Could not record the gateway event. {0}")]
    EventStore(#[from] EventStoreError),
    #[error("Could not apply the payment outcome. {0}")]
    Ledger(#[from] LedgerError),
    #[error("Could not dispatch side effects. {0}")]
    SideEffect(#[from] SideEffectError),
}

impl ReconciliationError {
    /// True when the event was not durably applied and the provider should deliver it again.
    pub fn needs_redelivery(&self) -> bool {
        matches!(self, Self::EventStore(_) | Self::Ledger(LedgerError::DatabaseError(_)))
    }
}

impl From<EventStoreError> for OrderQueryError {
    fn from(e: EventStoreError) -> Self {
        match e {
            EventStoreError::DatabaseError(s) => OrderQueryError::DatabaseError(s),
        }
    }
}

impl From<EffectStoreError> for OrderQueryError {
    fn from(e: EffectStoreError) -> Self {
        OrderQueryError::DatabaseError(e.to_string())
    }
}
