use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GatewayApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("The gateway did not answer within {0} seconds")]
    Timeout(u64),
    #[error("Could not reach the gateway: {0}")]
    Transport(String),
    #[error("Gateway request failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("The gateway response could not be understood: {0}")]
    InvalidResponse(String),
    #[error("The request could not be built: {0}")]
    InvalidRequest(String),
    #[error("The gateway is not configured: {0}")]
    NotConfigured(String),
}

impl GatewayApiError {
    /// Errors that say nothing about the outcome of the request and may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}
