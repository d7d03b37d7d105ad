use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use data_payment_engine::traits::{LedgerError, OrderQueryError};
use gateway_tools::GatewayApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Unknown payment provider: {0}")]
    UnknownProvider(String),
    #[error("Access denied. {0}")]
    Forbidden(String),
    #[error("The order is not in a state that allows this. {0}")]
    OrderStateConflict(String),
    #[error("The callback could not be authenticated.")]
    CallbackNotAuthentic,
    #[error("The callback could not be stored. Please deliver it again. {0}")]
    RedeliveryRequired(String),
    #[error("{0}")]
    Gateway(#[from] GatewayError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::UnknownProvider(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::OrderStateConflict(_) => StatusCode::CONFLICT,
            Self::CallbackNotAuthentic => StatusCode::UNAUTHORIZED,
            Self::RedeliveryRequired(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Gateway(e) => match e {
                GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
                GatewayError::Parse(_) => StatusCode::BAD_REQUEST,
                GatewayError::Rejected(_) => StatusCode::BAD_REQUEST,
                GatewayError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
                GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<LedgerError> for ServerError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidUpdate(s) => Self::InvalidRequestBody(s),
            LedgerError::OrderNotFound(id) => Self::NoRecordFound(format!("Order {id} does not exist")),
            LedgerError::OrderIdInUse(_) | LedgerError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<OrderQueryError> for ServerError {
    fn from(e: OrderQueryError) -> Self {
        match e {
            OrderQueryError::QueryError(s) => Self::InvalidRequestBody(s),
            OrderQueryError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

/// Errors raised by a gateway adapter, or while talking to the provider behind it.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The caller supplied bad input. Nothing was sent and nothing was stored.
    #[error("Invalid checkout request. {0}")]
    Validation(String),
    /// The provider sent something we could not understand.
    #[error("Could not parse the provider message. {0}")]
    Parse(String),
    /// The provider understood the request and declined it.
    #[error("The payment provider rejected the request. {0}")]
    Rejected(String),
    #[error("The payment provider is not configured. {0}")]
    NotConfigured(String),
    #[error("The payment provider could not be reached. {0}")]
    Upstream(String),
    /// The outcome of the request is unknown. It is safe to retry.
    #[error("The payment provider did not answer within {0} seconds")]
    Timeout(u64),
}

impl From<GatewayApiError> for GatewayError {
    fn from(e: GatewayApiError) -> Self {
        match e {
            GatewayApiError::Timeout(secs) => Self::Timeout(secs),
            GatewayApiError::NotConfigured(s) => Self::NotConfigured(s),
            GatewayApiError::InvalidResponse(s) => Self::Parse(s),
            GatewayApiError::InvalidRequest(s) => Self::Validation(s),
            GatewayApiError::QueryError { status, message } => {
                Self::Upstream(format!("Provider answered with status {status}. {message}"))
            },
            GatewayApiError::Initialization(s) | GatewayApiError::Transport(s) => Self::Upstream(s),
        }
    }
}
