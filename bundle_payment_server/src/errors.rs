use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use bundle_payment_engine::{PipelineError, WalletError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Payload deserialization error")]
    CouldNotDeserializePayload,
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
    #[error("Webhook signature invalid or not provided")]
    InvalidWebhookSignature,
    #[error("Insufficient funds. {0}")]
    InsufficientFunds(String),
    #[error("The request was already processed or claimed by another caller")]
    AlreadyProcessed,
    #[error("The requested orders have already been downloaded")]
    AlreadyDownloaded,
    #[error("The request was rejected. {0}")]
    RequestRejected(String),
    #[error("An upstream service failed. {0}")]
    UpstreamError(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CouldNotDeserializePayload => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::RequestRejected(_) => StatusCode::BAD_REQUEST,
            Self::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
            Self::InsufficientFunds(_) => StatusCode::PAYMENT_REQUIRED,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyProcessed => StatusCode::CONFLICT,
            Self::AlreadyDownloaded => StatusCode::CONFLICT,
            Self::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            // Clients poll the claim endpoints; give them a stable marker to branch on
            Self::AlreadyProcessed => serde_json::json!({ "error": self.to_string(), "alreadyProcessed": true }),
            Self::AlreadyDownloaded => serde_json::json!({ "error": self.to_string(), "alreadyDownloaded": true }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).insert_header(ContentType::json()).body(body.to_string())
    }
}

impl From<PipelineError> for ServerError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::OrderNotFound(_) | PipelineError::ShopNotFound(_) | PipelineError::TrackingNotFound(_) => {
                Self::NoRecordFound(e.to_string())
            },
            PipelineError::AlreadyProcessed(_) => Self::AlreadyProcessed,
            PipelineError::WalletError(we) => we.into(),
            PipelineError::PaymentNotCompleted(_) |
            PipelineError::BlacklistedRecipient(_) |
            PipelineError::IneligibleForDispatch(_, _) |
            PipelineError::OrderAlreadyExists(_) => Self::RequestRejected(e.to_string()),
            PipelineError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<WalletError> for ServerError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::InsufficientFunds { .. } => Self::InsufficientFunds(e.to_string()),
            WalletError::WalletNotFound(_) => Self::NoRecordFound(e.to_string()),
            WalletError::InvalidAmount(_) => Self::RequestRejected(e.to_string()),
            WalletError::DuplicateReference => Self::RequestRejected(e.to_string()),
            WalletError::ConcurrentModification | WalletError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}
