use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ethereum::{error::GatewayError, utils};

/// Error returned by request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest {
        message: String,
        details: Option<String>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, details: impl ToString) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: Some(details.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Gateway(e) => gateway_status(e),
        }
    }
}

fn gateway_status(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
        GatewayError::ContractNotConfigured(_) | GatewayError::SigningKeyRequired => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        GatewayError::TransactionReverted { .. } => StatusCode::CONFLICT,
        GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::ConfirmationFailed { source, .. } => gateway_status(source),
        GatewayError::Connection(_)
        | GatewayError::RemoteExecution(_)
        | GatewayError::Signing(_)
        | GatewayError::InsufficientFunds(_)
        | GatewayError::NonceConflict(_) => StatusCode::BAD_GATEWAY,
        GatewayError::UnknownMethod { .. }
        | GatewayError::UnexpectedOutput { .. }
        | GatewayError::MalformedLog(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::BadRequest {
                message,
                details: Some(details),
            } => json!({ "error": message, "details": details }),
            Self::Gateway(GatewayError::TransactionReverted {
                tx_hash,
                block_number,
            }) => json!({
                "error": self.to_string(),
                "txHash": utils::format_hash(tx_hash),
                "blockNumber": block_number,
            }),
            Self::Gateway(GatewayError::ConfirmationFailed { tx_hash, .. }) => json!({
                "error": self.to_string(),
                "txHash": utils::format_hash(tx_hash),
            }),
            _ => json!({ "error": self.to_string() }),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "Request rejected: {}", self);
        }

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
