//! Application error type
//!
//! Every layer returns [`AppError`], a kind plus optional context. The kind decides
//! the HTTP status the API layer answers with.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;
use thiserror::Error;
use tracing::error;

pub type AppResult<T> = Result<T, AppError>;

/// Failures talking to an external provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalError {
    /// Credential exchange failed (rejected keys, unreachable token endpoint)
    #[error("{provider} authentication failed: {message}")]
    GatewayAuth { provider: String, message: String },

    /// Provider answered but refused the request; `message` is customer-facing
    #[error("{message}")]
    GatewayRejected { provider: String, message: String },

    /// Network error, timeout or provider-side 5xx
    #[error("{provider} request failed: {message}")]
    GatewayTransient { provider: String, message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InfrastructureError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppErrorKind {
    #[error("{message}")]
    Validation { message: String },

    #[error("{entity} not found")]
    NotFound { entity: String, id: String },

    #[error("{message}")]
    Forbidden { message: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error(transparent)]
    External(ExternalError),

    #[error("Database error: {message}")]
    Database { message: String, is_retryable: bool },

    #[error(transparent)]
    Infrastructure(InfrastructureError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation {
            message: message.into(),
        })
    }

    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::new(AppErrorKind::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        })
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Forbidden {
            message: message.into(),
        })
    }

    pub fn unauthorized() -> Self {
        Self::new(AppErrorKind::Unauthorized)
    }

    pub fn external(error: ExternalError) -> Self {
        Self::new(AppErrorKind::External(error))
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: message.into(),
            },
        ))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.kind, AppErrorKind::Validation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, AppErrorKind::NotFound { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            AppErrorKind::Validation { .. } => StatusCode::BAD_REQUEST,
            AppErrorKind::NotFound { .. } => StatusCode::NOT_FOUND,
            AppErrorKind::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            AppErrorKind::External(ExternalError::GatewayRejected { .. }) => {
                StatusCode::BAD_REQUEST
            }
            AppErrorKind::External(_) => StatusCode::BAD_GATEWAY,
            AppErrorKind::Database { .. } | AppErrorKind::Infrastructure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to return to API clients
    pub fn public_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Database { .. } | AppErrorKind::Infrastructure(_) => {
                "Internal server error".to_string()
            }
            AppErrorKind::External(ExternalError::GatewayAuth { .. }) => {
                "Failed to initiate payment".to_string()
            }
            AppErrorKind::External(ExternalError::GatewayTransient { .. }) => {
                "Payment provider unavailable".to_string()
            }
            kind => kind.to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.kind, context),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AppError {}

impl From<ExternalError> for AppError {
    fn from(error: ExternalError) -> Self {
        Self::external(error)
    }
}

#[cfg(feature = "database")]
impl From<crate::database::error::DatabaseError> for AppError {
    fn from(error: crate::database::error::DatabaseError) -> Self {
        Self::new(AppErrorKind::Database {
            is_retryable: error.is_retryable(),
            message: error.to_string(),
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "success": false,
            "message": self.public_message(),
            "data": null,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_per_kind() {
        assert_eq!(
            AppError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::not_found("Payment", "ws_CO_1").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::forbidden("not yours").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::unauthorized().status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::external(ExternalError::GatewayTransient {
                provider: "M-Pesa".to_string(),
                message: "timeout".to_string(),
            })
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_rejection_surfaces_provider_message() {
        let err = AppError::external(ExternalError::GatewayRejected {
            provider: "M-Pesa".to_string(),
            message: "Invalid PhoneNumber".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Invalid PhoneNumber");
    }

    #[test]
    fn test_transient_gateway_details_are_hidden() {
        let err = AppError::external(ExternalError::GatewayTransient {
            provider: "M-Pesa".to_string(),
            message: "Invalid response format: missing field `MerchantRequestID`".to_string(),
        });
        assert_eq!(err.public_message(), "Payment provider unavailable");
        assert!(err.to_string().contains("MerchantRequestID"));
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::new(AppErrorKind::Database {
            message: "relation \"payments\" does not exist".to_string(),
            is_retryable: false,
        });
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_context_in_display() {
        let err = AppError::validation("Invalid Kenyan phone number").with_context("initiate");
        assert_eq!(err.to_string(), "Invalid Kenyan phone number (initiate)");
    }
}
