//! API error responses
//!
//! Billing rejections are never errors here: an item whose debit is refused
//! comes back in the result list with a `credit_exceeded` status and the
//! request still succeeds. Only malformed input and unknown accounts map to
//! error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// One or more identifiers failed validation; the whole request is
    /// refused before any billing happens.
    #[error("invalid request")]
    Validation(Vec<String>),

    #[error("unknown account: {0}")]
    AccountNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ledger::Error> for ApiError {
    fn from(e: ledger::Error) -> Self {
        match e {
            ledger::Error::AccountNotFound(id) => ApiError::AccountNotFound(id),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::AccountNotFound(_) => "account_not_found",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        let mut error = serde_json::json!({
            "type": self.kind(),
            "message": self.to_string(),
            "request_id": request_id,
        });
        if let ApiError::Validation(ref details) = self {
            error["details"] = serde_json::json!(details);
        }

        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "error": error }).to_string(),
        )
            .into_response()
    }
}
