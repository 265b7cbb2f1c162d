use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Status is not eligible for the requested change")]
    InvalidTransition,

    #[error("Order is already claimed by another rider")]
    AlreadyAssigned,

    #[error("Acting rider is not assigned to this order")]
    NotAssignedRider,

    #[error("Actor is not eligible to perform this operation")]
    NotEligible,

    #[error("Incorrect delivery code")]
    InvalidOtp,

    #[error("Order is not out for delivery")]
    NotInDeliverableState,

    #[error("Payment signature verification failed")]
    InvalidSignature,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-stable kind, part of the response contract. Clients branch on
    /// this, never on the human message.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MalformedPayload => "malformed_payload",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidTransition => "invalid_transition",
            AppError::AlreadyAssigned => "already_assigned",
            AppError::NotAssignedRider => "not_assigned_rider",
            AppError::NotEligible => "not_eligible",
            AppError::InvalidOtp => "invalid_otp",
            AppError::NotInDeliverableState => "not_in_deliverable_state",
            AppError::InvalidSignature => "invalid_signature",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition
            | AppError::AlreadyAssigned
            | AppError::NotInDeliverableState => StatusCode::CONFLICT,
            AppError::NotAssignedRider | AppError::NotEligible | AppError::InvalidSignature => {
                StatusCode::FORBIDDEN
            }
            AppError::InvalidOtp => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
