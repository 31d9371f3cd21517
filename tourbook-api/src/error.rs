use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tourbook_booking::BookingError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    PaymentRequiredError(String),
    GatewayError(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::PaymentRequiredError(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            AppError::GatewayError(msg) => {
                tracing::error!("Upstream processor error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::NotFound(..) => AppError::NotFoundError(message),
            BookingError::Unauthorized(_) => AppError::AuthorizationError(message),
            BookingError::InvalidState(_) | BookingError::InvalidStatus(_) => AppError::ValidationError(message),
            BookingError::Conflict(_) => AppError::ConflictError(message),
            BookingError::PaymentNotSucceeded(_) => AppError::PaymentRequiredError(message),
            BookingError::GatewayError(_) => AppError::GatewayError(message),
            BookingError::OrphanPayment { .. } | BookingError::Storage(_) => AppError::InternalServerError(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn status_of(err: BookingError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_booking_error_mapping() {
        assert_eq!(status_of(BookingError::booking_not_found(Uuid::new_v4())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(BookingError::Unauthorized("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_of(BookingError::InvalidStatus("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(BookingError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(BookingError::PaymentNotSucceeded("processing".into())),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(status_of(BookingError::GatewayError("timeout".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_of(BookingError::Storage("down".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
