use tourbook_catalog::CatalogError;
use tourbook_core::CoreError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid payment status: {0}. Must be one of: pending, succeeded, failed, refunded, cancellation_pending")]
    InvalidStatus(String),

    #[error("Payment {payment_id} references missing booking {booking_id}")]
    OrphanPayment { payment_id: Uuid, booking_id: Uuid },

    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    #[error("Payment not successful: processor reports {0}")]
    PaymentNotSucceeded(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl BookingError {
    pub fn booking_not_found(id: Uuid) -> Self {
        BookingError::NotFound("Booking", id.to_string())
    }

    pub fn payment_not_found(id: Uuid) -> Self {
        BookingError::NotFound("Payment", id.to_string())
    }
}

impl From<CoreError> for BookingError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => BookingError::InvalidState(msg),
            CoreError::ConflictError(msg) => BookingError::Conflict(msg),
            CoreError::GatewayError(msg) => BookingError::GatewayError(msg),
            CoreError::StorageError(msg) | CoreError::LockError(msg) => BookingError::Storage(msg),
        }
    }
}

impl From<CatalogError> for BookingError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Storage(msg) => BookingError::Storage(msg),
        }
    }
}
