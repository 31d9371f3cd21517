pub mod booking;
pub mod payment;
pub mod gateway;
pub mod repository;
pub mod identity;
pub mod lock;
pub mod money;
pub mod notify;

pub use booking::{Booking, BookingPaymentStatus, BookingStatus, CustomerInfo, NewBooking, Pairing};
pub use payment::{Payment, PaymentStatus};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Conflict: {0}")]
    ConflictError(String),
    #[error("Payment gateway error: {0}")]
    GatewayError(String),
    #[error("Lock error: {0}")]
    LockError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// A status string that is not one of the enumerated values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}
