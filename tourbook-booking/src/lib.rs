pub mod error;
pub mod bookings;
pub mod payments;
pub mod reconciler;
pub mod orchestrator;
pub mod notifications;
pub mod memory;
pub mod engine;

#[cfg(test)]
mod testing;

pub use error::BookingError;
pub use bookings::BookingStore;
pub use payments::PaymentStore;
pub use reconciler::{BookingPaymentReconciler, Confirmation, ReconcileOutcome, ResyncReport};
pub use memory::{InMemoryBookingRepository, InMemoryPaymentRepository};
pub use orchestrator::{CheckoutOrchestrator, CheckoutSession};
pub use notifications::NotificationDispatcher;
pub use engine::{BookingEngine, EngineParts};
