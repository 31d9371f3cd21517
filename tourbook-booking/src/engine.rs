use crate::bookings::BookingStore;
use crate::notifications::NotificationDispatcher;
use crate::orchestrator::CheckoutOrchestrator;
use crate::payments::PaymentStore;
use crate::reconciler::BookingPaymentReconciler;
use std::sync::Arc;
use tourbook_catalog::PackageCatalog;
use tourbook_core::gateway::PaymentGateway;
use tourbook_core::lock::ReconcileLock;
use tourbook_core::repository::{BookingRepository, PaymentRepository};

/// Adapters the booking engine is assembled from
pub struct EngineParts {
    pub bookings: Arc<dyn BookingRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub catalog: Arc<dyn PackageCatalog>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub lock: Arc<dyn ReconcileLock>,
    pub notifier: NotificationDispatcher,
    pub currency: String,
}

/// The wired set of booking services, shared by the HTTP layer and the
/// resync job.
#[derive(Clone)]
pub struct BookingEngine {
    pub bookings: BookingStore,
    pub payments: PaymentStore,
    pub reconciler: Arc<BookingPaymentReconciler>,
    pub checkout: Arc<CheckoutOrchestrator>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl BookingEngine {
    pub fn new(parts: EngineParts) -> Self {
        let payments = PaymentStore::new(parts.payments.clone(), parts.bookings.clone(), parts.currency);
        let reconciler = Arc::new(BookingPaymentReconciler::new(
            parts.bookings.clone(),
            payments.clone(),
            parts.gateway.clone(),
            parts.lock,
            parts.notifier.clone(),
        ));
        let bookings = BookingStore::new(
            parts.bookings,
            parts.payments,
            parts.catalog,
            reconciler.clone(),
            parts.notifier,
        );
        let checkout = Arc::new(CheckoutOrchestrator::new(
            bookings.clone(),
            payments.clone(),
            reconciler.clone(),
            parts.gateway.clone(),
        ));

        Self {
            bookings,
            payments,
            reconciler,
            checkout,
            gateway: parts.gateway,
        }
    }
}
