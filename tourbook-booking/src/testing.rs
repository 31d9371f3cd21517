use crate::engine::{BookingEngine, EngineParts};
use crate::memory::{InMemoryBookingRepository, InMemoryPaymentRepository};
use crate::notifications::NotificationDispatcher;
use crate::orchestrator::CheckoutSession;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tourbook_catalog::{InMemoryCatalog, Package};
use tourbook_core::gateway::{CreateIntent, MockPaymentGateway, PaymentGateway};
use tourbook_core::lock::LocalReconcileLock;
use tourbook_core::notify::BookingNotification;
use tourbook_core::repository::BookingRepository;
use tourbook_core::{Booking, CustomerInfo, NewBooking};
use uuid::Uuid;

/// An engine wired to in-memory adapters, with handles on each of them.
pub(crate) struct Harness {
    pub engine: BookingEngine,
    pub gateway: Arc<MockPaymentGateway>,
    pub booking_repo: Arc<InMemoryBookingRepository>,
    pub payment_repo: Arc<InMemoryPaymentRepository>,
    pub package: Package,
    notifications: mpsc::Receiver<BookingNotification>,
}

impl Harness {
    pub async fn new() -> Self {
        let package = Package::new("Swat Valley Escape", "swat.jpg", 15000);
        let catalog = Arc::new(InMemoryCatalog::with_packages([package.clone()]));
        let gateway = Arc::new(MockPaymentGateway::new());
        let booking_repo = Arc::new(InMemoryBookingRepository::new());
        let payment_repo = Arc::new(InMemoryPaymentRepository::new());
        let (notifier, notifications) = NotificationDispatcher::channel(64);

        let engine = BookingEngine::new(EngineParts {
            bookings: booking_repo.clone(),
            payments: payment_repo.clone(),
            catalog,
            gateway: gateway.clone(),
            lock: Arc::new(LocalReconcileLock::new()),
            notifier,
            currency: "PKR".to_string(),
        });

        Self {
            engine,
            gateway,
            booking_repo,
            payment_repo,
            package,
            notifications,
        }
    }

    pub fn request(&self, user_id: &str, travelers: u32) -> NewBooking {
        NewBooking {
            package_id: self.package.id,
            user_id: user_id.to_string(),
            travel_date: Utc::now().date_naive() + Duration::days(14),
            travelers,
            customer: CustomerInfo::new("Ayesha Khan", "ayesha@example.com", "03001234567"),
        }
    }

    pub async fn create_booking(&self, user_id: &str, travelers: u32) -> Booking {
        self.engine.bookings.create(self.request(user_id, travelers)).await.unwrap()
    }

    pub async fn checkout(&self, user_id: &str) -> CheckoutSession {
        self.engine
            .checkout
            .open_payment_intent(self.request(user_id, 2))
            .await
            .unwrap()
    }

    /// Register an intent with the processor without recording a payment.
    pub async fn intent_for(&self, booking: &Booking) -> String {
        self.gateway
            .create_payment_intent(CreateIntent {
                amount_minor: booking.total_amount * 100,
                currency: "pkr".to_string(),
                customer_id: "cus_direct".to_string(),
                metadata: BTreeMap::new(),
            })
            .await
            .unwrap()
            .id
    }

    pub async fn booking(&self, id: Uuid) -> Booking {
        self.booking_repo.get(id).await.unwrap().unwrap()
    }

    pub fn drain_notifications(&mut self) -> Vec<BookingNotification> {
        let mut drained = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            drained.push(notification);
        }
        drained
    }
}
