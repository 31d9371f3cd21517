use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tourbook_core::repository::{BookingRepository, Page, PageRequest, PaymentRepository};
use tourbook_core::{Booking, CoreError, CoreResult, Pairing, Payment, PaymentStatus};
use uuid::Uuid;

/// Bookings held in insertion order. Used by tests and local runs.
#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<Vec<Booking>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored booking as-is, bypassing pairing checks.
    pub async fn put(&self, booking: Booking) {
        let mut bookings = self.bookings.write().await;
        match bookings.iter_mut().find(|b| b.id == booking.id) {
            Some(existing) => *existing = booking,
            None => bookings.push(booking),
        }
    }

    pub async fn remove(&self, id: Uuid) -> Option<Booking> {
        let mut bookings = self.bookings.write().await;
        let index = bookings.iter().position(|b| b.id == id)?;
        Some(bookings.remove(index))
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert(&self, booking: &Booking) -> CoreResult<()> {
        let mut bookings = self.bookings.write().await;
        if bookings.iter().any(|b| b.id == booking.id) {
            return Err(CoreError::ConflictError(format!("booking {} already exists", booking.id)));
        }
        bookings.push(booking.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(self.bookings.read().await.iter().find(|b| b.id == id).cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> CoreResult<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        Ok(bookings.iter().rev().filter(|b| b.user_id == user_id).cloned().collect())
    }

    async fn list_page(&self, page: PageRequest) -> CoreResult<Page<Booking>> {
        let bookings = self.bookings.read().await;
        let data = bookings
            .iter()
            .rev()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok(Page::new(data, bookings.len() as u64, page))
    }

    async fn apply_pairing(&self, id: Uuid, target: Pairing) -> CoreResult<Option<Booking>> {
        let mut bookings = self.bookings.write().await;
        match bookings.iter_mut().find(|b| b.id == id) {
            Some(booking) if booking.pairing() != target => {
                booking.set_pairing(target);
                Ok(Some(booking.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_settlement(
        &self,
        id: Uuid,
        charge_id: Option<&str>,
        transaction_id: &str,
    ) -> CoreResult<Option<Booking>> {
        let mut bookings = self.bookings.write().await;
        let Some(booking) = bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(None);
        };
        if let Some(charge_id) = charge_id {
            booking.processor_charge_id = Some(charge_id.to_string());
        }
        booking.transaction_id = Some(transaction_id.to_string());
        booking.updated_at = Utc::now();
        Ok(Some(booking.clone()))
    }
}

/// Payments held in insertion order, enforcing one pending attempt per booking.
#[derive(Default)]
pub struct InMemoryPaymentRepository {
    payments: RwLock<Vec<Payment>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payment without the pending-uniqueness check, as legacy data would.
    pub async fn put(&self, payment: Payment) {
        let mut payments = self.payments.write().await;
        match payments.iter_mut().find(|p| p.id == payment.id) {
            Some(existing) => *existing = payment,
            None => payments.push(payment),
        }
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, payment: &Payment) -> CoreResult<()> {
        let mut payments = self.payments.write().await;
        if payment.status.is_active()
            && payments
                .iter()
                .any(|p| p.booking_id == payment.booking_id && p.status.is_active())
        {
            return Err(CoreError::ConflictError(format!(
                "booking {} already has a pending payment",
                payment.booking_id
            )));
        }
        if let Some(intent_id) = &payment.processor_intent_id {
            if payments.iter().any(|p| p.processor_intent_id.as_ref() == Some(intent_id)) {
                return Err(CoreError::ConflictError(format!(
                    "payment for intent {} already exists",
                    intent_id
                )));
            }
        }
        payments.push(payment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Payment>> {
        Ok(self.payments.read().await.iter().find(|p| p.id == id).cloned())
    }

    async fn find_by_intent(&self, booking_id: Uuid, intent_id: &str) -> CoreResult<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments
            .iter()
            .find(|p| p.booking_id == booking_id && p.processor_intent_id.as_deref() == Some(intent_id))
            .cloned())
    }

    async fn find_by_charge(&self, charge_id: &str) -> CoreResult<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments
            .iter()
            .find(|p| p.processor_charge_id.as_deref() == Some(charge_id))
            .cloned())
    }

    async fn list_by_booking(&self, booking_id: Uuid) -> CoreResult<Vec<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.iter().rev().filter(|p| p.booking_id == booking_id).cloned().collect())
    }

    async fn list_by_bookings(&self, booking_ids: &[Uuid]) -> CoreResult<Vec<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments
            .iter()
            .rev()
            .filter(|p| booking_ids.contains(&p.booking_id))
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> CoreResult<Vec<Payment>> {
        Ok(self.payments.read().await.clone())
    }

    async fn list_page(&self, page: PageRequest) -> CoreResult<Page<Payment>> {
        let payments = self.payments.read().await;
        let data = payments
            .iter()
            .rev()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok(Page::new(data, payments.len() as u64, page))
    }

    async fn update_status(&self, id: Uuid, status: PaymentStatus) -> CoreResult<Option<Payment>> {
        let mut payments = self.payments.write().await;
        if status.is_active() {
            let booking_id = payments.iter().find(|p| p.id == id).map(|p| p.booking_id);
            if let Some(booking_id) = booking_id {
                if payments
                    .iter()
                    .any(|p| p.id != id && p.booking_id == booking_id && p.status.is_active())
                {
                    return Err(CoreError::ConflictError(format!(
                        "booking {} already has a pending payment",
                        booking_id
                    )));
                }
            }
        }
        Ok(payments.iter_mut().find(|p| p.id == id).map(|payment| {
            payment.update_status(status);
            payment.clone()
        }))
    }

    async fn record_settlement(
        &self,
        id: Uuid,
        status: PaymentStatus,
        charge_id: Option<&str>,
        transaction_id: &str,
    ) -> CoreResult<Option<Payment>> {
        let mut payments = self.payments.write().await;
        Ok(payments.iter_mut().find(|p| p.id == id).map(|payment| {
            payment.update_status(status);
            if let Some(charge_id) = charge_id {
                payment.processor_charge_id = Some(charge_id.to_string());
            }
            payment.transaction_id = Some(transaction_id.to_string());
            payment.clone()
        }))
    }
}
