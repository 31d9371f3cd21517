use crate::error::BookingError;
use std::sync::Arc;
use tourbook_core::identity::Actor;
use tourbook_core::repository::{BookingRepository, Page, PageRequest, PaymentRepository};
use tourbook_core::{CustomerInfo, Payment, PaymentStatus};
use tracing::info;
use uuid::Uuid;

/// Payment records: opening attempts, status overrides and lookups.
/// Booking state is never touched here; callers hand results to the
/// reconciler.
#[derive(Clone)]
pub struct PaymentStore {
    pub(crate) payments: Arc<dyn PaymentRepository>,
    bookings: Arc<dyn BookingRepository>,
    currency: String,
}

impl PaymentStore {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        bookings: Arc<dyn BookingRepository>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            payments,
            bookings,
            currency: currency.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Open a `pending` attempt for a booking. Fails with `Conflict` while
    /// another attempt for the same booking is still pending.
    pub async fn open(
        &self,
        booking_id: Uuid,
        amount: i64,
        intent_id: &str,
        customer: CustomerInfo,
    ) -> Result<Payment, BookingError> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| BookingError::booking_not_found(booking_id))?;

        if amount != booking.total_amount {
            return Err(BookingError::InvalidState(format!(
                "Payment amount {} does not match booking total {}",
                amount, booking.total_amount
            )));
        }

        let existing = self.payments.list_by_booking(booking_id).await?;
        if existing.iter().any(|p| p.status.is_active()) {
            return Err(BookingError::Conflict(format!(
                "booking {} already has a pending payment",
                booking_id
            )));
        }

        let payment = Payment::open(
            booking_id,
            amount,
            &self.currency,
            Some(intent_id.to_string()),
            customer,
        );
        self.payments.insert(&payment).await?;

        info!(payment_id = %payment.id, booking_id = %booking_id, "Opened payment for intent {}", intent_id);
        Ok(payment)
    }

    /// Administrative override of a payment's status. The string must be one
    /// of the five payment statuses.
    pub async fn record_status(&self, payment_id: Uuid, status: &str) -> Result<Payment, BookingError> {
        let status: PaymentStatus = status
            .parse()
            .map_err(|_| BookingError::InvalidStatus(status.to_string()))?;

        self.payments
            .update_status(payment_id, status)
            .await?
            .ok_or_else(|| BookingError::payment_not_found(payment_id))
    }

    pub async fn get(&self, payment_id: Uuid) -> Result<Payment, BookingError> {
        self.payments
            .get(payment_id)
            .await?
            .ok_or_else(|| BookingError::payment_not_found(payment_id))
    }

    /// Owners see payments of their own bookings; admins see all.
    pub async fn get_for_actor(&self, payment_id: Uuid, actor: &Actor) -> Result<Payment, BookingError> {
        let payment = self.get(payment_id).await?;
        if actor.is_admin() {
            return Ok(payment);
        }

        let owner = self.bookings.get(payment.booking_id).await?.map(|b| b.user_id);
        match owner {
            Some(owner) if actor.can_access(&owner) => Ok(payment),
            _ => Err(BookingError::Unauthorized(
                "Not authorized to view this payment".to_string(),
            )),
        }
    }

    /// Every payment attached to one of the user's bookings, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Payment>, BookingError> {
        let booking_ids: Vec<Uuid> = self
            .bookings
            .list_by_user(user_id)
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect();
        if booking_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.payments.list_by_bookings(&booking_ids).await?)
    }

    pub async fn list_by_booking(&self, booking_id: Uuid) -> Result<Vec<Payment>, BookingError> {
        Ok(self.payments.list_by_booking(booking_id).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<Payment>, BookingError> {
        Ok(self.payments.list_all().await?)
    }

    pub async fn list_page(&self, page: PageRequest) -> Result<Page<Payment>, BookingError> {
        Ok(self.payments.list_page(page).await?)
    }

    pub async fn find_by_charge(&self, charge_id: &str) -> Result<Option<Payment>, BookingError> {
        Ok(self.payments.find_by_charge(charge_id).await?)
    }
}
