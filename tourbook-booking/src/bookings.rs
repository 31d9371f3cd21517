use crate::error::BookingError;
use crate::notifications::NotificationDispatcher;
use crate::reconciler::{pairing_for_override, BookingPaymentReconciler};
use chrono::Utc;
use std::sync::Arc;
use tourbook_catalog::{Package, PackageCatalog};
use tourbook_core::identity::Actor;
use tourbook_core::notify::NotificationKind;
use tourbook_core::repository::{BookingRepository, Page, PageRequest, PaymentRepository};
use tourbook_core::{Booking, BookingPaymentStatus, BookingStatus, NewBooking, Pairing, PaymentStatus};
use tracing::{info, instrument};
use uuid::Uuid;

/// Processor references stamped on a booking opened through checkout
#[derive(Debug, Clone)]
pub struct ProcessorRefs {
    pub customer_id: String,
    pub intent_id: String,
}

/// Booking lifecycle: creation, visibility, cancellation and admin overrides
#[derive(Clone)]
pub struct BookingStore {
    bookings: Arc<dyn BookingRepository>,
    payments: Arc<dyn PaymentRepository>,
    catalog: Arc<dyn PackageCatalog>,
    reconciler: Arc<BookingPaymentReconciler>,
    notifier: NotificationDispatcher,
}

impl BookingStore {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        payments: Arc<dyn PaymentRepository>,
        catalog: Arc<dyn PackageCatalog>,
        reconciler: Arc<BookingPaymentReconciler>,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            bookings,
            payments,
            catalog,
            reconciler,
            notifier,
        }
    }

    /// Validate a request and price it against the current package.
    pub async fn quote(&self, request: &NewBooking) -> Result<(Package, i64), BookingError> {
        if request.travelers == 0 {
            return Err(BookingError::InvalidState("At least one traveler is required".to_string()));
        }

        let package = self
            .catalog
            .find_by_id(request.package_id)
            .await?
            .ok_or_else(|| BookingError::NotFound("Package", request.package_id.to_string()))?;

        let total = package
            .quote(request.travelers)
            .ok_or_else(|| BookingError::InvalidState("Booking total is out of range".to_string()))?;

        Ok((package, total))
    }

    /// Open a `(pending, unpaid)` booking with its total fixed from the
    /// package price.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create(&self, request: NewBooking) -> Result<Booking, BookingError> {
        let booking = self.open(request, None).await?;
        self.notifier.dispatch(NotificationKind::BookingReceived, &booking);
        Ok(booking)
    }

    pub(crate) async fn open(
        &self,
        request: NewBooking,
        processor: Option<ProcessorRefs>,
    ) -> Result<Booking, BookingError> {
        let (package, total) = self.quote(&request).await?;
        let mut booking = Booking::open(request, &package, total);
        if let Some(refs) = processor {
            booking.processor_customer_id = Some(refs.customer_id);
            booking.processor_intent_id = Some(refs.intent_id);
        }

        self.bookings.insert(&booking).await?;
        info!(booking_id = %booking.id, total = booking.total_amount, "Booking created");
        Ok(booking)
    }

    pub async fn get(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.bookings
            .get(id)
            .await?
            .ok_or_else(|| BookingError::booking_not_found(id))
    }

    pub async fn get_for_actor(&self, id: Uuid, actor: &Actor) -> Result<Booking, BookingError> {
        let booking = self.get(id).await?;
        if !actor.can_access(&booking.user_id) {
            return Err(BookingError::Unauthorized(
                "Not authorized to view this booking".to_string(),
            ));
        }
        Ok(booking)
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, BookingError> {
        Ok(self.bookings.list_by_user(user_id).await?)
    }

    pub async fn list_page(&self, page: PageRequest) -> Result<Page<Booking>, BookingError> {
        Ok(self.bookings.list_page(page).await?)
    }

    /// Owner or admin cancellation of an upcoming booking.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn cancel(&self, id: Uuid, actor: &Actor) -> Result<Booking, BookingError> {
        let booking = self.get(id).await?;
        if !actor.can_access(&booking.user_id) {
            return Err(BookingError::Unauthorized(
                "Not authorized to cancel this booking".to_string(),
            ));
        }
        if booking.is_past(Utc::now().date_naive()) {
            return Err(BookingError::InvalidState(
                "Cannot cancel a booking for a past travel date".to_string(),
            ));
        }
        self.apply_cancellation(booking).await
    }

    /// Administrative booking status change. `cancelled` follows the normal
    /// cancellation path; the other statuses keep the payment side as is.
    #[instrument(skip(self))]
    pub async fn set_status(&self, id: Uuid, status: BookingStatus) -> Result<Booking, BookingError> {
        let booking = self.get(id).await?;
        if booking.status == status {
            return Ok(booking);
        }

        if status == BookingStatus::Cancelled {
            return self.apply_cancellation(booking).await;
        }

        let target = pairing_for_override(booking.pairing(), status)?;
        let updated = match self.bookings.apply_pairing(id, target).await? {
            Some(updated) => updated,
            None => self.get(id).await?,
        };
        info!(booking_id = %id, "Booking status set to {}", updated.status);
        self.notifier.dispatch(NotificationKind::BookingStatusUpdate, &updated);
        Ok(updated)
    }

    /// Cancel the booking and flag any live or settled payment for refund
    /// review. Payments are never deleted.
    async fn apply_cancellation(&self, booking: Booking) -> Result<Booking, BookingError> {
        if !matches!(booking.status, BookingStatus::Pending | BookingStatus::Confirmed) {
            return Err(BookingError::InvalidState(
                "Cannot cancel booking that is not in pending or confirmed status".to_string(),
            ));
        }

        let flagged: Vec<_> = self
            .payments
            .list_by_booking(booking.id)
            .await?
            .into_iter()
            .filter(|p| matches!(p.status, PaymentStatus::Pending | PaymentStatus::Succeeded))
            .collect();

        let payment_status = if !flagged.is_empty() || booking.payment_status == BookingPaymentStatus::Paid {
            BookingPaymentStatus::RefundPending
        } else {
            booking.payment_status
        };
        let target = Pairing::new(BookingStatus::Cancelled, payment_status);

        let mut cancelled = match self.bookings.apply_pairing(booking.id, target).await? {
            Some(updated) => updated,
            None => self.get(booking.id).await?,
        };

        for payment in flagged {
            if let Some(updated) = self
                .payments
                .update_status(payment.id, PaymentStatus::CancellationPending)
                .await?
            {
                cancelled = self.reconciler.reconcile(&updated).await?.into_booking();
            }
        }

        info!(booking_id = %cancelled.id, "Booking cancelled at {}", cancelled.pairing());
        self.notifier.dispatch(NotificationKind::BookingCancellation, &cancelled);
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::Harness;
    use crate::BookingError;
    use chrono::{Duration, Utc};
    use tourbook_core::gateway::IntentStatus;
    use tourbook_core::identity::Actor;
    use tourbook_core::notify::NotificationKind;
    use tourbook_core::repository::{BookingRepository, PageRequest};
    use tourbook_core::{BookingPaymentStatus as P, BookingStatus as S, Pairing, PaymentStatus};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_create_prices_from_package() {
        let mut h = Harness::new().await;
        let booking = h.create_booking("user-1", 3).await;

        assert_eq!(booking.total_amount, h.package.price * 3);
        assert_eq!(booking.package_name, h.package.title);
        assert_eq!(booking.pairing(), Pairing::new(S::Pending, P::Unpaid));

        let kinds: Vec<_> = h.drain_notifications().into_iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::BookingReceived]);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_requests() {
        let h = Harness::new().await;

        let err = h.engine.bookings.create(h.request("user-1", 0)).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidState(_)));

        let mut request = h.request("user-1", 1);
        request.package_id = Uuid::new_v4();
        let err = h.engine.bookings.create(request).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound("Package", _)));
    }

    #[tokio::test]
    async fn test_visibility_and_listing() {
        let h = Harness::new().await;
        let mine = h.create_booking("owner", 1).await;
        h.create_booking("owner", 2).await;
        h.create_booking("someone-else", 1).await;

        assert!(h.engine.bookings.get_for_actor(mine.id, &Actor::user("owner")).await.is_ok());
        let err = h
            .engine
            .bookings
            .get_for_actor(mine.id, &Actor::user("intruder"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Unauthorized(_)));

        let listed = h.engine.bookings.list_for_user("owner").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].id, mine.id);

        let page = h.engine.bookings.list_page(PageRequest::new(Some(1), Some(2))).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.data.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_paid_booking_flags_refund() {
        let mut h = Harness::new().await;
        let session = h.checkout("user-1").await;
        h.gateway.set_intent_status(&session.intent_id, IntentStatus::Succeeded);
        h.engine
            .reconciler
            .confirm_payment(&session.intent_id, session.booking.id)
            .await
            .unwrap();
        h.drain_notifications();

        let cancelled = h
            .engine
            .bookings
            .cancel(session.booking.id, &Actor::user("user-1"))
            .await
            .unwrap();

        assert_eq!(cancelled.pairing(), Pairing::new(S::Cancelled, P::RefundPending));
        assert!(cancelled.cancellation_message().contains("refund"));
        let payment = h.engine.payments.get(session.payment.id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::CancellationPending);

        let kinds: Vec<_> = h.drain_notifications().into_iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::BookingCancellation]);
    }

    #[tokio::test]
    async fn test_cancel_with_pending_payment() {
        let h = Harness::new().await;
        let session = h.checkout("user-1").await;

        let cancelled = h
            .engine
            .bookings
            .cancel(session.booking.id, &Actor::user("user-1"))
            .await
            .unwrap();
        assert_eq!(cancelled.pairing(), Pairing::new(S::Cancelled, P::RefundPending));

        // A later resync must not reopen it
        let report = h.engine.reconciler.resync_all().await.unwrap();
        assert_eq!(report.corrected, 0);
        assert_eq!(h.booking(session.booking.id).await.status, S::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_unpaid_booking() {
        let h = Harness::new().await;
        let booking = h.create_booking("user-1", 1).await;

        let cancelled = h.engine.bookings.cancel(booking.id, &Actor::admin("ops")).await.unwrap();
        assert_eq!(cancelled.pairing(), Pairing::new(S::Cancelled, P::Unpaid));
        assert_eq!(cancelled.cancellation_message(), "Your booking has been cancelled successfully.");

        let err = h.engine.bookings.cancel(booking.id, &Actor::admin("ops")).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_cancel_guards() {
        let h = Harness::new().await;
        let booking = h.create_booking("user-1", 1).await;

        let err = h.engine.bookings.cancel(booking.id, &Actor::user("user-2")).await.unwrap_err();
        assert!(matches!(err, BookingError::Unauthorized(_)));

        let mut past = h.booking(booking.id).await;
        past.travel_date = Utc::now().date_naive() - Duration::days(1);
        h.booking_repo.put(past).await;
        let err = h.engine.bookings.cancel(booking.id, &Actor::user("user-1")).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidState(_)));
        assert_eq!(h.booking(booking.id).await.status, S::Pending);
    }

    #[tokio::test]
    async fn test_set_status_override() {
        let h = Harness::new().await;
        let booking = h.create_booking("user-1", 1).await;

        let err = h.engine.bookings.set_status(booking.id, S::Confirmed).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidState(_)));

        let cancelled = h.engine.bookings.set_status(booking.id, S::Cancelled).await.unwrap();
        assert_eq!(cancelled.pairing(), Pairing::new(S::Cancelled, P::Unpaid));

        let same = h.engine.bookings.set_status(booking.id, S::Cancelled).await.unwrap();
        assert_eq!(same.pairing(), cancelled.pairing());

        let reopened = h.engine.bookings.set_status(booking.id, S::Pending).await.unwrap();
        assert_eq!(reopened.pairing(), Pairing::new(S::Pending, P::Unpaid));
    }

    #[tokio::test]
    async fn test_set_status_on_past_booking_is_allowed_for_cancel() {
        let h = Harness::new().await;
        let booking = h.create_booking("user-1", 1).await;
        h.booking_repo
            .apply_pairing(booking.id, Pairing::new(S::Confirmed, P::Paid))
            .await
            .unwrap();
        let mut past = h.booking(booking.id).await;
        past.travel_date = Utc::now().date_naive() - Duration::days(3);
        h.booking_repo.put(past).await;

        let cancelled = h.engine.bookings.set_status(booking.id, S::Cancelled).await.unwrap();
        assert_eq!(cancelled.pairing(), Pairing::new(S::Cancelled, P::RefundPending));
    }
}
