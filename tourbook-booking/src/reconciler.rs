use crate::error::BookingError;
use crate::notifications::NotificationDispatcher;
use crate::payments::PaymentStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tourbook_core::gateway::{IntentStatus, PaymentGateway, PaymentIntent};
use tourbook_core::lock::ReconcileLock;
use tourbook_core::money::to_minor_units;
use tourbook_core::notify::NotificationKind;
use tourbook_core::payment::new_transaction_id;
use tourbook_core::repository::BookingRepository;
use tourbook_core::{Booking, BookingPaymentStatus, BookingStatus, Pairing, Payment, PaymentStatus};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// The pairing a booking must rest in when `status` is the status of its
/// authoritative payment. `current` only matters for
/// `cancellation_pending`, which leaves the booking status where it is.
pub fn pairing_for(status: PaymentStatus, current: Pairing) -> Pairing {
    use BookingPaymentStatus as P;
    use BookingStatus as S;

    match status {
        PaymentStatus::Pending => Pairing::new(S::Pending, P::Pending),
        PaymentStatus::Succeeded => Pairing::new(S::Confirmed, P::Paid),
        PaymentStatus::Failed => Pairing::new(S::Pending, P::Unpaid),
        PaymentStatus::Refunded => Pairing::new(S::Cancelled, P::Refunded),
        PaymentStatus::CancellationPending => Pairing::new(current.status, P::RefundPending),
    }
}

/// Target of an administrative booking status override for the non-cancel
/// statuses. The payment side stays put, so the override is refused when the
/// resulting pair would be invalid (e.g. confirming an unpaid booking).
pub fn pairing_for_override(current: Pairing, requested: BookingStatus) -> Result<Pairing, BookingError> {
    let target = Pairing::new(requested, current.payment_status);
    if target.is_valid() {
        Ok(target)
    } else {
        Err(BookingError::InvalidState(format!(
            "Cannot set booking to {} while payment status is {}",
            requested, current.payment_status
        )))
    }
}

/// An in-flight or failed attempt never reopens a cancelled booking.
fn keeps_cancelled(current: Pairing, status: PaymentStatus) -> bool {
    current.status == BookingStatus::Cancelled
        && matches!(status, PaymentStatus::Pending | PaymentStatus::Failed)
}

#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The booking already rested at the pairing the payment implies.
    Unchanged(Booking),
    Updated { previous: Pairing, booking: Booking },
}

impl ReconcileOutcome {
    pub fn booking(&self) -> &Booking {
        match self {
            ReconcileOutcome::Unchanged(booking) => booking,
            ReconcileOutcome::Updated { booking, .. } => booking,
        }
    }

    pub fn into_booking(self) -> Booking {
        match self {
            ReconcileOutcome::Unchanged(booking) => booking,
            ReconcileOutcome::Updated { booking, .. } => booking,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, ReconcileOutcome::Updated { .. })
    }
}

/// A payment together with its booking after reconciliation
#[derive(Debug, Clone, Serialize)]
pub struct Confirmation {
    pub booking: Booking,
    pub payment: Payment,
}

#[derive(Debug, Clone, Serialize)]
pub struct Correction {
    pub booking_id: Uuid,
    pub payment_id: Uuid,
    pub from: Pairing,
    pub to: Pairing,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResyncFailure {
    pub payment_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResyncReport {
    /// Payment rows read
    pub scanned: usize,
    /// Bookings whose pairing was rewritten
    pub corrected: usize,
    pub unchanged: usize,
    /// Older attempts outranked by another payment on the same booking
    pub superseded: usize,
    pub orphaned: Vec<Uuid>,
    pub failures: Vec<ResyncFailure>,
    pub corrections: Vec<Correction>,
}

impl ResyncReport {
    pub fn is_clean(&self) -> bool {
        self.corrected == 0 && self.orphaned.is_empty() && self.failures.is_empty()
    }
}

/// Keeps every booking's (status, payment status) pair in line with its
/// payment records. All pairing writes outside the cancellation path go
/// through [`BookingPaymentReconciler::reconcile`].
pub struct BookingPaymentReconciler {
    bookings: Arc<dyn BookingRepository>,
    payments: PaymentStore,
    gateway: Arc<dyn PaymentGateway>,
    lock: Arc<dyn ReconcileLock>,
    notifier: NotificationDispatcher,
}

impl BookingPaymentReconciler {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        payments: PaymentStore,
        gateway: Arc<dyn PaymentGateway>,
        lock: Arc<dyn ReconcileLock>,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            bookings,
            payments,
            gateway,
            lock,
            notifier,
        }
    }

    /// Bring the payment's booking to the pairing its status implies.
    /// Idempotent; concurrent calls for one payment are serialized.
    pub async fn reconcile(&self, payment: &Payment) -> Result<ReconcileOutcome, BookingError> {
        let token = self.lock.acquire(&format!("payment:{}", payment.id)).await?;
        let result = self.reconcile_locked(payment.id).await;
        if let Err(e) = self.lock.release(token).await {
            warn!(payment_id = %payment.id, "Failed to release reconcile lock: {}", e);
        }
        result
    }

    async fn reconcile_locked(&self, payment_id: Uuid) -> Result<ReconcileOutcome, BookingError> {
        // Re-read under the lock; the caller's copy may be stale.
        let payment = self.payments.get(payment_id).await?;

        let Some(booking) = self.bookings.get(payment.booking_id).await? else {
            warn!(
                payment_id = %payment.id,
                booking_id = %payment.booking_id,
                "Payment references a booking that no longer exists"
            );
            return Err(BookingError::OrphanPayment {
                payment_id: payment.id,
                booking_id: payment.booking_id,
            });
        };

        let current = booking.pairing();
        if keeps_cancelled(current, payment.status) {
            debug!(booking_id = %booking.id, "Cancelled booking kept despite {} payment", payment.status);
            return Ok(ReconcileOutcome::Unchanged(booking));
        }

        let target = pairing_for(payment.status, current);
        if target == current {
            return Ok(ReconcileOutcome::Unchanged(booking));
        }

        match self.bookings.apply_pairing(booking.id, target).await? {
            Some(updated) => {
                info!(
                    booking_id = %booking.id,
                    payment_id = %payment.id,
                    "Booking moved {} -> {} on {} payment",
                    current,
                    target,
                    payment.status
                );
                Ok(ReconcileOutcome::Updated {
                    previous: current,
                    booking: updated,
                })
            }
            // Someone else got there first.
            None => {
                let booking = self.bookings.get(booking.id).await?.ok_or(BookingError::OrphanPayment {
                    payment_id: payment.id,
                    booking_id: payment.booking_id,
                })?;
                Ok(ReconcileOutcome::Unchanged(booking))
            }
        }
    }

    /// Settle a booking after the client reports a finished checkout. The
    /// processor is the source of truth: unless it reports the intent as
    /// succeeded nothing is written. Calling this again for the same intent
    /// converges on the same state.
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, intent_id: &str, booking_id: Uuid) -> Result<Confirmation, BookingError> {
        let intent = self.gateway.retrieve_payment_intent(intent_id).await.map_err(|e| {
            error!("Failed to retrieve payment intent: {}", e);
            BookingError::from(e)
        })?;

        if intent.status != IntentStatus::Succeeded {
            return Err(BookingError::PaymentNotSucceeded(intent.status.as_str().to_string()));
        }

        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| BookingError::booking_not_found(booking_id))?;

        if to_minor_units(booking.total_amount) != Some(intent.amount_minor) {
            warn!(
                booking_id = %booking.id,
                "Intent {} charged {} minor units against a total of {}",
                intent.id,
                intent.amount_minor,
                booking.total_amount
            );
            return Err(BookingError::InvalidState(
                "Payment amount does not match the booking total".to_string(),
            ));
        }

        let token = self.lock.acquire(&format!("intent:{}", intent_id)).await?;
        let settled = self.settle_intent(&intent, &booking).await;
        if let Err(e) = self.lock.release(token).await {
            warn!("Failed to release intent lock: {}", e);
        }
        let payment = settled?;

        self.reconcile(&payment).await?;

        let transaction_id = payment.transaction_id.clone().unwrap_or_else(new_transaction_id);
        let booking = self
            .bookings
            .record_settlement(booking_id, payment.processor_charge_id.as_deref(), &transaction_id)
            .await?
            .ok_or_else(|| BookingError::booking_not_found(booking_id))?;
        let payment = self.payments.get(payment.id).await?;

        if payment.status == PaymentStatus::Succeeded {
            info!(booking_id = %booking.id, payment_id = %payment.id, "Payment confirmed");
            self.notifier.dispatch(NotificationKind::PaymentConfirmation, &booking);
        } else {
            info!(
                booking_id = %booking.id,
                payment_id = %payment.id,
                "Confirmation left {} payment in place",
                payment.status
            );
        }

        Ok(Confirmation { booking, payment })
    }

    /// Find the payment for this intent or create it, then mark it settled.
    /// The processor keeps reporting `succeeded` after a refund, so a payment
    /// already in the refund flow keeps its status. A cancelled booking's
    /// money is owed back: its payment settles as `cancellation_pending`.
    async fn settle_intent(&self, intent: &PaymentIntent, booking: &Booking) -> Result<Payment, BookingError> {
        let settled = if booking.status == BookingStatus::Cancelled {
            PaymentStatus::CancellationPending
        } else {
            PaymentStatus::Succeeded
        };

        match self.payments.payments.find_by_intent(booking.id, &intent.id).await? {
            Some(existing) => {
                let target = match existing.status {
                    PaymentStatus::Pending | PaymentStatus::Failed => settled,
                    // Already settled or in the refund flow: only missing ids are filled in.
                    status => status,
                };
                if target == existing.status
                    && existing.processor_charge_id.is_some()
                    && existing.transaction_id.is_some()
                {
                    debug!(payment_id = %existing.id, "Intent {} already settled as {}", intent.id, target);
                    return Ok(existing);
                }

                // Ids already on record win over whatever the intent reports now.
                let charge_id = existing
                    .processor_charge_id
                    .as_deref()
                    .or(intent.latest_charge.as_deref());
                let transaction_id = existing.transaction_id.clone().unwrap_or_else(new_transaction_id);
                self.payments
                    .payments
                    .record_settlement(existing.id, target, charge_id, &transaction_id)
                    .await?
                    .ok_or_else(|| BookingError::payment_not_found(existing.id))
            }
            None => {
                let mut payment = Payment::open(
                    booking.id,
                    booking.total_amount,
                    self.payments.currency(),
                    Some(intent.id.clone()),
                    booking.customer.clone(),
                );
                payment.status = settled;
                payment.processor_charge_id = intent.latest_charge.clone();
                payment.transaction_id = Some(new_transaction_id());
                self.payments.payments.insert(&payment).await?;
                debug!(payment_id = %payment.id, "Recorded payment for unseen intent {}", intent.id);
                Ok(payment)
            }
        }
    }

    /// Administrative payment status change, followed by reconciliation.
    pub async fn set_payment_status(&self, payment_id: Uuid, status: &str) -> Result<Confirmation, BookingError> {
        let payment = self.payments.record_status(payment_id, status).await?;
        let outcome = self.reconcile(&payment).await?;
        let booking_changed = outcome.is_updated();
        let booking = outcome.into_booking();
        let payment = self.payments.get(payment.id).await?;

        self.notifier.dispatch(NotificationKind::PaymentStatusUpdate, &booking);
        if booking_changed {
            self.notifier.dispatch(NotificationKind::BookingStatusUpdate, &booking);
        }
        Ok(Confirmation { booking, payment })
    }

    /// Re-derive every booking's pairing from its authoritative payment.
    /// Errors on one booking are recorded and the sweep moves on.
    pub async fn resync_all(&self) -> Result<ResyncReport, BookingError> {
        let payments = self.payments.list_all().await?;
        let mut report = ResyncReport {
            scanned: payments.len(),
            ..Default::default()
        };

        let mut by_booking: BTreeMap<Uuid, Vec<Payment>> = BTreeMap::new();
        for payment in payments {
            by_booking.entry(payment.booking_id).or_default().push(payment);
        }

        for (booking_id, attempts) in by_booking {
            let group: Vec<Uuid> = attempts.iter().map(|p| p.id).collect();
            let Some(authoritative) = select_authoritative(attempts) else {
                continue;
            };

            match self.reconcile(&authoritative).await {
                Ok(ReconcileOutcome::Updated { previous, booking }) => {
                    report.corrected += 1;
                    report.superseded += group.len() - 1;
                    report.corrections.push(Correction {
                        booking_id,
                        payment_id: authoritative.id,
                        from: previous,
                        to: booking.pairing(),
                    });
                    self.notifier.dispatch(NotificationKind::BookingStatusUpdate, &booking);
                }
                Ok(ReconcileOutcome::Unchanged(_)) => {
                    report.unchanged += 1;
                    report.superseded += group.len() - 1;
                }
                Err(BookingError::OrphanPayment { .. }) => {
                    report.orphaned.extend(group);
                }
                Err(e) => {
                    error!(payment_id = %authoritative.id, "Resync failed: {}", e);
                    report.failures.push(ResyncFailure {
                        payment_id: authoritative.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            scanned = report.scanned,
            corrected = report.corrected,
            orphaned = report.orphaned.len(),
            failed = report.failures.len(),
            "Payment resync finished"
        );
        Ok(report)
    }
}

/// Highest authority wins; ties go to the most recently updated attempt.
fn select_authoritative(mut attempts: Vec<Payment>) -> Option<Payment> {
    attempts.sort_by(|a, b| {
        b.status
            .authority()
            .cmp(&a.status.authority())
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    attempts.into_iter().next()
}
