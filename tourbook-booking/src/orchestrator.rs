use crate::bookings::{BookingStore, ProcessorRefs};
use crate::error::BookingError;
use crate::payments::PaymentStore;
use crate::reconciler::BookingPaymentReconciler;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tourbook_core::gateway::{CreateCustomer, CreateIntent, PaymentGateway};
use tourbook_core::money::to_minor_units;
use tourbook_core::{Booking, NewBooking, Payment};
use tracing::{error, info, instrument};

/// What the client needs to finish a card checkout
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub client_secret: Option<String>,
    pub intent_id: String,
    pub booking: Booking,
    pub payment: Payment,
}

/// Opens a processor intent together with the booking and payment it pays for.
pub struct CheckoutOrchestrator {
    bookings: BookingStore,
    payments: PaymentStore,
    reconciler: Arc<BookingPaymentReconciler>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CheckoutOrchestrator {
    pub fn new(
        bookings: BookingStore,
        payments: PaymentStore,
        reconciler: Arc<BookingPaymentReconciler>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            bookings,
            payments,
            reconciler,
            gateway,
        }
    }

    /// Price the trip, register the customer and intent with the processor,
    /// then persist the booking and its first `pending` payment. Nothing is
    /// stored if the processor refuses.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn open_payment_intent(&self, request: NewBooking) -> Result<CheckoutSession, BookingError> {
        let (package, total) = self.bookings.quote(&request).await?;
        let amount_minor = to_minor_units(total)
            .ok_or_else(|| BookingError::InvalidState("Booking total is out of range".to_string()))?;

        let customer = self
            .gateway
            .create_customer(CreateCustomer {
                name: request.customer.name.clone(),
                email: request.customer.email.expose().clone(),
                phone: request.customer.phone.expose().clone(),
            })
            .await
            .map_err(|e| {
                error!("Failed to create processor customer: {}", e);
                BookingError::from(e)
            })?;

        let mut metadata = BTreeMap::new();
        metadata.insert("packageId".to_string(), package.id.to_string());
        metadata.insert("packageName".to_string(), package.title.clone());
        metadata.insert("travelDate".to_string(), request.travel_date.to_string());
        metadata.insert("travelers".to_string(), request.travelers.to_string());
        metadata.insert("userId".to_string(), request.user_id.clone());

        let intent = self
            .gateway
            .create_payment_intent(CreateIntent {
                amount_minor,
                currency: self.payments.currency().to_lowercase(),
                customer_id: customer.id.clone(),
                metadata,
            })
            .await
            .map_err(|e| {
                error!("Failed to create payment intent: {}", e);
                BookingError::from(e)
            })?;

        let customer_info = request.customer.clone();
        let booking = self
            .bookings
            .open(
                request,
                Some(ProcessorRefs {
                    customer_id: customer.id,
                    intent_id: intent.id.clone(),
                }),
            )
            .await?;
        let payment = self
            .payments
            .open(booking.id, booking.total_amount, &intent.id, customer_info)
            .await?;
        let booking = self.reconciler.reconcile(&payment).await?.into_booking();

        info!(booking_id = %booking.id, intent_id = %intent.id, "Checkout opened");
        Ok(CheckoutSession {
            client_secret: intent.client_secret,
            intent_id: intent.id,
            booking,
            payment,
        })
    }
}
