use crate::booking::{Booking, BookingPaymentStatus, BookingStatus};
use crate::CoreResult;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tourbook_shared::models::events::BookingStatusChangedEvent;
use tourbook_shared::Masked;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    BookingReceived,
    BookingStatusUpdate,
    PaymentConfirmation,
    PaymentStatusUpdate,
    BookingCancellation,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingReceived => "BOOKING_RECEIVED",
            NotificationKind::BookingStatusUpdate => "BOOKING_STATUS_UPDATE",
            NotificationKind::PaymentConfirmation => "PAYMENT_CONFIRMATION",
            NotificationKind::PaymentStatusUpdate => "PAYMENT_STATUS_UPDATE",
            NotificationKind::BookingCancellation => "BOOKING_CANCELLATION",
        }
    }
}

/// Everything a template needs, copied out of the booking so the sink never
/// reads live state.
#[derive(Debug, Clone, Serialize)]
pub struct BookingNotification {
    pub kind: NotificationKind,
    pub booking_id: Uuid,
    pub customer_name: String,
    pub customer_email: Masked<String>,
    pub package_name: String,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub total_amount: i64,
    pub travel_date: NaiveDate,
    pub travelers: u32,
}

impl BookingNotification {
    pub fn from_booking(kind: NotificationKind, booking: &Booking) -> Self {
        Self {
            kind,
            booking_id: booking.id,
            customer_name: booking.customer.name.clone(),
            customer_email: booking.customer.email.clone(),
            package_name: booking.package_name.clone(),
            status: booking.status,
            payment_status: booking.payment_status,
            total_amount: booking.total_amount,
            travel_date: booking.travel_date,
            travelers: booking.travelers,
        }
    }

    pub fn subject(&self) -> String {
        let prefix = match self.kind {
            NotificationKind::BookingReceived => "Booking Confirmation",
            NotificationKind::BookingStatusUpdate => "Booking Status Update",
            NotificationKind::PaymentConfirmation => "Payment Confirmation",
            NotificationKind::PaymentStatusUpdate => "Payment Status Update",
            NotificationKind::BookingCancellation => "Booking Cancellation",
        };
        format!("{} - {}", prefix, self.package_name)
    }

    pub fn body(&self) -> String {
        let mut body = format!(
            "Dear {},\n\nPackage: {}\nTravel Date: {}\nNumber of Travelers: {}\nTotal Amount: {}\nStatus: {}\nPayment Status: {}\n",
            self.customer_name,
            self.package_name,
            self.travel_date,
            self.travelers,
            self.total_amount,
            self.status,
            self.payment_status,
        );
        if self.kind == NotificationKind::BookingCancellation
            && self.payment_status == BookingPaymentStatus::RefundPending
        {
            body.push_str("\nOur team will review your refund request.\n");
        }
        body
    }

    pub fn to_event(&self) -> BookingStatusChangedEvent {
        BookingStatusChangedEvent {
            booking_id: self.booking_id,
            kind: self.kind.as_str().to_string(),
            package_name: self.package_name.clone(),
            status: self.status.to_string(),
            payment_status: self.payment_status.to_string(),
            total_amount: self.total_amount,
            travel_date: self.travel_date,
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Delivery channel behind the notification dispatcher (email relay,
/// message bus, log). Failures are logged by the caller, never propagated.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &BookingNotification) -> CoreResult<()>;
}

/// Writes notifications to the trace log
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn deliver(&self, notification: &BookingNotification) -> CoreResult<()> {
        tracing::info!(
            booking_id = %notification.booking_id,
            to = %notification.customer_email.hint(),
            "Notification: {}",
            notification.subject()
        );
        Ok(())
    }
}
