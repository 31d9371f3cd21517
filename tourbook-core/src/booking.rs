use crate::ParseStatusError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tourbook_catalog::Package;
use tourbook_shared::Masked;
use uuid::Uuid;

/// Lifecycle of the trip
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(ParseStatusError {
                kind: "booking status",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle of the money behind a booking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingPaymentStatus {
    Unpaid,
    Pending,
    Paid,
    /// Reserved. Nothing in the reconciliation path produces or reads it.
    Partial,
    Refunded,
    RefundPending,
}

impl BookingPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingPaymentStatus::Unpaid => "unpaid",
            BookingPaymentStatus::Pending => "pending",
            BookingPaymentStatus::Paid => "paid",
            BookingPaymentStatus::Partial => "partial",
            BookingPaymentStatus::Refunded => "refunded",
            BookingPaymentStatus::RefundPending => "refund_pending",
        }
    }
}

impl fmt::Display for BookingPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingPaymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(BookingPaymentStatus::Unpaid),
            "pending" => Ok(BookingPaymentStatus::Pending),
            "paid" => Ok(BookingPaymentStatus::Paid),
            "partial" => Ok(BookingPaymentStatus::Partial),
            "refunded" => Ok(BookingPaymentStatus::Refunded),
            "refund_pending" => Ok(BookingPaymentStatus::RefundPending),
            other => Err(ParseStatusError {
                kind: "booking payment status",
                value: other.to_string(),
            }),
        }
    }
}

/// The (status, payment status) pair a booking rests in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Pairing {
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
}

impl Pairing {
    pub const fn new(status: BookingStatus, payment_status: BookingPaymentStatus) -> Self {
        Self { status, payment_status }
    }

    /// Whether this pair may be persisted.
    pub fn is_valid(&self) -> bool {
        use BookingPaymentStatus as P;
        use BookingStatus as S;

        matches!(
            (self.status, self.payment_status),
            (S::Pending, P::Unpaid | P::Pending | P::RefundPending)
                | (S::Confirmed, P::Paid | P::RefundPending)
                | (S::Cancelled, P::Unpaid | P::Refunded | P::RefundPending)
        )
    }
}

impl fmt::Display for Pairing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.status, self.payment_status)
    }
}

/// Contact details captured with a booking and copied onto its payments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CustomerInfo {
    pub name: String,
    pub email: Masked<String>,
    #[serde(default)]
    pub phone: Masked<String>,
}

impl CustomerInfo {
    pub fn new(name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: Masked::new(email.into()),
            phone: Masked::new(phone.into()),
        }
    }
}

/// Input for opening a booking
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub package_id: Uuid,
    pub user_id: String,
    pub travel_date: NaiveDate,
    pub travelers: u32,
    pub customer: CustomerInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub package_id: Uuid,
    pub user_id: String,
    pub package_name: String,
    pub package_image: String,
    pub travel_date: NaiveDate,
    pub booking_date: DateTime<Utc>,
    pub travelers: u32,
    pub customer: CustomerInfo,
    /// Major currency units; fixed at creation.
    pub total_amount: i64,
    pub payment_method: String,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub processor_customer_id: Option<String>,
    pub processor_intent_id: Option<String>,
    pub processor_charge_id: Option<String>,
    pub transaction_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Snapshot the package into a fresh `(pending, unpaid)` booking.
    pub fn open(request: NewBooking, package: &Package, total_amount: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            package_id: request.package_id,
            user_id: request.user_id,
            package_name: package.title.clone(),
            package_image: package.image.clone(),
            travel_date: request.travel_date,
            booking_date: now,
            travelers: request.travelers,
            customer: request.customer,
            total_amount,
            payment_method: "credit_card".to_string(),
            status: BookingStatus::Pending,
            payment_status: BookingPaymentStatus::Unpaid,
            processor_customer_id: None,
            processor_intent_id: None,
            processor_charge_id: None,
            transaction_id: None,
            updated_at: now,
        }
    }

    pub fn pairing(&self) -> Pairing {
        Pairing::new(self.status, self.payment_status)
    }

    pub fn set_pairing(&mut self, pairing: Pairing) {
        self.status = pairing.status;
        self.payment_status = pairing.payment_status;
        self.updated_at = Utc::now();
    }

    /// True once the travel date lies strictly before `today`.
    pub fn is_past(&self, today: NaiveDate) -> bool {
        self.travel_date < today
    }

    pub fn cancellation_message(&self) -> &'static str {
        if self.payment_status == BookingPaymentStatus::RefundPending {
            "Your booking has been cancelled. If you made a payment, our team will review your refund request."
        } else {
            "Your booking has been cancelled successfully."
        }
    }
}
