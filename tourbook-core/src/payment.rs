use crate::booking::CustomerInfo;
use crate::ParseStatusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Status of a local payment record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
    CancellationPending,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Succeeded,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
        PaymentStatus::CancellationPending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::CancellationPending => "cancellation_pending",
        }
    }

    /// Only `pending` attempts are still in flight.
    pub fn is_active(&self) -> bool {
        *self == PaymentStatus::Pending
    }

    /// Rank used to pick the authoritative payment among several attempts
    /// on one booking. Money-bearing states outrank in-flight, which
    /// outrank failed.
    pub fn authority(&self) -> u8 {
        match self {
            PaymentStatus::Succeeded | PaymentStatus::Refunded | PaymentStatus::CancellationPending => 2,
            PaymentStatus::Pending => 1,
            PaymentStatus::Failed => 0,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "payment status",
                value: s.to_string(),
            })
    }
}

/// One attempt to pay for a booking, tied to a processor intent.
/// Never deleted, even when its booking is cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    /// Major currency units
    pub amount: i64,
    pub currency: String,
    pub customer: CustomerInfo,
    pub processor_intent_id: Option<String>,
    pub processor_charge_id: Option<String>,
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn open(
        booking_id: Uuid,
        amount: i64,
        currency: &str,
        intent_id: Option<String>,
        customer: CustomerInfo,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id,
            amount,
            currency: currency.to_uppercase(),
            customer,
            processor_intent_id: intent_id,
            processor_charge_id: None,
            transaction_id: None,
            status: PaymentStatus::Pending,
            payment_method: "credit_card".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, status: PaymentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Opaque transaction reference stamped at confirmation time.
pub fn new_transaction_id() -> String {
    format!("TRX-{}", Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_statuses() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        let err = "chargeback".parse::<PaymentStatus>().unwrap_err();
        assert_eq!(err.value, "chargeback");
    }

    #[test]
    fn test_authority_order() {
        assert!(PaymentStatus::Succeeded.authority() > PaymentStatus::Pending.authority());
        assert!(PaymentStatus::Pending.authority() > PaymentStatus::Failed.authority());
        assert_eq!(PaymentStatus::Refunded.authority(), PaymentStatus::Succeeded.authority());
    }

    #[test]
    fn test_open_payment() {
        let payment = Payment::open(
            Uuid::new_v4(),
            30000,
            "pkr",
            Some("pi_123".to_string()),
            CustomerInfo::new("Sara", "sara@example.com", "0301"),
        );
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.currency, "PKR");
        assert!(new_transaction_id().starts_with("TRX-"));
    }
}
