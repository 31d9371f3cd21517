use uuid::Uuid;

/// Wire payload for a booking whose (status, payment status) pairing moved.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingStatusChangedEvent {
    pub booking_id: Uuid,
    pub kind: String, // e.g. "PAYMENT_STATUS_UPDATE"
    pub package_name: String,
    pub status: String,
    pub payment_status: String,
    pub total_amount: i64,
    pub travel_date: chrono::NaiveDate,
    pub timestamp: i64,
}

impl BookingStatusChangedEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
