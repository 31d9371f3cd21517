use crate::booking::{Booking, Pairing};
use crate::payment::{Payment, PaymentStatus};
use crate::CoreResult;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

/// 1-based page request as accepted by the admin listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            limit: limit
                .filter(|l| *l > 0)
                .unwrap_or(Self::DEFAULT_LIMIT)
                .min(Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            data,
            total,
            page: request.page,
            limit: request.limit,
            total_pages: total.div_ceil(u64::from(request.limit)),
        }
    }
}

/// Persistence for bookings. Every write of the (status, payment status)
/// pair goes through [`BookingRepository::apply_pairing`], which must be a
/// single atomic update.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(&self, booking: &Booking) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Booking>>;

    /// Newest first
    async fn list_by_user(&self, user_id: &str) -> CoreResult<Vec<Booking>>;

    async fn list_page(&self, page: PageRequest) -> CoreResult<Page<Booking>>;

    /// Conditionally set both pairing fields. Returns the updated booking, or
    /// `None` when the booking is missing or already rests at `target`.
    async fn apply_pairing(&self, id: Uuid, target: Pairing) -> CoreResult<Option<Booking>>;

    async fn record_settlement(
        &self,
        id: Uuid,
        charge_id: Option<&str>,
        transaction_id: &str,
    ) -> CoreResult<Option<Booking>>;
}

/// Persistence for payment attempts
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Fails with `ConflictError` if the booking already has a pending payment.
    async fn insert(&self, payment: &Payment) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Payment>>;

    async fn find_by_intent(&self, booking_id: Uuid, intent_id: &str) -> CoreResult<Option<Payment>>;

    async fn find_by_charge(&self, charge_id: &str) -> CoreResult<Option<Payment>>;

    async fn list_by_booking(&self, booking_id: Uuid) -> CoreResult<Vec<Payment>>;

    async fn list_by_bookings(&self, booking_ids: &[Uuid]) -> CoreResult<Vec<Payment>>;

    async fn list_all(&self) -> CoreResult<Vec<Payment>>;

    /// Newest first
    async fn list_page(&self, page: PageRequest) -> CoreResult<Page<Payment>>;

    async fn update_status(&self, id: Uuid, status: PaymentStatus) -> CoreResult<Option<Payment>>;

    async fn record_settlement(
        &self,
        id: Uuid,
        status: PaymentStatus,
        charge_id: Option<&str>,
        transaction_id: &str,
    ) -> CoreResult<Option<Payment>>;
}
