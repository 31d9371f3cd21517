use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tourbook_core::repository::{Page, PageRequest, PaymentRepository};
use tourbook_core::{CoreResult, CustomerInfo, Payment, PaymentStatus};
use uuid::Uuid;

/// Payments table. One-pending-per-booking and intent uniqueness are
/// enforced by indexes; violations surface as `ConflictError`.
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    amount: i64,
    currency: String,
    customer_name: String,
    customer_email: String,
    customer_phone: String,
    processor_intent_id: Option<String>,
    processor_charge_id: Option<String>,
    transaction_id: Option<String>,
    status: String,
    payment_method: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            booking_id: row.booking_id,
            amount: row.amount,
            currency: row.currency,
            customer: CustomerInfo::new(row.customer_name, row.customer_email, row.customer_phone),
            processor_intent_id: row.processor_intent_id,
            processor_charge_id: row.processor_charge_id,
            transaction_id: row.transaction_id,
            status: row.status.parse().map_err(|e| StoreError::Corrupt(format!("{}", e)))?,
            payment_method: row.payment_method,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_payments(rows: Vec<PaymentRow>) -> CoreResult<Vec<Payment>> {
    rows.into_iter()
        .map(|row| Payment::try_from(row).map_err(Into::into))
        .collect()
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn insert(&self, payment: &Payment) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, booking_id, amount, currency, customer_name, customer_email, customer_phone,
                processor_intent_id, processor_charge_id, transaction_id, status, payment_method,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(payment.id)
        .bind(payment.booking_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(&payment.customer.name)
        .bind(payment.customer.email.expose())
        .bind(payment.customer.phone.expose())
        .bind(&payment.processor_intent_id)
        .bind(&payment.processor_charge_id)
        .bind(&payment.transaction_id)
        .bind(payment.status.as_str())
        .bind(&payment.payment_method)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(row.map(Payment::try_from).transpose()?)
    }

    async fn find_by_intent(&self, booking_id: Uuid, intent_id: &str) -> CoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE booking_id = $1 AND processor_intent_id = $2",
        )
        .bind(booking_id)
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(row.map(Payment::try_from).transpose()?)
    }

    async fn find_by_charge(&self, charge_id: &str) -> CoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE processor_charge_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(charge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(row.map(Payment::try_from).transpose()?)
    }

    async fn list_by_booking(&self, booking_id: Uuid) -> CoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE booking_id = $1 ORDER BY created_at DESC",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        into_payments(rows)
    }

    async fn list_by_bookings(&self, booking_ids: &[Uuid]) -> CoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE booking_id = ANY($1) ORDER BY created_at DESC",
        )
        .bind(booking_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        into_payments(rows)
    }

    async fn list_all(&self) -> CoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;

        into_payments(rows)
    }

    async fn list_page(&self, page: PageRequest) -> CoreResult<Page<Payment>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;

        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(Page::new(into_payments(rows)?, total.max(0) as u64, page))
    }

    async fn update_status(&self, id: Uuid, status: PaymentStatus) -> CoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(row.map(Payment::try_from).transpose()?)
    }

    async fn record_settlement(
        &self,
        id: Uuid,
        status: PaymentStatus,
        charge_id: Option<&str>,
        transaction_id: &str,
    ) -> CoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            UPDATE payments
            SET status = $2,
                processor_charge_id = COALESCE($3, processor_charge_id),
                transaction_id = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(charge_id)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(row.map(Payment::try_from).transpose()?)
    }
}
