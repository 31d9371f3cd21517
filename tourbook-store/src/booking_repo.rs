use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tourbook_core::repository::{BookingRepository, Page, PageRequest};
use tourbook_core::{Booking, CoreError, CoreResult, CustomerInfo, Pairing};
use uuid::Uuid;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    package_id: Uuid,
    user_id: String,
    package_name: String,
    package_image: String,
    travel_date: NaiveDate,
    booking_date: DateTime<Utc>,
    travelers: i32,
    customer_name: String,
    customer_email: String,
    customer_phone: String,
    total_amount: i64,
    payment_method: String,
    status: String,
    payment_status: String,
    processor_customer_id: Option<String>,
    processor_intent_id: Option<String>,
    processor_charge_id: Option<String>,
    transaction_id: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            package_id: row.package_id,
            user_id: row.user_id,
            package_name: row.package_name,
            package_image: row.package_image,
            travel_date: row.travel_date,
            booking_date: row.booking_date,
            travelers: u32::try_from(row.travelers)
                .map_err(|_| StoreError::Corrupt(format!("booking {} has {} travelers", row.id, row.travelers)))?,
            customer: CustomerInfo::new(row.customer_name, row.customer_email, row.customer_phone),
            total_amount: row.total_amount,
            payment_method: row.payment_method,
            status: row.status.parse().map_err(|e| StoreError::Corrupt(format!("{}", e)))?,
            payment_status: row
                .payment_status
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("{}", e)))?,
            processor_customer_id: row.processor_customer_id,
            processor_intent_id: row.processor_intent_id,
            processor_charge_id: row.processor_charge_id,
            transaction_id: row.transaction_id,
            updated_at: row.updated_at,
        })
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> CoreResult<Vec<Booking>> {
    rows.into_iter()
        .map(|row| Booking::try_from(row).map_err(Into::into))
        .collect()
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert(&self, booking: &Booking) -> CoreResult<()> {
        let travelers = i32::try_from(booking.travelers)
            .map_err(|_| CoreError::ValidationError(format!("{} travelers is too many", booking.travelers)))?;

        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, package_id, user_id, package_name, package_image, travel_date, booking_date,
                travelers, customer_name, customer_email, customer_phone, total_amount,
                payment_method, status, payment_status, processor_customer_id,
                processor_intent_id, processor_charge_id, transaction_id, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(booking.id)
        .bind(booking.package_id)
        .bind(&booking.user_id)
        .bind(&booking.package_name)
        .bind(&booking.package_image)
        .bind(booking.travel_date)
        .bind(booking.booking_date)
        .bind(travelers)
        .bind(&booking.customer.name)
        .bind(booking.customer.email.expose())
        .bind(booking.customer.phone.expose())
        .bind(booking.total_amount)
        .bind(&booking.payment_method)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(&booking.processor_customer_id)
        .bind(&booking.processor_intent_id)
        .bind(&booking.processor_charge_id)
        .bind(&booking.transaction_id)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(row.map(Booking::try_from).transpose()?)
    }

    async fn list_by_user(&self, user_id: &str) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(
            "SELECT * FROM bookings WHERE user_id = $1 ORDER BY booking_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        into_bookings(rows)
    }

    async fn list_page(&self, page: PageRequest) -> CoreResult<Page<Booking>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;

        let rows = sqlx::query_as::<_, BookingRow>(
            "SELECT * FROM bookings ORDER BY booking_date DESC LIMIT $1 OFFSET $2",
        )
        .bind(i64::from(page.limit))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(Page::new(into_bookings(rows)?, total.max(0) as u64, page))
    }

    async fn apply_pairing(&self, id: Uuid, target: Pairing) -> CoreResult<Option<Booking>> {
        // Single conditional update: concurrent writers of the same target
        // see exactly one row come back.
        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET status = $2, payment_status = $3, updated_at = NOW()
            WHERE id = $1 AND NOT (status = $2 AND payment_status = $3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(target.status.as_str())
        .bind(target.payment_status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(row.map(Booking::try_from).transpose()?)
    }

    async fn record_settlement(
        &self,
        id: Uuid,
        charge_id: Option<&str>,
        transaction_id: &str,
    ) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET processor_charge_id = COALESCE($2, processor_charge_id),
                transaction_id = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(charge_id)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(row.map(Booking::try_from).transpose()?)
    }
}
