use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tourbook_core::repository::PageRequest;
use tourbook_core::{BookingStatus, CustomerInfo, NewBooking};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{require_admin, Claims};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub package_id: Uuid,
    pub travel_date: NaiveDate,
    pub travelers: u32,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

impl CreateBookingRequest {
    /// Contact details fall back to the caller's token claims.
    pub fn into_new_booking(self, claims: &Claims) -> NewBooking {
        NewBooking {
            package_id: self.package_id,
            user_id: claims.sub.clone(),
            travel_date: self.travel_date,
            travelers: self.travelers,
            customer: CustomerInfo::new(
                self.customer_name.unwrap_or_else(|| claims.name.clone()),
                self.customer_email.unwrap_or_else(|| claims.email.clone()),
                self.customer_phone.unwrap_or_default(),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<PageQuery> for PageRequest {
    fn from(q: PageQuery) -> Self {
        PageRequest::new(q.page, q.limit)
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_my_bookings).post(create_booking))
        .route(
            "/admin/all",
            get(list_all_bookings).route_layer(middleware::from_fn(require_admin)),
        )
        .route(
            "/{id}",
            get(get_booking).merge(put(update_booking_status).route_layer(middleware::from_fn(require_admin))),
        )
        .route("/{id}/cancel", put(cancel_booking))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let booking = state.engine.bookings.create(req.into_new_booking(&claims)).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": booking }))))
}

async fn list_my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, AppError> {
    let bookings = state.engine.bookings.list_for_user(&claims.sub).await?;
    Ok(Json(json!({
        "success": true,
        "count": bookings.len(),
        "data": bookings,
    })))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let booking = state.engine.bookings.get_for_actor(id, &claims.actor()).await?;
    Ok(Json(json!({ "success": true, "data": booking })))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let booking = state.engine.bookings.cancel(id, &claims.actor()).await?;
    Ok(Json(json!({
        "success": true,
        "message": booking.cancellation_message(),
        "data": booking,
    })))
}

async fn list_all_bookings(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let page = state.engine.bookings.list_page(query.into()).await?;
    Ok(Json(json!({
        "success": true,
        "count": page.data.len(),
        "total": page.total,
        "pagination": {
            "page": page.page,
            "limit": page.limit,
            "totalPages": page.total_pages,
        },
        "data": page.data,
    })))
}

async fn update_booking_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Value>, AppError> {
    let status: BookingStatus = update
        .status
        .parse()
        .map_err(|e: tourbook_core::ParseStatusError| AppError::ValidationError(e.to_string()))?;

    let booking = state.engine.bookings.set_status(id, status).await?;
    Ok(Json(json!({ "success": true, "data": booking })))
}
