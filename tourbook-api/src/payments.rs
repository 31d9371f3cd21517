use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tourbook_core::gateway::PaymentGateway;
use tourbook_core::money::from_minor_units;
use uuid::Uuid;

use crate::bookings::{CreateBookingRequest, PageQuery, StatusUpdate};
use crate::error::AppError;
use crate::middleware::{require_admin, Claims};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    #[serde(default)]
    pub payment_intent_id: String,
    pub booking_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_my_payments))
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/confirm", post(confirm_payment))
        .route("/admin/all", get(list_all_payments).route_layer(middleware::from_fn(require_admin)))
        .route("/admin/resync", post(resync_payments).route_layer(middleware::from_fn(require_admin)))
        .route("/stripe/balance", get(stripe_balance).route_layer(middleware::from_fn(require_admin)))
        .route("/stripe/transactions", get(list_transactions).route_layer(middleware::from_fn(require_admin)))
        .route("/stripe/transactions/{id}", get(transaction_details).route_layer(middleware::from_fn(require_admin)))
        .route(
            "/{id}",
            get(get_payment).merge(put(update_payment_status).route_layer(middleware::from_fn(require_admin))),
        )
}

async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let session = state
        .engine
        .checkout
        .open_payment_intent(req.into_new_booking(&claims))
        .await?;

    Ok(Json(json!({
        "success": true,
        "clientSecret": session.client_secret,
        "bookingId": session.booking.id,
        "paymentId": session.payment.id,
    })))
}

async fn confirm_payment(
    State(state): State<AppState>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<Value>, AppError> {
    let booking_id = match req.booking_id {
        Some(id) if !req.payment_intent_id.is_empty() => id,
        _ => {
            return Err(AppError::ValidationError(
                "Payment intent ID and booking ID are required".to_string(),
            ))
        }
    };

    let confirmed = state
        .engine
        .reconciler
        .confirm_payment(&req.payment_intent_id, booking_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "booking": confirmed.booking,
        "payment": confirmed.payment,
    })))
}

async fn get_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let payment = state.engine.payments.get_for_actor(id, &claims.actor()).await?;
    Ok(Json(json!({ "success": true, "data": payment })))
}

async fn list_my_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, AppError> {
    let payments = state.engine.payments.list_for_user(&claims.sub).await?;
    Ok(Json(json!({
        "success": true,
        "count": payments.len(),
        "data": payments,
    })))
}

async fn list_all_payments(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let page = state.engine.payments.list_page(query.into()).await?;
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

async fn update_payment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Value>, AppError> {
    let updated = state
        .engine
        .reconciler
        .set_payment_status(id, &update.status)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": updated.payment,
        "booking": updated.booking,
    })))
}

async fn resync_payments(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let report = state.engine.reconciler.resync_all().await?;
    Ok(Json(json!({ "success": true, "data": report })))
}

async fn stripe_balance(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let balance = state
        .engine
        .gateway
        .retrieve_balance()
        .await
        .map_err(|e| AppError::GatewayError(e.to_string()))?;

    Ok(Json(json!({ "success": true, "balance": balance.raw })))
}

async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Value>, AppError> {
    let page = query.page.filter(|p| *p > 0).unwrap_or(1);
    let limit = query.limit.filter(|l| *l > 0).unwrap_or(10).min(100);

    let charges = state
        .engine
        .gateway
        .list_charges(limit)
        .await
        .map_err(|e| AppError::GatewayError(e.to_string()))?;
    let data: Vec<Value> = charges.into_iter().map(|c| c.raw).collect();

    Ok(Json(json!({
        "success": true,
        "count": data.len(),
        "pagination": { "page": page, "limit": limit },
        "data": data,
    })))
}

/// Processor charge, enriched with the local payment and booking it settled.
async fn transaction_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let charge = state
        .engine
        .gateway
        .retrieve_charge(&id)
        .await
        .map_err(|e| AppError::GatewayError(e.to_string()))?
        .ok_or_else(|| AppError::NotFoundError("Transaction not found".to_string()))?;

    let amount = from_minor_units(charge.amount_minor);
    let mut data = charge.raw;
    if let Some(payment) = state.engine.payments.find_by_charge(&id).await? {
        let booking = state.engine.bookings.get(payment.booking_id).await.ok();
        let details = json!({
            "name": payment.customer.name,
            "email": payment.customer.email,
            "phone": payment.customer.phone,
            "payment_id": payment.id,
            "booking_id": payment.booking_id,
            "amount": amount,
            "currency": payment.currency,
            "package_name": booking.as_ref().map(|b| b.package_name.clone()),
            "travel_date": booking.as_ref().map(|b| b.travel_date),
            "status": payment.status,
            "booking_status": booking.as_ref().map(|b| b.status),
        });
        if let Value::Object(map) = &mut data {
            map.insert("enhanced_billing_details".to_string(), details);
        }
    }

    Ok(Json(json!({ "success": true, "data": data })))
}
