use axum::{
    http::{header, Method},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod bootstrap;
pub mod error;
pub mod middleware;
pub mod payments;
pub mod state;

pub use state::{AppState, AuthConfig};

use crate::middleware::{rate_limit_middleware, require_auth};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth = from_fn_with_state(state.clone(), require_auth);

    let mut router = Router::new()
        .route("/health", get(health))
        .nest("/api/bookings", bookings::routes().route_layer(auth.clone()))
        .nest("/api/payments", payments::routes().route_layer(auth))
        .layer(TimeoutLayer::new(state.request_timeout));

    if state.redis.is_some() && state.rate_limit_per_minute > 0 {
        router = router.layer(from_fn_with_state(state.clone(), rate_limit_middleware));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
