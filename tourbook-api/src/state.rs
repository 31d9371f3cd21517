use std::sync::Arc;
use std::time::Duration;
use tourbook_booking::BookingEngine;
use tourbook_store::RedisClient;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: BookingEngine,
    /// Absent when no Redis is configured; rate limiting is then off.
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub request_timeout: Duration,
    pub rate_limit_per_minute: i64,
}
