pub mod app_config;
pub mod error;
pub mod database;
pub mod booking_repo;
pub mod payment_repo;
pub mod catalog_repo;
pub mod redis_repo;
pub mod stripe_gateway;
#[cfg(feature = "kafka")]
pub mod events;

pub use error::StoreError;
pub use database::DbClient;
pub use booking_repo::PgBookingRepository;
pub use payment_repo::PgPaymentRepository;
pub use catalog_repo::PgPackageCatalog;
pub use redis_repo::{RedisClient, RedisReconcileLock};
pub use stripe_gateway::StripeGateway;
#[cfg(feature = "kafka")]
pub use events::KafkaNotificationSink;
