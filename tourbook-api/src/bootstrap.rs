use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tourbook_booking::{BookingEngine, EngineParts, NotificationDispatcher};
use tourbook_core::lock::{LocalReconcileLock, ReconcileLock};
use tourbook_core::notify::{LogNotificationSink, NotificationSink};
use tourbook_store::app_config::{Config, NotificationConfig};
use tourbook_store::{
    DbClient, PgBookingRepository, PgPackageCatalog, PgPaymentRepository, RedisClient,
    RedisReconcileLock, StripeGateway,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::{AppState, AuthConfig};

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tourbook_api=debug,tourbook_booking=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Everything a process needs beyond the HTTP layer.
pub struct Services {
    pub engine: BookingEngine,
    pub redis: Option<Arc<RedisClient>>,
    /// Drains the notification queue; finishes once every engine clone is dropped.
    pub notifier: JoinHandle<()>,
}

pub async fn build_services(config: &Config) -> anyhow::Result<Services> {
    let db = DbClient::connect(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let redis = match &config.redis.url {
        Some(url) => Some(Arc::new(RedisClient::new(url).context("Invalid Redis URL")?)),
        None => {
            warn!("No Redis configured: reconcile locks are process-local and rate limiting is off");
            None
        }
    };
    let lock: Arc<dyn ReconcileLock> = match &redis {
        Some(client) => Arc::new(RedisReconcileLock::new(client.as_ref().clone())),
        None => Arc::new(LocalReconcileLock::new()),
    };

    let gateway = StripeGateway::new(&config.gateway).context("Failed to build Stripe client")?;
    let (notifier, worker) = NotificationDispatcher::spawn(
        notification_sink(&config.notifications)?,
        config.notifications.channel_capacity,
    );

    let engine = BookingEngine::new(EngineParts {
        bookings: Arc::new(PgBookingRepository::new(db.pool.clone())),
        payments: Arc::new(PgPaymentRepository::new(db.pool.clone())),
        catalog: Arc::new(PgPackageCatalog::new(db.pool.clone())),
        gateway: Arc::new(gateway),
        lock,
        notifier,
        currency: config.gateway.currency.clone(),
    });

    Ok(Services {
        engine,
        redis,
        notifier: worker,
    })
}

pub fn app_state(config: &Config, engine: BookingEngine, redis: Option<Arc<RedisClient>>) -> AppState {
    AppState {
        engine,
        redis,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        request_timeout: Duration::from_secs(config.server.request_timeout_seconds),
        rate_limit_per_minute: config.server.rate_limit_per_minute,
    }
}

fn notification_sink(config: &NotificationConfig) -> anyhow::Result<Arc<dyn NotificationSink>> {
    #[cfg(feature = "kafka")]
    if let Some(brokers) = &config.kafka_brokers {
        let sink = tourbook_store::KafkaNotificationSink::connect(brokers, config.topic.clone())
            .context("Failed to create Kafka producer")?;
        info!("Publishing notifications to Kafka topic {}", config.topic);
        return Ok(Arc::new(sink));
    }

    #[cfg(not(feature = "kafka"))]
    if config.kafka_brokers.is_some() {
        warn!("Kafka brokers configured but the kafka feature is off; logging notifications instead");
    }

    info!("Notifications go to the log");
    Ok(Arc::new(LogNotificationSink))
}

/// Wait briefly for queued notifications to go out.
pub async fn flush_notifications(worker: JoinHandle<()>) {
    if tokio::time::timeout(Duration::from_secs(5), worker).await.is_err() {
        warn!("Notification worker did not drain in time");
    }
}
