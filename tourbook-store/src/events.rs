use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tourbook_core::notify::{BookingNotification, NotificationSink};
use tourbook_core::{CoreError, CoreResult};
use tracing::{debug, error};

/// Publishes booking status changes, keyed by booking id, for the mailer
/// service to pick up.
#[derive(Clone)]
pub struct KafkaNotificationSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaNotificationSink {
    pub fn connect(brokers: &str, topic: impl Into<String>) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for KafkaNotificationSink {
    async fn deliver(&self, notification: &BookingNotification) -> CoreResult<()> {
        let payload = notification
            .to_event()
            .to_json()
            .map_err(|e| CoreError::StorageError(e.to_string()))?;
        let key = notification.booking_id.to_string();
        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(5))).await {
            Ok(delivery) => {
                debug!(
                    "{} for booking {} landed on partition {} offset {}",
                    notification.kind.as_str(),
                    key,
                    delivery.partition,
                    delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to publish to {}: {}", self.topic, e);
                Err(CoreError::StorageError(e.to_string()))
            }
        }
    }
}
