use async_trait::async_trait;
use chrono::Utc;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};

use super::client_config;
use crate::config::{KafkaConfig, Topics};
use crate::error::EventError;
use crate::models::{DomainEvent, EventEnvelope};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Sink for domain events emitted after a successful commit.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> Result<(), EventError>;
}

/// Message key: topic name plus the send time in nanoseconds.
pub fn message_key(topic: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{topic}-{nanos}")
}

pub struct KafkaEventProducer {
    producer: FutureProducer,
    topics: Topics,
}

impl KafkaEventProducer {
    pub fn new(config: &KafkaConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer = client_config(config)
            .set("acks", "all")
            .set("message.send.max.retries", "3")
            .set("message.timeout.ms", "10000")
            .create()?;

        info!(
            brokers = %config.bootstrap_servers,
            trip_started = %config.topics.trip_started,
            trip_ended = %config.topics.trip_ended,
            location_updated = %config.topics.location_updated,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            topics: config.topics.clone(),
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaEventProducer {
    async fn publish(&self, event: DomainEvent) -> Result<(), EventError> {
        let envelope = event.into_envelope();
        let topic = self.topics.for_event(envelope.event_type);
        let payload = serde_json::to_vec(&envelope)?;
        let key = message_key(topic);
        let timestamp = envelope.timestamp.to_rfc3339();

        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "event-type",
                value: Some(envelope.event_type.as_str()),
            })
            .insert(Header {
                key: "timestamp",
                value: Some(timestamp.as_str()),
            });

        let record = FutureRecord::to(topic)
            .key(&key)
            .payload(&payload)
            .headers(headers);

        match self.producer.send(record, Timeout::After(SEND_TIMEOUT)).await {
            Ok((partition, offset)) => {
                debug!(
                    topic = %topic,
                    partition,
                    offset,
                    event_id = %envelope.event_id,
                    "Event published"
                );
                Ok(())
            }
            Err((kafka_error, _)) => {
                error!(topic = %topic, error = %kafka_error, "Failed to publish event");
                Err(EventError::Publish {
                    topic: topic.to_string(),
                    reason: kafka_error.to_string(),
                })
            }
        }
    }
}

/// In-process publisher that keeps every envelope it is given.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<EventEnvelope<DomainEvent>>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every publish fails and nothing is recorded.
    pub fn fail_publishes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<EventEnvelope<DomainEvent>> {
        self.published
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<(), EventError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EventError::Publish {
                topic: event.event_type().as_str().to_string(),
                reason: "publisher disabled".to_string(),
            });
        }
        let envelope = event.into_envelope();
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(envelope);
        Ok(())
    }
}
