use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client_config;
use crate::config::KafkaConfig;
use crate::processor::event_processor;
use crate::trips::TripEngine;

/// Upper bound for applying a single message.
const HANDLER_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause after a receive error before polling again.
const ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Consumes the three event topics with a fixed group id and applies each
/// message through `engine` until `shutdown` fires.
///
/// Offsets are stored once the handler has returned, whatever its outcome,
/// so a poison message is never redelivered. Receive errors feed a circuit
/// breaker that pauses consumption after `max_retries` consecutive failures.
pub async fn run(
    config: &KafkaConfig,
    engine: Arc<TripEngine>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let topics = config.topics.all();
    info!(group_id = %config.group_id, ?topics, "Initializing Kafka consumer");

    let consumer: StreamConsumer = client_config(config)
        .set("group.id", &config.group_id)
        .set("auto.offset.reset", &config.auto_offset_reset)
        .set("partition.assignment.strategy", "roundrobin")
        .set("session.timeout.ms", "10000")
        .set("heartbeat.interval.ms", "3000")
        .set("enable.auto.commit", "true")
        .set("enable.auto.offset.store", "false")
        .create()?;

    consumer.subscribe(&topics)?;
    info!(?topics, "Subscribed to topics");

    let mut consecutive_failures = 0;
    let max_retries = config.max_retries;
    let cooldown = config.cooldown();

    loop {
        if consecutive_failures >= max_retries {
            warn!(
                consecutive_failures,
                cooldown_secs = cooldown.as_secs(),
                "Circuit breaker tripped, pausing consumption"
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(cooldown) => {}
            }
            consecutive_failures = 0;
            info!("Circuit breaker reset, resuming consumption");
        }

        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = consumer.recv() => received,
        };

        match received {
            Ok(message) => {
                consecutive_failures = 0;

                match message.payload() {
                    None => warn!(topic = message.topic(), "Received empty payload"),
                    Some(payload) => {
                        let handled = tokio::time::timeout(
                            HANDLER_TIMEOUT,
                            event_processor::process_event(
                                &engine,
                                &config.topics,
                                message.topic(),
                                payload,
                            ),
                        )
                        .await;
                        match handled {
                            Ok(Ok(())) => debug!(
                                topic = message.topic(),
                                partition = message.partition(),
                                offset = message.offset(),
                                "Message applied"
                            ),
                            Ok(Err(e)) => error!(
                                topic = message.topic(),
                                offset = message.offset(),
                                error = %e,
                                "Error processing message"
                            ),
                            Err(_) => warn!(
                                topic = message.topic(),
                                offset = message.offset(),
                                "Message handler timed out"
                            ),
                        }
                    }
                }

                if let Err(e) = consumer.store_offset_from_message(&message) {
                    warn!(error = %e, "Failed to store offset");
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                error!(
                    error = %e,
                    consecutive_failures,
                    max_retries,
                    "Kafka receive error"
                );
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    }

    consumer.unsubscribe();
    info!("Kafka consumer stopped");
    Ok(())
}
