//! Event log plumbing: the publisher used after commits and the consumer
//! loop that replays events into the trip engine.

use rdkafka::config::ClientConfig;

use crate::config::KafkaConfig;

pub mod consumer;
pub mod producer;

pub use producer::{EventPublisher, KafkaEventProducer, RecordingPublisher};

/// Connection settings shared by the producer and the consumer.
/// SASL credentials are applied only when a username is configured.
pub fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("security.protocol", &config.security_protocol);

    if !config.username.is_empty() {
        client_config
            .set("sasl.mechanism", &config.sasl_mechanism)
            .set("sasl.username", &config.username)
            .set("sasl.password", &config.password);
    }

    client_config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Topics;

    fn kafka_config(username: &str) -> KafkaConfig {
        KafkaConfig {
            enabled: true,
            consumer_enabled: false,
            bootstrap_servers: "broker:9092".to_string(),
            group_id: "scooter-service".to_string(),
            auto_offset_reset: "latest".to_string(),
            security_protocol: "SASL_PLAINTEXT".to_string(),
            sasl_mechanism: "SCRAM-SHA-256".to_string(),
            username: username.to_string(),
            password: "pw".to_string(),
            topics: Topics::default(),
            max_retries: 5,
            circuit_breaker_cooldown: 300,
        }
    }

    #[test]
    fn test_sasl_only_with_username() {
        let anonymous = client_config(&kafka_config(""));
        assert_eq!(anonymous.get("bootstrap.servers"), Some("broker:9092"));
        assert_eq!(anonymous.get("sasl.username"), None);

        let authenticated = client_config(&kafka_config("svc"));
        assert_eq!(authenticated.get("sasl.username"), Some("svc"));
        assert_eq!(authenticated.get("sasl.mechanism"), Some("SCRAM-SHA-256"));
    }
}
