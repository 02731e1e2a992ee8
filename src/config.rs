use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::models::EventType;

/// Everything the server process needs, read once at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub server: ServerConfig,
    pub database: DbConfig,
    pub kafka: KafkaConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub sslmode: String,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.name, self.sslmode
        )
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("sslmode", &self.sslmode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Topic names for each event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub trip_started: String,
    pub trip_ended: String,
    pub location_updated: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            trip_started: "trip-started".to_string(),
            trip_ended: "trip-ended".to_string(),
            location_updated: "location-updated".to_string(),
        }
    }
}

impl Topics {
    pub fn for_event(&self, event_type: EventType) -> &str {
        match event_type {
            EventType::TripStarted => &self.trip_started,
            EventType::TripEnded => &self.trip_ended,
            EventType::LocationUpdated => &self.location_updated,
        }
    }

    pub fn event_for(&self, topic: &str) -> Option<EventType> {
        [
            EventType::TripStarted,
            EventType::TripEnded,
            EventType::LocationUpdated,
        ]
        .into_iter()
        .find(|event_type| self.for_event(*event_type) == topic)
    }

    pub fn all(&self) -> [&str; 3] {
        [
            self.trip_started.as_str(),
            self.trip_ended.as_str(),
            self.location_updated.as_str(),
        ]
    }
}

#[derive(Clone)]
pub struct KafkaConfig {
    pub enabled: bool,
    pub consumer_enabled: bool,
    pub bootstrap_servers: String,
    pub group_id: String,
    pub auto_offset_reset: String,
    pub security_protocol: String,
    pub sasl_mechanism: String,
    pub username: String,
    pub password: String,
    pub topics: Topics,
    pub max_retries: u32,
    pub circuit_breaker_cooldown: u64,
}

impl KafkaConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_cooldown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected text or json, got {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone)]
pub struct SimulatorConfig {
    pub scooters: usize,
    pub users: usize,
    pub server_url: String,
    pub api_key: String,
    pub speed_kmh: f64,
    pub trip_duration_min: u64,
    pub trip_duration_max: u64,
    pub rest_min: u64,
    pub rest_max: u64,
    pub log: LogConfig,
}

/// Environment lookup; the process environment in production, a map in tests.
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str, default: &str) -> String {
        (self.lookup)(key).unwrap_or_else(|| default.to_string())
    }

    /// Present but unparsable values are errors, not silent defaults.
    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match (self.lookup)(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| anyhow!("invalid value {raw:?} for {key}: {e}")),
        }
    }

    fn log(&self) -> Result<LogConfig> {
        Ok(LogConfig {
            level: self.string("LOG_LEVEL", "info"),
            format: self.parse("LOG_FORMAT", LogFormat::Text)?,
        })
    }
}

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup };

        let api_key = (vars.lookup)("API_KEY")
            .filter(|key| !key.trim().is_empty())
            .context("API_KEY must be set")?;

        let server = ServerConfig {
            host: vars.string("SERVER_HOST", "0.0.0.0"),
            port: vars.parse("SERVER_PORT", 8080)?,
        };

        let database = DbConfig {
            host: vars.string("DB_HOST", "localhost"),
            port: vars.parse("DB_PORT", 5432)?,
            name: vars.string("DB_NAME", "scooters"),
            user: vars.string("DB_USER", "postgres"),
            password: vars.string("DB_PASSWORD", "postgres"),
            sslmode: vars.string("DB_SSLMODE", "disable"),
            max_connections: vars.parse("DB_MAX_CONNECTIONS", 50)?,
        };

        let kafka = KafkaConfig {
            enabled: vars.parse("KAFKA_ENABLED", true)?,
            consumer_enabled: vars.parse("KAFKA_CONSUMER_ENABLED", false)?,
            bootstrap_servers: vars.string("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092"),
            group_id: vars.string("KAFKA_GROUP_ID", "scooter-service"),
            auto_offset_reset: vars.string("KAFKA_AUTO_OFFSET_RESET", "latest"),
            security_protocol: vars.string("KAFKA_SECURITY_PROTOCOL", "PLAINTEXT"),
            sasl_mechanism: vars.string("KAFKA_SASL_MECHANISM", "SCRAM-SHA-256"),
            username: vars.string("KAFKA_USERNAME", ""),
            password: vars.string("KAFKA_PASSWORD", ""),
            topics: Topics {
                trip_started: vars.string("KAFKA_TOPIC_TRIP_STARTED", "trip-started"),
                trip_ended: vars.string("KAFKA_TOPIC_TRIP_ENDED", "trip-ended"),
                location_updated: vars
                    .string("KAFKA_TOPIC_LOCATION_UPDATED", "location-updated"),
            },
            max_retries: vars.parse("KAFKA_MAX_RETRIES", 5)?,
            circuit_breaker_cooldown: vars.parse("KAFKA_CIRCUIT_BREAKER_COOLDOWN", 300)?,
        };

        Ok(Self {
            api_key,
            server,
            database,
            kafka,
            log: vars.log()?,
        })
    }
}

impl SimulatorConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars { lookup };

        let config = Self {
            scooters: vars.parse("SIMULATOR_SCOOTERS", 10)?,
            users: vars.parse("SIMULATOR_USERS", 5)?,
            server_url: vars
                .string("SIMULATOR_SERVER_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            api_key: vars.string("API_KEY", ""),
            speed_kmh: vars.parse("SIMULATOR_SPEED", 15.0)?,
            trip_duration_min: vars.parse("SIMULATOR_TRIP_DURATION_MIN", 10)?,
            trip_duration_max: vars.parse("SIMULATOR_TRIP_DURATION_MAX", 30)?,
            rest_min: vars.parse("SIMULATOR_REST_MIN", 2)?,
            rest_max: vars.parse("SIMULATOR_REST_MAX", 10)?,
            log: vars.log()?,
        };

        if config.trip_duration_min > config.trip_duration_max {
            return Err(anyhow!(
                "SIMULATOR_TRIP_DURATION_MIN must not exceed SIMULATOR_TRIP_DURATION_MAX"
            ));
        }
        if config.rest_min > config.rest_max {
            return Err(anyhow!("SIMULATOR_REST_MIN must not exceed SIMULATOR_REST_MAX"));
        }
        if !(config.speed_kmh.is_finite() && config.speed_kmh > 0.0) {
            return Err(anyhow!("SIMULATOR_SPEED must be a positive number"));
        }
        Ok(config)
    }
}
