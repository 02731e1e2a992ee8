//! Electric scooter rental back end: trip lifecycle engine, fleet queries,
//! PostgreSQL persistence, Kafka event pipeline and the JSON API.

pub mod config;
pub mod db;
pub mod error;
pub mod fleet;
pub mod geo;
pub mod http;
pub mod kafka;
pub mod models;
pub mod processor;
pub mod shutdown;
pub mod simulator;
pub mod store;
pub mod telemetry;
pub mod trips;
