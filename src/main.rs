use scooter_trips::config::AppConfig;
use scooter_trips::db::{self, PgStore};
use scooter_trips::fleet::FleetService;
use scooter_trips::http::{self, ApiKey, AppState};
use scooter_trips::kafka::{self, KafkaEventProducer};
use scooter_trips::store::UnitOfWork;
use scooter_trips::{shutdown, telemetry};
use scooter_trips::trips::TripEngine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    telemetry::init(&config.log)?;

    info!("Starting scooter trip service...");

    // Init DB
    let pool = db::init_pool(&config.database).await?;
    let pg = PgStore::new(pool);
    pg.health_check().await?;
    info!(
        host = %config.database.host,
        database = %config.database.name,
        "Connected to database"
    );
    let store: Arc<dyn UnitOfWork> = Arc::new(pg);

    let mut engine = TripEngine::new(store.clone());
    if config.kafka.enabled {
        let producer = KafkaEventProducer::new(&config.kafka)?;
        engine = engine.with_publisher(Arc::new(producer));
    } else {
        info!("Kafka disabled, events will not be published");
    }

    let cancel = CancellationToken::new();

    // The consumer replays events without publishing them again.
    let consumer = if config.kafka.consumer_enabled {
        let replay = Arc::new(TripEngine::new(store.clone()));
        let kafka_config = config.kafka.clone();
        let token = cancel.clone();
        Some(tokio::spawn(async move {
            kafka::consumer::run(&kafka_config, replay, token).await
        }))
    } else {
        None
    };

    let state = AppState {
        trips: engine,
        fleet: FleetService::new(store),
        api_key: ApiKey::new(&config.api_key),
    };
    let app = http::router(state);

    let addr = config.server.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait_for_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Some(handle) = consumer {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Kafka consumer failed"),
            Err(e) => error!(error = %e, "Kafka consumer task panicked"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}
