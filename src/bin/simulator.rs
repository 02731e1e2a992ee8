use scooter_trips::config::SimulatorConfig;
use scooter_trips::{shutdown, simulator, telemetry};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SimulatorConfig::load()?;
    telemetry::init(&config.log)?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown::wait_for_signal(cancel.clone()));

    let stats = simulator::run(config, cancel).await?;
    info!(
        started = stats.trips_started,
        completed = stats.trips_completed,
        "Simulation finished"
    );
    Ok(())
}
