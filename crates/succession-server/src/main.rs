//! Main entry point for a Succession node.
//!
//! Starts the configured number of participants on an in-process ensemble and
//! reports leadership and worker membership until interrupted.

use succession_server::{Cluster, model::Configuration, startup};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;

    let _logging_guard = startup::init_logging(&configuration.logging_config())?;
    succession_server::metrics::init_metrics();

    let settings = configuration.cluster_settings();
    info!(
        "Starting succession node: participants={}, host={}, base_port={}, failover={:?}",
        settings.size, settings.host, settings.base_port, settings.failover_interval
    );

    let shutdown = startup::wait_for_shutdown_signal().await;
    let Some(cluster) = Cluster::start_with_shutdown(settings, &shutdown).await? else {
        info!("Succession node stopped before the cluster started");
        return Ok(());
    };
    cluster.report().await;

    cluster.run(&shutdown).await;
    cluster.stop().await;

    info!("Succession node stopped");
    Ok(())
}
