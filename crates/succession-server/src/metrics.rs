// Metrics module for observability
// Describes the counters and gauges recorded by the election and registry crates

use metrics::{describe_counter, describe_gauge, gauge};

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    // Election metrics
    describe_counter!(
        "succession_elections_total",
        "Total number of completed election rounds, labelled by outcome"
    );
    describe_counter!(
        "succession_predecessor_races_total",
        "Total number of predecessors that vanished before a watch could be armed"
    );

    // Registry metrics
    describe_counter!(
        "succession_registry_rescans_total",
        "Total number of registry rescans"
    );
    describe_gauge!(
        "succession_registry_addresses",
        "Number of addresses in the latest registry view"
    );

    // Cluster metrics
    describe_gauge!(
        "succession_cluster_participants",
        "Number of participants whose session is still connected"
    );

    tracing::info!("Metrics initialized");
}

/// Update the connected participant count
pub fn set_cluster_participants(count: usize) {
    gauge!("succession_cluster_participants").set(count as f64);
}
