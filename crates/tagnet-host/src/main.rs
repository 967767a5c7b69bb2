use tracing_subscriber::EnvFilter;

use tagnet_host::config::{LogConfig, TagnetConfig};
use tagnet_host::sim::run_simulation;

#[tokio::main]
async fn main() {
    let (config, skipped) = match TagnetConfig::load() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("tagnet-sim: {e}");
            std::process::exit(1);
        },
    };
    init_tracing(&config.log);
    for skip in &skipped {
        tracing::warn!(
            key = skip.key,
            value = %skip.value,
            reason = %skip.reason,
            "env override ignored"
        );
    }

    tracing::info!(
        players = config.sim.players.len(),
        expected = config.session.expected_peers,
        "tagnet simulation starting"
    );

    match run_simulation(&config).await {
        Ok(report) => {
            tracing::info!(
                all_confirmed = report.all_confirmed,
                contacts = report.contacts,
                ended_peers = report.ended_peers,
                "simulation finished"
            );
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!(error = %e, "failed to encode report"),
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "simulation failed");
            std::process::exit(1);
        },
    }
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(log: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    if log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
