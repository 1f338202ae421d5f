//! Digit Runner - last-digit pattern trading engine
//!
//! 1. Loads instance configuration (file + environment)
//! 2. Connects each instance to the venue and subscribes its symbols
//! 3. Runs detectors, staking and limits per instance
//! 4. Writes state snapshots and a decision journal

use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use digit_runner::{InstanceRunner, RunnerConfig};

const CONFIG_ENV: &str = "DIGIT_RUNNER_CONFIG";
const DEFAULT_CONFIG: &str = "digit-runner.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Digit Runner...");

    let path = config_path();
    let config = RunnerConfig::load(&path)
        .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
    info!(
        "Loaded {} instance(s) from {} ({:?} mode), state in {}",
        config.instances.len(),
        path.display(),
        config.trading_mode,
        config.state_dir().display()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::new();
    for instance in &config.instances {
        let span = info_span!("instance", name = %instance.name);
        let runner = match InstanceRunner::start(&config, instance)
            .instrument(span.clone())
            .await
        {
            Ok(runner) => runner,
            Err(e) => {
                error!("Instance {} failed to start: {}", instance.name, e);
                continue;
            }
        };
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(runner.run(rx).instrument(span)));
    }

    if handles.is_empty() {
        anyhow::bail!("No instance could be started");
    }

    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping instances");
            let _ = shutdown_tx.send(true);
        }
        // Keep the sender alive until the process exits
        std::future::pending::<()>().await;
    });

    for handle in handles {
        match handle.await {
            Ok(Ok(summary)) => info!(
                "{}: {:?}, {} trades, profit {}",
                summary.instance,
                summary.status,
                summary.profit.trade_count,
                summary.profit.cumulative_profit
            ),
            Ok(Err(e)) => error!("Instance error: {}", e),
            Err(e) => error!("Instance task panicked: {}", e),
        }
    }

    signal.abort();
    info!("All instances stopped");
    Ok(())
}

/// `--config PATH`, else `DIGIT_RUNNER_CONFIG`, else ./digit-runner.yaml
fn config_path() -> PathBuf {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        } else if let Some(path) = arg.strip_prefix("--config=") {
            return PathBuf::from(path);
        }
    }
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG))
}
