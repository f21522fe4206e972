mod check;
mod config;
mod metrics;
mod scheduler;

use check::Check;
use config::ConfigManager;
use metrics::{inc_failure, initialize_metrics, observe_result, FailureKind};
use scheduler::Scheduler;

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    // Load config first to get log level
    let config_mgr = Arc::new(ConfigManager::start().await?);
    let (log_level, enable_latency_history, probe_interval_ms, metrics_port) = {
        let cfg = config_mgr.config.read().await;
        (
            cfg.get_tracing_level()?,
            cfg.enable_latency_history,
            cfg.probe_interval_ms,
            cfg.metrics_port,
        )
    };

    println!("Starting fast-remote-check");

    initialize_metrics(enable_latency_history);

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
                         .add_directive(format!("fast_remote_check={}", log_level.as_str().to_lowercase()).parse()?))
        .init();

    let metrics_addr = ([0, 0, 0, 0], metrics_port).into();
    tokio::spawn(metrics::serve_metrics(metrics_addr));

    // Interval and metrics port are read once; targets follow config reloads
    let scheduler = Scheduler::new(probe_interval_ms)?;

    scheduler.run(move || {
        let config_mgr = config_mgr.clone();
        async move {
            let snapshot = { config_mgr.config.read().await.clone() };
            for t in snapshot.targets.iter() {
                match t.to_check(&snapshot) {
                    Ok(check) => {
                        tokio::spawn(run_check(t.name.clone(), check));
                    }
                    Err(e) => error!("target {} skipped: {:?}", t.name, e),
                }
            }
        }
    }).await?;

    Ok(())
}

/// Probes block on their socket, so each one gets a blocking thread.
async fn run_check(name: String, check: Check) {
    let kind = check.kind();
    let start = Instant::now();
    let result = tokio::task::spawn_blocking(move || check.run()).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(Ok(reachable)) => {
            info!(target_name = %name, check = %kind, reachable, elapsed_ms, "check finished");
            observe_result(&name, kind.as_str(), reachable, elapsed_ms);
        }
        Ok(Err(e)) => {
            let failure = if e.is_timeout() { FailureKind::Timeout } else { FailureKind::System };
            warn!(target_name = %name, check = %kind, "check failed: {}", e);
            inc_failure(&name, kind.as_str(), failure);
        }
        Err(e) => error!(target_name = %name, check = %kind, "check task aborted: {:?}", e),
    }
}
