//! Sampler Service (`samplersrv`)
//!
//! Loads devices and calculation elements from configuration and refreshes
//! them once per wall-clock second until SIGINT/SIGTERM.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use common::bootstrap_args::ServiceArgs;
use common::logging::{self, LogConfig};
use errors::{VoltageError, VoltageResult};
use samplersrv::{ArchiveSink, Sampler, ServiceConfig, TracingArchive, SERVICE_NAME};

/// Ticks between two statistics lines
const STATS_EVERY_TICKS: u64 = 60;

#[tokio::main]
async fn main() -> VoltageResult<()> {
    let args = ServiceArgs::parse();
    let config = ServiceConfig::load(args.config.as_deref())?;

    logging::init_with_config(LogConfig {
        service_name: SERVICE_NAME.to_string(),
        level: args.effective_log_level(&config.logging.level),
        log_dir: config.logging.log_dir(),
        enable_json: config.logging.json,
        ansi: !args.no_color,
    })
    .map_err(|e| VoltageError::StartupFailed(e.to_string()))?;

    info!(
        "Starting {} v{}",
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION")
    );
    config.log_summary();

    config.validate()?;
    if args.validate {
        info!("Validation completed successfully");
        return Ok(());
    }

    let archive: Arc<dyn ArchiveSink> = Arc::new(TracingArchive);
    let sampler = Sampler::new(config.sampler.clone());
    for device in config.build_devices(None, Some(archive))? {
        sampler.add_device(device);
    }

    let shutdown_token = common::shutdown::shutdown_token();

    // Tick outcome monitor
    let mut events = sampler.subscribe();
    let monitor_token = shutdown_token.clone();
    let monitor = tokio::spawn(async move {
        let mut ticks: u64 = 0;
        let mut failed_ticks: u64 = 0;
        loop {
            tokio::select! {
                () = monitor_token.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        ticks += 1;
                        if !event.is_clean() {
                            failed_ticks += 1;
                        }
                        debug!(tick = %event.tick, failures = event.failures.len(), "OnTick");
                        if ticks % STATS_EVERY_TICKS == 0 {
                            info!(ticks, failed_ticks, last_tick = %event.tick, "Sampler stats");
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Tick monitor lagged, {} events skipped", skipped);
                    },
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("Tick monitor terminated");
    });

    sampler.start();
    info!(
        devices = sampler.device_count(),
        "{} running, press Ctrl+C to stop", SERVICE_NAME
    );

    shutdown_token.cancelled().await;
    info!("Shutdown signal received, stopping sampler");

    sampler.shutdown().await;
    if let Err(e) = monitor.await {
        warn!("Tick monitor task failed: {}", e);
    }

    info!("{} stopped", SERVICE_NAME);
    Ok(())
}
