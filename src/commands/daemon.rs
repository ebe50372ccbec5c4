use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use common::config::{Configuration, DaemonConfig};
use reconciler::{Reconciler, ReconcilerConfig};

#[derive(Args, Debug, Default)]
pub struct DaemonArgs {
    /// Schema to reconcile (overrides daemon.schema)
    pub schema: Option<String>,
    /// Pause between passes, e.g. `30s`, `5m` (overrides daemon.refresh_interval)
    #[arg(short, long, value_parser = humantime::parse_duration)]
    pub refresh: Option<Duration>,
    /// Drop every expired partition of a table with a single statement
    #[arg(short, long)]
    pub force_drop: bool,
    /// Log the statements each pass would run without running them
    #[arg(long)]
    pub dry_run: bool,
}

impl DaemonArgs {
    /// Daemon settings from configuration with command line overrides.
    pub fn merge(&self, config: &DaemonConfig) -> DaemonConfig {
        DaemonConfig {
            schema: self.schema.clone().or_else(|| config.schema.clone()),
            refresh_interval: self.refresh.unwrap_or(config.refresh_interval),
            force_drop: self.force_drop || config.force_drop,
            dry_run: self.dry_run || config.dry_run,
        }
    }

    pub async fn run(self, config: &Configuration) -> Result<()> {
        let settings = ReconcilerConfig::from_daemon_config(&self.merge(&config.daemon))
            .context("Invalid daemon configuration")?;

        let catalog = super::connect(config).await?;
        let reconciler = Reconciler::new(catalog.clone(), catalog, settings)?;

        reconciler
            .run(async {
                if let Err(e) = wait_for_shutdown_signal().await {
                    log::error!("Failed to wait for shutdown signal: {e:#}");
                    std::future::pending::<()>().await;
                }
            })
            .await;

        reconciler.metrics().summary().log();
        log::info!("Partition reconciler stopped");
        Ok(())
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        log::info!("Received Ctrl+C");
    }

    Ok(())
}
