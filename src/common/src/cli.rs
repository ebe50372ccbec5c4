use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared by every command
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "RANGEKEEPER_DSN",
        hide_env_values = true,
        help = "Database DSN (overrides configuration)"
    )]
    pub dsn: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Subcommands that never touch the database
#[derive(Subcommand, Debug, Clone)]
pub enum CommonCommands {
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Initialize logging based on CLI arguments; `RUST_LOG` wins when set.
    pub fn init_logging(args: &CommonArgs) {
        let level = if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Load configuration with optional overrides from the CLI
    pub fn load_config(args: &CommonArgs) -> Result<Configuration> {
        let mut config = match &args.config {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")?
            }
            None => Configuration::load().context("Failed to load configuration")?,
        };

        if let Some(dsn) = &args.dsn {
            config.database.dsn = dsn.clone();
        }

        Ok(config)
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        let config = redacted(config);
        if json {
            let json = serde_json::to_string_pretty(&config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("rangekeeper configuration:");
            println!("==========================");
            println!("Database DSN: {}", config.database.dsn);
            println!("Max connections: {}", config.database.max_connections);
            println!(
                "Connection max lifetime: {}",
                humantime::format_duration(config.database.max_lifetime)
            );
            println!(
                "Daemon schema: {}",
                config.daemon.schema.as_deref().unwrap_or("(not set)")
            );
            println!(
                "Daemon refresh interval: {}",
                humantime::format_duration(config.daemon.refresh_interval)
            );
            println!("Daemon force drop: {}", config.daemon.force_drop);
            println!("Daemon dry run: {}", config.daemon.dry_run);
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");
        config.validate().context("Invalid configuration")?;
        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle commands that don't require a database connection
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<()> {
        match command {
            CommonCommands::Config { json } => display_config(config, *json),
            CommonCommands::Validate => {
                validate_config(config)?;
                println!("Configuration is valid");
                Ok(())
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(())
            }
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }

    /// Copy of `config` with the DSN password masked.
    pub fn redacted(config: &Configuration) -> Configuration {
        let mut config = config.clone();
        config.database.dsn = redact_dsn(&config.database.dsn);
        config
    }

    fn redact_dsn(dsn: &str) -> String {
        let Some((scheme, rest)) = dsn.split_once("://") else {
            return dsn.to_string();
        };
        let Some((credentials, host)) = rest.rsplit_once('@') else {
            return dsn.to_string();
        };
        match credentials.split_once(':') {
            Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
            None => dsn.to_string(),
        }
    }

}
