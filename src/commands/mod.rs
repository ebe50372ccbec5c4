pub mod daemon;
pub mod output;
pub mod partition;
pub mod policy;
pub mod show;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use common::catalog::MySqlCatalog;
use common::cli::{CommonArgs, CommonCommands, utils};
use common::config::Configuration;

use output::Output;

/// rangekeeper: keep range-partitioned MySQL tables in line with the
/// policies stored in their comments
#[derive(Parser)]
#[command(name = "rangekeeper", version, about)]
pub struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and change the partitions of one table
    #[command(visible_alias = "partition")]
    Prt {
        /// Print the partition inventory after a change
        #[arg(short, long, global = true)]
        show: bool,
        /// Output in JSON format
        #[arg(long, global = true)]
        json: bool,
        #[command(subcommand)]
        action: partition::PartitionAction,
    },
    /// List the tables of a schema
    #[command(visible_alias = "ls")]
    Show(show::ShowArgs),
    /// Manage partitioning policies in table comments
    Policy {
        /// Output in JSON format
        #[arg(long, global = true)]
        json: bool,
        #[command(subcommand)]
        action: policy::PolicyAction,
    },
    /// Reconcile every managed table of a schema on a schedule
    Daemon(daemon::DaemonArgs),
    #[command(flatten)]
    Common(CommonCommands),
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        utils::init_logging(&self.common);
        let config = utils::load_config(&self.common)?;

        match self.command {
            Commands::Prt { show, json, action } => {
                let catalog = connect(&config).await?;
                action.run(catalog, &Output::new(json), show).await
            }
            Commands::Show(args) => {
                let catalog = connect(&config).await?;
                args.run(&*catalog).await
            }
            Commands::Policy { json, action } => {
                let output = Output::new(json);
                match action {
                    policy::PolicyAction::Check { text } => policy::check(&text, &output),
                    action => {
                        let catalog = connect(&config).await?;
                        action.run(catalog, &output).await
                    }
                }
            }
            Commands::Daemon(args) => args.run(&config).await,
            Commands::Common(command) => utils::handle_common_command(&command, &config),
        }
    }
}

/// Open the connection pool described by `config`.
pub async fn connect(config: &Configuration) -> anyhow::Result<Arc<MySqlCatalog>> {
    let catalog = MySqlCatalog::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    Ok(Arc::new(catalog))
}
