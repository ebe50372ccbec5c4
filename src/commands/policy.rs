use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Subcommand;
use serde_json::json;

use common::TableRef;
use common::catalog::{Catalog, SchemaWriter};
use common::ddl::DdlStatement;
use reconciler::policy::{self, encode, replace_in_comment};
use reconciler::{BoundaryStep, NamingPattern, PartitionPolicy, inventory};

use super::output::{self, Output};

#[derive(Subcommand, Debug)]
pub enum PolicyAction {
    /// Write a partitioning policy into a table comment
    Set {
        /// Table as <schema>.<table>
        table: TableRef,
        /// Partition name template, e.g. `p{n}` or `p{%Y%m%d}`
        #[arg(long, default_value = "p{n}")]
        pattern: NamingPattern,
        /// Boundary step: an integer or a calendar step such as `1d`, `1m@unix`
        #[arg(long)]
        step: BoundaryStep,
        /// Partitions kept ahead of current data
        #[arg(long, default_value_t = 2)]
        lead: u32,
        /// Newest partitions kept by retention
        #[arg(long)]
        keep: u32,
        /// Drop expired partitions with a single statement
        #[arg(long)]
        force_drop: bool,
        /// Print the table definition afterwards
        #[arg(short, long)]
        show: bool,
    },
    /// Decode a policy from comment text and report why it is rejected
    Check {
        /// Comment text containing a policy block
        text: String,
    },
}

impl PolicyAction {
    pub async fn run<C>(self, catalog: Arc<C>, output: &Output) -> anyhow::Result<()>
    where
        C: Catalog + SchemaWriter + 'static,
    {
        match self {
            PolicyAction::Set {
                table,
                pattern,
                step,
                lead,
                keep,
                force_drop,
                show,
            } => {
                let policy = PartitionPolicy::new(pattern, step, lead, keep, force_drop)
                    .context("Invalid partitioning policy")?;

                let state = inventory::load(&*catalog, &table)
                    .await
                    .with_context(|| format!("Failed to read {table}"))?;
                if !state.exists {
                    bail!("Table {table} does not exist");
                }

                let comment = replace_in_comment(&state.comment, &policy);
                let statement = DdlStatement::set_comment(table.clone(), comment.clone())?;
                catalog
                    .execute(&statement)
                    .await
                    .with_context(|| format!("Failed to update the comment of {table}"))?;
                tracing::info!(
                    table = %table,
                    policy = %encode(&policy),
                    "Partitioning policy updated"
                );

                output.emit(
                    &json!({ "table": table, "comment": comment, "policy": policy }),
                    || format!("{table}: {}", output::describe_policy(&policy)),
                )?;

                if show {
                    let definition = catalog
                        .show_create_table(&table)
                        .await?
                        .unwrap_or_default();
                    println!("{definition}");
                }
                Ok(())
            }
            PolicyAction::Check { text } => check(&text, output),
        }
    }
}

/// Decode `text` strictly and print the policy it carries.
pub fn check(text: &str, output: &Output) -> anyhow::Result<()> {
    let policy =
        policy::decode_strict(text).with_context(|| format!("Rejected policy in '{text}'"))?;
    output.emit(
        &json!({ "encoded": encode(&policy), "policy": policy }),
        || format!("{}: {}", encode(&policy), output::describe_policy(&policy)),
    )
}
