use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use chrono::Utc;
use clap::Subcommand;
use serde_json::json;

use common::TableRef;
use common::catalog::{Catalog, SchemaWriter};
use common::ddl::Identifier;
use reconciler::{
    BoundaryValue, ChangeOutcome, DropMode, Mutator, PlannedPartition, TableState, inventory,
    plan_batch, plan_next, plan_table,
};

use super::output::{self, Output};

/// How many partitions `prt add` appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddTarget {
    /// The single partition following the current top
    Next,
    /// `+N`: N partitions in one statement
    Count(usize),
}

impl FromStr for AddTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "next" {
            return Ok(AddTarget::Next);
        }
        let Some(count) = s.strip_prefix('+') else {
            return Err(format!("expected 'next' or '+N', got '{s}'"));
        };
        if count.is_empty() {
            return Err("missing partition count after '+'".to_string());
        }
        match count.parse::<usize>() {
            Ok(0) => Err("partition count must be at least 1".to_string()),
            Ok(n) => Ok(AddTarget::Count(n)),
            Err(_) => Err(format!("invalid partition count '{count}'")),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum PartitionAction {
    /// Show the partitions and policy of a table
    #[command(visible_aliases = ["st", "info"])]
    Status {
        /// Table as <schema>.<table>
        table: TableRef,
    },
    /// Add partitions following the table's policy, or one explicit partition
    Add {
        /// Table as <schema>.<table>
        table: TableRef,
        /// `next` or `+N`
        #[arg(default_value = "next", conflicts_with_all = ["name", "less_than"])]
        target: AddTarget,
        /// Explicit partition name
        #[arg(long, requires = "less_than")]
        name: Option<Identifier>,
        /// Explicit upper bound
        #[arg(long, requires = "name", allow_negative_numbers = true)]
        less_than: Option<i64>,
    },
    /// Drop partitions with one statement
    #[command(visible_alias = "rm")]
    Drop {
        /// Table as <schema>.<table>
        table: TableRef,
        /// Partition names
        #[arg(required = true)]
        partitions: Vec<Identifier>,
    },
    /// Show what a reconciliation pass would change, without changing it
    Plan {
        /// Table as <schema>.<table>
        table: TableRef,
        /// Plan removals as a single statement
        #[arg(short, long)]
        force_drop: bool,
    },
}

impl PartitionAction {
    pub async fn run<C>(self, catalog: Arc<C>, output: &Output, show: bool) -> anyhow::Result<()>
    where
        C: Catalog + SchemaWriter + 'static,
    {
        let table = match &self {
            PartitionAction::Status { table }
            | PartitionAction::Add { table, .. }
            | PartitionAction::Drop { table, .. }
            | PartitionAction::Plan { table, .. } => table.clone(),
        };

        match self {
            PartitionAction::Status { .. } => {
                let state = load_existing(&*catalog, &table).await?;
                return output.emit(&state, || output::inventory_text(&state));
            }
            PartitionAction::Add {
                target,
                name,
                less_than,
                ..
            } => {
                let state = load_partitioned(&*catalog, &table).await?;
                let additions = match (name, less_than) {
                    (Some(name), Some(less_than)) => explicit_addition(&state, name, less_than)?,
                    _ => policy_additions(&state, target)?,
                };
                if additions.is_empty() {
                    bail!("No partitions to add to {table}");
                }

                let change = Mutator::new(catalog.clone())
                    .add_partitions(&table, &additions)
                    .await;
                if let ChangeOutcome::Failed(e) = change.outcome {
                    return Err(e.into());
                }
                output.emit(
                    &json!({ "table": table, "added": &additions }),
                    || format!("Added {} to {table}", change.partitions.join(", ")),
                )?;
            }
            PartitionAction::Drop { partitions, .. } => {
                load_partitioned(&*catalog, &table).await?;

                let mut changes = Mutator::new(catalog.clone())
                    .drop_partitions(&table, &partitions, DropMode::Combined)
                    .await;
                if let Some(change) = changes.pop() {
                    if let ChangeOutcome::Failed(e) = change.outcome {
                        return Err(e.into());
                    }
                }
                output.emit(
                    &json!({ "table": table, "dropped": &partitions }),
                    || {
                        let names: Vec<_> = partitions.iter().map(Identifier::as_str).collect();
                        format!("Dropped {} from {table}", names.join(", "))
                    },
                )?;
            }
            PartitionAction::Plan { force_drop, .. } => {
                let state = load_partitioned(&*catalog, &table).await?;
                if state.policy.is_none() {
                    bail!("Table {table} has no partitioning policy");
                }

                let plan = plan_table(&state, Utc::now(), force_drop)?;
                let preview = Mutator::new(catalog.clone())
                    .with_dry_run(true)
                    .apply(&table, &plan)
                    .await;
                let statements: Vec<String> =
                    preview.changes.into_iter().filter_map(|c| c.sql).collect();

                return output.emit(
                    &json!({ "table": table, "plan": &plan, "statements": &statements }),
                    || output::plan_text(&state, &plan, &statements),
                );
            }
        }

        if show {
            let state = inventory::load(&*catalog, &table).await?;
            output.emit(&state, || output::inventory_text(&state))?;
        }
        Ok(())
    }
}

async fn load_existing(catalog: &dyn Catalog, table: &TableRef) -> anyhow::Result<TableState> {
    let state = inventory::load(catalog, table)
        .await
        .with_context(|| format!("Failed to read partitions of {table}"))?;
    if !state.exists {
        bail!("Table {table} does not exist");
    }
    Ok(state)
}

async fn load_partitioned(catalog: &dyn Catalog, table: &TableRef) -> anyhow::Result<TableState> {
    let state = load_existing(catalog, table).await?;
    if !state.partitioned {
        bail!("Table {table} is not partitioned");
    }
    Ok(state)
}

fn explicit_addition(
    state: &TableState,
    name: Identifier,
    less_than: i64,
) -> anyhow::Result<Vec<PlannedPartition>> {
    if state.contains(name.as_str()) {
        bail!("Partition {name} already exists in {}", state.table);
    }
    if let Some(max) = state.max_boundary() {
        if BoundaryValue::Value(less_than) <= max {
            bail!("Boundary {less_than} must be above the current maximum {max}");
        }
    }
    Ok(vec![PlannedPartition {
        name,
        boundary: less_than,
    }])
}

fn policy_additions(
    state: &TableState,
    target: AddTarget,
) -> anyhow::Result<Vec<PlannedPartition>> {
    if state.policy.is_none() {
        return Err(anyhow!(
            "Table {} has no partitioning policy: pass --name and --less-than, or set one with `policy set`",
            state.table
        ));
    }
    if state.has_maxvalue_partition() {
        bail!(
            "Table {} ends with a MAXVALUE partition, new partitions cannot be appended",
            state.table
        );
    }

    let now = Utc::now();
    let additions = match target {
        AddTarget::Next => plan_next(state, now)?,
        AddTarget::Count(count) => plan_batch(state, count, now)?,
    };
    Ok(additions)
}
