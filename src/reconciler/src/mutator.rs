//! Turns plans into DDL and applies them.
//!
//! Additions for a table are folded into one `ADD PARTITION` statement and
//! run before any removal. When the addition fails the removals of that
//! table are not attempted. Statements are never retried here; the next
//! reconciliation pass recomputes the plan from scratch.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use common::TableRef;
use common::catalog::SchemaWriter;
use common::ddl::{DdlError, DdlStatement, Identifier, PartitionDefinition};

use crate::error::MutationError;
use crate::state::{DropMode, Plan, PlannedPartition};

/// Result of one statement.
#[derive(Debug)]
pub enum ChangeOutcome {
    Applied,
    /// Rendered but not executed
    DryRun,
    Failed(MutationError),
}

impl ChangeOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ChangeOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    AddPartitions,
    DropPartitions,
}

/// One statement and what happened to it.
#[derive(Debug)]
pub struct Change {
    pub kind: ChangeKind,
    /// Partitions the statement names
    pub partitions: Vec<String>,
    /// Rendered SQL, absent when the statement could not be built
    pub sql: Option<String>,
    pub outcome: ChangeOutcome,
}

/// Everything [`Mutator::apply`] did to one table.
#[derive(Debug)]
pub struct MutationReport {
    pub table: TableRef,
    pub changes: Vec<Change>,
    /// Removals were planned but not attempted because the addition failed
    pub removals_skipped: bool,
}

impl MutationReport {
    fn new(table: &TableRef) -> Self {
        Self {
            table: table.clone(),
            changes: Vec::new(),
            removals_skipped: false,
        }
    }

    fn count(&self, kind: ChangeKind) -> usize {
        self.changes
            .iter()
            .filter(|c| c.kind == kind && matches!(c.outcome, ChangeOutcome::Applied))
            .map(|c| c.partitions.len())
            .sum()
    }

    pub fn partitions_added(&self) -> usize {
        self.count(ChangeKind::AddPartitions)
    }

    pub fn partitions_dropped(&self) -> usize {
        self.count(ChangeKind::DropPartitions)
    }

    pub fn failures(&self) -> impl Iterator<Item = &MutationError> {
        self.changes.iter().filter_map(|c| match &c.outcome {
            ChangeOutcome::Failed(e) => Some(e),
            _ => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.changes.iter().any(|c| c.outcome.is_failure())
    }
}

/// Applies plans through a [`SchemaWriter`].
#[derive(Clone)]
pub struct Mutator {
    writer: Arc<dyn SchemaWriter>,
    dry_run: bool,
}

impl Mutator {
    pub fn new(writer: Arc<dyn SchemaWriter>) -> Self {
        Self {
            writer,
            dry_run: false,
        }
    }

    /// Log statements instead of executing them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Apply `plan` to `table`: additions first, then removals.
    pub async fn apply(&self, table: &TableRef, plan: &Plan) -> MutationReport {
        let mut report = MutationReport::new(table);

        if !plan.additions.is_empty() {
            let change = self.add_partitions(table, &plan.additions).await;
            let failed = change.outcome.is_failure();
            report.changes.push(change);

            if failed {
                if !plan.removals.is_empty() {
                    warn!(
                        table = %table,
                        partitions = plan.removals.names.len(),
                        "Skipping partition drops after failed addition"
                    );
                    report.removals_skipped = true;
                }
                return report;
            }
        }

        if !plan.removals.is_empty() {
            report.changes.extend(
                self.drop_partitions(table, &plan.removals.names, plan.removals.mode)
                    .await,
            );
        }

        report
    }

    /// Add `partitions` with a single statement.
    pub async fn add_partitions(
        &self,
        table: &TableRef,
        partitions: &[PlannedPartition],
    ) -> Change {
        let names = partitions.iter().map(|p| p.name.to_string()).collect();
        let definitions = partitions
            .iter()
            .map(|p| PartitionDefinition::new(p.name.clone(), p.boundary))
            .collect();

        let statement = DdlStatement::add_partitions(table.clone(), definitions);
        self.run(table, ChangeKind::AddPartitions, names, statement)
            .await
    }

    /// Drop `partitions` with one statement, or one statement each.
    pub async fn drop_partitions(
        &self,
        table: &TableRef,
        partitions: &[Identifier],
        mode: DropMode,
    ) -> Vec<Change> {
        match mode {
            DropMode::Combined => {
                let names = partitions.iter().map(Identifier::to_string).collect();
                let statement = DdlStatement::drop_partitions(table.clone(), partitions.to_vec());
                vec![
                    self.run(table, ChangeKind::DropPartitions, names, statement)
                        .await,
                ]
            }
            DropMode::Individual => {
                let mut changes = Vec::with_capacity(partitions.len());
                for partition in partitions {
                    let statement =
                        DdlStatement::drop_partitions(table.clone(), vec![partition.clone()]);
                    changes.push(
                        self.run(
                            table,
                            ChangeKind::DropPartitions,
                            vec![partition.to_string()],
                            statement,
                        )
                        .await,
                    );
                }
                changes
            }
        }
    }

    async fn run(
        &self,
        table: &TableRef,
        kind: ChangeKind,
        partitions: Vec<String>,
        statement: Result<DdlStatement, DdlError>,
    ) -> Change {
        let statement = match statement {
            Ok(statement) => statement,
            Err(source) => {
                warn!(table = %table, error = %source, "Refusing to build statement");
                return Change {
                    kind,
                    partitions,
                    sql: None,
                    outcome: ChangeOutcome::Failed(MutationError::Statement {
                        table: table.to_string(),
                        source,
                    }),
                };
            }
        };

        let sql = statement.to_sql();
        if self.dry_run {
            info!(table = %table, sql = %sql, "[DRY RUN] Would execute statement");
            return Change {
                kind,
                partitions,
                sql: Some(sql),
                outcome: ChangeOutcome::DryRun,
            };
        }

        let outcome = match self.writer.execute(&statement).await {
            Ok(()) => {
                info!(
                    table = %table,
                    kind = statement.kind(),
                    partitions = ?partitions,
                    "Statement applied"
                );
                ChangeOutcome::Applied
            }
            Err(source) => {
                warn!(table = %table, sql = %sql, error = %source, "Statement failed");
                ChangeOutcome::Failed(MutationError::Execution {
                    table: table.to_string(),
                    sql: sql.clone(),
                    source,
                })
            }
        };

        Change {
            kind,
            partitions,
            sql: Some(sql),
            outcome,
        }
    }
}
