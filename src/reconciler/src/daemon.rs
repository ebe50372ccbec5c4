//! The reconciliation loop.
//!
//! One pass lists the partitioned tables of a schema whose comment carries a
//! policy and, one table at a time, loads the inventory, plans and applies
//! the changes. A failure on one table is logged and the pass moves on.
//! Passes are separated by the refresh interval, measured from the end of
//! one pass to the start of the next.
//!
//! ```text
//! Idle -> Scanning -> (Loading -> Planning -> Mutating)* -> Idle
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use common::TableRef;
use common::catalog::{Catalog, CatalogError, SchemaWriter, TableFilter};
use common::config::{ConfigurationError, DaemonConfig, MIN_REFRESH_INTERVAL};
use common::ddl::Identifier;

use crate::error::ReconcileError;
use crate::inventory;
use crate::metrics::ReconcileMetrics;
use crate::mutator::{MutationReport, Mutator};
use crate::planner;
use crate::policy::MARKER;

/// Validated settings of a [`Reconciler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub schema: Identifier,
    pub refresh_interval: Duration,
    /// Combine drops regardless of the per-table policy
    pub force_drop: bool,
    pub dry_run: bool,
}

impl ReconcilerConfig {
    pub fn new(schema: Identifier, refresh_interval: Duration) -> Result<Self, ConfigurationError> {
        let config = Self {
            schema,
            refresh_interval,
            force_drop: false,
            dry_run: false,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_daemon_config(daemon: &DaemonConfig) -> Result<Self, ConfigurationError> {
        daemon.validate()?;
        let schema = daemon
            .schema
            .as_deref()
            .ok_or(ConfigurationError::MissingSchema)?;

        Ok(Self {
            schema: Identifier::new(schema)?,
            refresh_interval: daemon.refresh_interval,
            force_drop: daemon.force_drop,
            dry_run: daemon.dry_run,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.refresh_interval < MIN_REFRESH_INTERVAL {
            return Err(ConfigurationError::RefreshIntervalTooShort {
                interval: self.refresh_interval,
                minimum: MIN_REFRESH_INTERVAL,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    Scanning,
    Loading,
    Planning,
    Mutating,
}

/// Why a listed table was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Dropped between listing and loading
    Missing,
    NotPartitioned,
    /// The marker is present but the policy does not decode
    InvalidPolicy,
}

#[derive(Debug)]
pub enum TableOutcome {
    Skipped(SkipReason),
    /// Nothing to add or drop
    InSync,
    Applied(MutationReport),
    Failed(ReconcileError),
}

#[derive(Debug)]
pub struct TableReport {
    pub table: TableRef,
    pub outcome: TableOutcome,
}

impl TableReport {
    pub fn is_failure(&self) -> bool {
        match &self.outcome {
            TableOutcome::Failed(_) => true,
            TableOutcome::Applied(report) => report.has_failures(),
            _ => false,
        }
    }
}

/// Result of one pass over the schema.
#[derive(Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub tables: Vec<TableReport>,
    /// Set when the tables could not be listed
    pub scan_error: Option<CatalogError>,
}

impl CycleReport {
    pub fn failed_tables(&self) -> usize {
        self.tables.iter().filter(|t| t.is_failure()).count()
    }

    fn mutations(&self) -> impl Iterator<Item = &MutationReport> {
        self.tables.iter().filter_map(|t| match &t.outcome {
            TableOutcome::Applied(report) => Some(report),
            _ => None,
        })
    }

    pub fn partitions_added(&self) -> usize {
        self.mutations().map(MutationReport::partitions_added).sum()
    }

    pub fn partitions_dropped(&self) -> usize {
        self.mutations()
            .map(MutationReport::partitions_dropped)
            .sum()
    }

    pub fn duration_ms(&self) -> u64 {
        u64::try_from((self.completed_at - self.started_at).num_milliseconds())
            .unwrap_or(0)
    }
}

/// Keeps every policy-carrying table of one schema in line with its policy.
pub struct Reconciler {
    catalog: Arc<dyn Catalog>,
    mutator: Mutator,
    config: ReconcilerConfig,
    metrics: ReconcileMetrics,
    state: watch::Sender<ReconcilerState>,
    clock: fn() -> DateTime<Utc>,
}

impl Reconciler {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        writer: Arc<dyn SchemaWriter>,
        config: ReconcilerConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let (state, _) = watch::channel(ReconcilerState::Idle);

        Ok(Self {
            catalog,
            mutator: Mutator::new(writer).with_dry_run(config.dry_run),
            config,
            metrics: ReconcileMetrics::new(),
            state,
            clock: Utc::now,
        })
    }

    /// Replace the wall clock used for calendar planning.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ReconcileMetrics {
        &self.metrics
    }

    pub fn state(&self) -> ReconcilerState {
        *self.state.borrow()
    }

    /// Follow state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ReconcilerState> {
        self.state.subscribe()
    }

    fn transition(&self, next: ReconcilerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "Reconciler state changed");
        }
    }

    /// Run passes until `shutdown` resolves. A pass in progress is always
    /// finished; shutdown is observed while waiting for the next one.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);

        info!(
            schema = %self.config.schema,
            refresh_interval = %humantime::format_duration(self.config.refresh_interval),
            force_drop = self.config.force_drop,
            dry_run = self.config.dry_run,
            "Starting partition reconciler"
        );

        loop {
            self.run_cycle().await;
            self.metrics.summary().log();

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping partition reconciler");
                    break;
                }
                _ = tokio::time::sleep(self.config.refresh_interval) => {}
            }
        }

        self.transition(ReconcilerState::Idle);
    }

    /// One pass over the schema.
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();
        self.transition(ReconcilerState::Scanning);

        let filter = TableFilter::CommentContains(MARKER.to_string());
        let mut report = CycleReport {
            started_at,
            completed_at: started_at,
            tables: Vec::new(),
            scan_error: None,
        };

        match self.catalog.list_tables(&self.config.schema, &filter).await {
            Ok(tables) => {
                for summary in tables.into_iter().filter(|t| t.partitioned) {
                    let name = match Identifier::new(summary.name.as_str()) {
                        Ok(name) => name,
                        Err(e) => {
                            warn!(
                                table = %summary.name,
                                error = %e,
                                "Skipping table with an unsupported name"
                            );
                            continue;
                        }
                    };
                    let table = TableRef::new(self.config.schema.clone(), name);
                    let outcome = self.reconcile_table(&table).await;
                    report.tables.push(TableReport { table, outcome });
                }
            }
            Err(e) => {
                error!(schema = %self.config.schema, error = %e, "Failed to list tables");
                report.scan_error = Some(e);
            }
        }

        self.transition(ReconcilerState::Idle);
        report.completed_at = Utc::now();
        self.metrics.record_cycle(&report);

        info!(
            schema = %self.config.schema,
            tables_processed = report.tables.len(),
            tables_failed = report.failed_tables(),
            partitions_added = report.partitions_added(),
            partitions_dropped = report.partitions_dropped(),
            duration_ms = report.duration_ms(),
            "Reconciliation pass completed"
        );

        report
    }

    /// Load, plan and apply one table. Never fails the pass.
    pub async fn reconcile_table(&self, table: &TableRef) -> TableOutcome {
        match self.try_reconcile_table(table).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    table = %table,
                    error = %e,
                    "Table reconciliation failed. Continuing with other tables"
                );
                TableOutcome::Failed(e)
            }
        }
    }

    async fn try_reconcile_table(&self, table: &TableRef) -> Result<TableOutcome, ReconcileError> {
        self.transition(ReconcilerState::Loading);
        let state = inventory::load(self.catalog.as_ref(), table).await?;

        if !state.exists {
            return Ok(TableOutcome::Skipped(SkipReason::Missing));
        }
        if !state.partitioned {
            return Ok(TableOutcome::Skipped(SkipReason::NotPartitioned));
        }
        if state.policy.is_none() {
            warn!(
                table = %table,
                comment = %state.comment,
                "Ignoring table with an invalid partitioning policy"
            );
            return Ok(TableOutcome::Skipped(SkipReason::InvalidPolicy));
        }

        self.transition(ReconcilerState::Planning);
        if state.has_maxvalue_partition() {
            warn!(table = %table, "MAXVALUE partition present, no partitions will be added");
        }
        let plan = planner::plan_table(&state, (self.clock)(), self.config.force_drop)?;
        if plan.is_empty() {
            debug!(table = %table, "Partitions match policy");
            return Ok(TableOutcome::InSync);
        }

        info!(
            table = %table,
            additions = plan.additions.len(),
            removals = plan.removals.names.len(),
            drop_mode = ?plan.removals.mode,
            "Applying partition plan"
        );

        self.transition(ReconcilerState::Mutating);
        Ok(TableOutcome::Applied(self.mutator.apply(table, &plan).await))
    }
}
