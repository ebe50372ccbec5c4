//! Partition lifecycle reconciliation for range-partitioned MySQL tables.
//!
//! Each table carries a compact partitioning policy in its comment. A
//! reconciliation pass reads the live partition inventory, plans the
//! partitions to append ahead of current data and the old partitions to
//! retire, and applies those changes as DDL. Plans are recomputed from the
//! catalog on every pass; the engine keeps no state of its own.
//!
//! - `policy`: the policy model and its textual codec
//! - `inventory`: catalog snapshot to [`TableState`]
//! - `planner`: partitions to add
//! - `retention`: partitions to drop
//! - `mutator`: plan to DDL
//! - `daemon`: the scheduled reconciliation loop

pub mod daemon;
pub mod error;
pub mod inventory;
pub mod metrics;
pub mod mutator;
pub mod planner;
pub mod policy;
pub mod retention;
pub mod state;

// Re-export commonly used types
pub use daemon::{
    CycleReport, Reconciler, ReconcilerConfig, ReconcilerState, SkipReason, TableOutcome,
    TableReport,
};
pub use error::{MutationError, ReconcileError};
pub use metrics::{MetricsSummary, ReconcileMetrics};
pub use mutator::{Change, ChangeKind, ChangeOutcome, MutationReport, Mutator};
pub use planner::{plan_additions, plan_batch, plan_next, plan_table};
pub use policy::{BoundaryStep, NamingPattern, PartitionPolicy, PolicyError};
pub use retention::plan_removals;
pub use state::{
    BoundaryValue, DropMode, PartitionRecord, Plan, PlannedPartition, RemovalPlan, TableState,
};
