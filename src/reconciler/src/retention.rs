//! Retention planning: which old partitions to drop.
//!
//! The newest `retention_count` partitions are kept. The partition with the
//! highest boundary is the active write target and is never proposed, even
//! when the retention count would allow it.

use common::ddl::Identifier;

use crate::state::{DropMode, PartitionRecord, RemovalPlan, TableState};

/// Partitions of `state` that fall outside its policy's retention.
pub fn plan_removals(state: &TableState) -> RemovalPlan {
    let Some(policy) = state.managed_policy() else {
        return RemovalPlan::default();
    };

    let mode = if policy.force_drop() {
        DropMode::Combined
    } else {
        DropMode::Individual
    };

    select_removals(
        &state.partitions,
        policy.retention_count() as usize,
        mode,
    )
}

/// Everything below the newest `keep` partitions of `partitions` (ascending
/// by boundary), excluding the maximum-boundary partition.
pub fn select_removals(partitions: &[PartitionRecord], keep: usize, mode: DropMode) -> RemovalPlan {
    let Some(max) = partitions.iter().map(|p| p.boundary).max() else {
        return RemovalPlan::default();
    };

    let eligible = partitions.len().saturating_sub(keep);
    let names = partitions[..eligible]
        .iter()
        .filter(|p| p.boundary != max)
        .filter_map(|p| match Identifier::new(p.name.as_str()) {
            Ok(name) => Some(name),
            Err(e) => {
                tracing::warn!(
                    partition = %p.name,
                    error = %e,
                    "Not dropping partition with an unsupported name"
                );
                None
            }
        })
        .collect();

    RemovalPlan { names, mode }
}
