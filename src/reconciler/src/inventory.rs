//! Builds a [`TableState`] from one catalog snapshot.

use std::collections::HashSet;

use common::TableRef;
use common::catalog::{Catalog, CatalogError, PartitionRow};
use common::ddl::Identifier;

use crate::policy::codec;
use crate::state::{BoundaryValue, PartitionRecord, TableState};

/// Load the current state of `table`. A missing table is not an error.
///
/// For tables managed with a numeric step, partitions are checked for data
/// from the top down until one holding rows is found, since the engine's row
/// estimates lag behind inserts.
pub async fn load(catalog: &dyn Catalog, table: &TableRef) -> Result<TableState, CatalogError> {
    let rows = catalog.partition_rows(table).await?;
    let mut state = build_state(table, rows)?;

    let numeric = state
        .managed_policy()
        .is_some_and(|policy| !policy.boundary_step().is_calendar());
    if numeric && !state.has_maxvalue_partition() {
        probe_rows(catalog, &mut state).await?;
    }
    Ok(state)
}

async fn probe_rows(catalog: &dyn Catalog, state: &mut TableState) -> Result<(), CatalogError> {
    for partition in state.partitions.iter_mut().rev() {
        let Ok(name) = Identifier::new(partition.name.as_str()) else {
            tracing::warn!(
                table = %state.table,
                partition = %partition.name,
                "Cannot check partition with unsupported name"
            );
            return Ok(());
        };
        let holds_rows = catalog.partition_has_rows(&state.table, &name).await?;
        partition.holds_rows = Some(holds_rows);
        if holds_rows {
            break;
        }
    }
    Ok(())
}

/// Interpret raw inventory rows, which may arrive in any order.
pub fn build_state(table: &TableRef, rows: Vec<PartitionRow>) -> Result<TableState, CatalogError> {
    let Some(first) = rows.first() else {
        tracing::debug!(table = %table, "Table not found in catalog");
        return Ok(TableState::absent(table.clone()));
    };

    let comment = first.table_comment.clone().unwrap_or_default();
    let partitioned = first
        .create_options
        .as_deref()
        .is_some_and(|options| options.contains("partitioned"))
        && rows.iter().any(|row| row.partition_name.is_some());

    if !partitioned {
        return Ok(TableState {
            table: table.clone(),
            exists: true,
            partitioned: false,
            comment,
            policy: None,
            partitions: Vec::new(),
        });
    }

    let mut partitions = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(name) = row.partition_name else {
            return Err(inconsistent(table, "partition row without a name"));
        };
        let description = row.partition_description.unwrap_or_default();
        let boundary =
            BoundaryValue::parse(&description).ok_or_else(|| CatalogError::InvalidBoundary {
                table: table.to_string(),
                partition: name.clone(),
                value: description.clone(),
            })?;

        partitions.push(PartitionRecord {
            name,
            boundary,
            row_estimate: row.table_rows.unwrap_or(0),
            holds_rows: None,
            created_at: row.create_time,
            expression: row.partition_expression,
        });
    }

    partitions.sort_by_key(|p| p.boundary);

    let mut names = HashSet::new();
    for (i, partition) in partitions.iter().enumerate() {
        if !names.insert(partition.name.as_str()) {
            return Err(inconsistent(
                table,
                &format!("partition {} listed twice", partition.name),
            ));
        }
        if i > 0 && partitions[i - 1].boundary == partition.boundary {
            return Err(inconsistent(
                table,
                &format!("boundary {} shared by two partitions", partition.boundary),
            ));
        }
    }

    let policy = codec::decode(&comment);

    Ok(TableState {
        table: table.clone(),
        exists: true,
        partitioned: true,
        comment,
        policy,
        partitions,
    })
}

fn inconsistent(table: &TableRef, reason: &str) -> CatalogError {
    CatalogError::InconsistentInventory {
        table: table.to_string(),
        reason: reason.to_string(),
    }
}
