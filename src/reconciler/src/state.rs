//! Per-pass snapshot of a table and the plan derived from it.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

use common::TableRef;
use common::ddl::Identifier;

use crate::policy::PartitionPolicy;

/// Upper bound of a range partition. `MaxValue` sorts above every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoundaryValue {
    Value(i64),
    MaxValue,
}

impl BoundaryValue {
    /// Parse a `PARTITION_DESCRIPTION`: `MAXVALUE` or a decimal integer.
    pub fn parse(description: &str) -> Option<Self> {
        let description = description.trim();
        if description.eq_ignore_ascii_case("MAXVALUE") {
            return Some(BoundaryValue::MaxValue);
        }
        description.parse().ok().map(BoundaryValue::Value)
    }

    pub fn value(&self) -> Option<i64> {
        match self {
            BoundaryValue::Value(v) => Some(*v),
            BoundaryValue::MaxValue => None,
        }
    }
}

impl fmt::Display for BoundaryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryValue::Value(v) => write!(f, "{v}"),
            BoundaryValue::MaxValue => f.write_str("MAXVALUE"),
        }
    }
}

impl Serialize for BoundaryValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BoundaryValue::Value(v) => serializer.serialize_i64(*v),
            BoundaryValue::MaxValue => serializer.serialize_str("MAXVALUE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionRecord {
    pub name: String,
    pub boundary: BoundaryValue,
    /// Estimated row count, as maintained by the storage engine
    pub row_estimate: u64,
    /// Whether the partition holds rows, read from the table data. `None`
    /// when it was not checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holds_rows: Option<bool>,
    pub created_at: Option<NaiveDateTime>,
    pub expression: Option<String>,
}

impl PartitionRecord {
    /// Live data check when available, the row estimate otherwise.
    pub fn has_rows(&self) -> bool {
        self.holds_rows.unwrap_or(self.row_estimate > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableState {
    pub table: TableRef,
    pub exists: bool,
    pub partitioned: bool,
    pub comment: String,
    pub policy: Option<PartitionPolicy>,
    /// Ascending by boundary
    pub partitions: Vec<PartitionRecord>,
}

impl TableState {
    /// State of a table the catalog does not know.
    pub fn absent(table: TableRef) -> Self {
        Self {
            table,
            exists: false,
            partitioned: false,
            comment: String::new(),
            policy: None,
            partitions: Vec::new(),
        }
    }

    /// Policy of a partitioned table; the planners only act on these.
    pub fn managed_policy(&self) -> Option<&PartitionPolicy> {
        if self.partitioned {
            self.policy.as_ref()
        } else {
            None
        }
    }

    pub fn max_boundary(&self) -> Option<BoundaryValue> {
        self.partitions.iter().map(|p| p.boundary).max()
    }

    /// Whether the top partition is a `MAXVALUE` catch-all.
    pub fn has_maxvalue_partition(&self) -> bool {
        self.max_boundary() == Some(BoundaryValue::MaxValue)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.partitions.iter().any(|p| p.name == name)
    }
}

/// A partition the boundary planner wants to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPartition {
    pub name: Identifier,
    pub boundary: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropMode {
    /// One statement for every partition
    Combined,
    /// One statement per partition
    #[default]
    Individual,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RemovalPlan {
    /// Ascending by boundary
    pub names: Vec<Identifier>,
    pub mode: DropMode,
}

impl RemovalPlan {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Changes for one table. Producing a plan never touches the database.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Plan {
    pub additions: Vec<PlannedPartition>,
    pub removals: RemovalPlan,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}
