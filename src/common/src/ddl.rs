//! Validated DDL statements for partition maintenance.
//!
//! Identifiers are checked against an allow-list before they are interpolated,
//! so a rendered statement never carries caller-controlled SQL. The generated
//! shapes are the plain MySQL forms:
//!
//! ```text
//! ALTER TABLE `s`.`t` ADD PARTITION (PARTITION `p3000` VALUES LESS THAN (3000), ...)
//! ALTER TABLE `s`.`t` DROP PARTITION `p1000`, `p2000`
//! ALTER TABLE `s`.`t` COMMENT = '...'
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::table::TableRef;

/// Longest identifier MySQL accepts for schemas, tables and partitions.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Longest table comment MySQL accepts.
pub const MAX_COMMENT_LEN: usize = 2048;

/// A schema, table or partition name that passed the allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Result<Self, DdlError> {
        let value = value.into();

        if value.is_empty() || value.len() > MAX_IDENTIFIER_LEN {
            return Err(DdlError::InvalidIdentifier {
                value,
                reason: "length must be between 1 and 64 characters",
            });
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            return Err(DdlError::InvalidIdentifier {
                value,
                reason: "only ASCII letters, digits, '_' and '$' are allowed",
            });
        }
        if value.chars().all(|c| c.is_ascii_digit()) {
            return Err(DdlError::InvalidIdentifier {
                value,
                reason: "must not consist of digits only",
            });
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Back-quoted form used inside statements.
    pub fn quoted(&self) -> String {
        format!("`{}`", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = DdlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One `PARTITION name VALUES LESS THAN (bound)` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDefinition {
    pub name: Identifier,
    pub less_than: i64,
}

impl PartitionDefinition {
    pub fn new(name: Identifier, less_than: i64) -> Self {
        Self { name, less_than }
    }

    fn to_sql(&self) -> String {
        format!(
            "PARTITION {} VALUES LESS THAN ({})",
            self.name.quoted(),
            self.less_than
        )
    }
}

/// The change a [`DdlStatement`] carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    AddPartitions(Vec<PartitionDefinition>),
    DropPartitions(Vec<Identifier>),
    SetComment(String),
}

/// A structural change to a partitioned table.
///
/// Only [`DdlStatement::add_partitions`], [`DdlStatement::drop_partitions`]
/// and [`DdlStatement::set_comment`] build one; they enforce the invariants
/// MySQL would otherwise reject at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdlStatement {
    table: TableRef,
    change: SchemaChange,
}

impl DdlStatement {
    /// Add one or more partitions in a single statement.
    ///
    /// Partitions must be listed with strictly ascending bounds and unique
    /// names.
    pub fn add_partitions(
        table: TableRef,
        partitions: Vec<PartitionDefinition>,
    ) -> Result<Self, DdlError> {
        if partitions.is_empty() {
            return Err(DdlError::EmptyPartitionList);
        }

        let mut names = HashSet::with_capacity(partitions.len());
        for partition in &partitions {
            if !names.insert(partition.name.as_str()) {
                return Err(DdlError::DuplicatePartition(partition.name.to_string()));
            }
        }
        for pair in partitions.windows(2) {
            if pair[1].less_than <= pair[0].less_than {
                return Err(DdlError::UnorderedBoundaries {
                    previous: pair[0].less_than,
                    next: pair[1].less_than,
                });
            }
        }

        Ok(Self {
            table,
            change: SchemaChange::AddPartitions(partitions),
        })
    }

    /// Drop one or more partitions in a single statement.
    pub fn drop_partitions(table: TableRef, partitions: Vec<Identifier>) -> Result<Self, DdlError> {
        if partitions.is_empty() {
            return Err(DdlError::EmptyPartitionList);
        }

        let mut names = HashSet::with_capacity(partitions.len());
        for name in &partitions {
            if !names.insert(name.as_str()) {
                return Err(DdlError::DuplicatePartition(name.to_string()));
            }
        }

        Ok(Self {
            table,
            change: SchemaChange::DropPartitions(partitions),
        })
    }

    /// Replace the table comment (the carrier of the partitioning policy).
    pub fn set_comment(table: TableRef, comment: impl Into<String>) -> Result<Self, DdlError> {
        let comment = comment.into();
        if comment.chars().count() > MAX_COMMENT_LEN {
            return Err(DdlError::CommentTooLong(comment.chars().count()));
        }
        Ok(Self {
            table,
            change: SchemaChange::SetComment(comment),
        })
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn change(&self) -> &SchemaChange {
        &self.change
    }

    /// Short label used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self.change {
            SchemaChange::AddPartitions(_) => "add_partitions",
            SchemaChange::DropPartitions(_) => "drop_partitions",
            SchemaChange::SetComment(_) => "set_comment",
        }
    }

    pub fn to_sql(&self) -> String {
        let table = self.table.qualified();
        match &self.change {
            SchemaChange::AddPartitions(partitions) => {
                let clauses = partitions
                    .iter()
                    .map(PartitionDefinition::to_sql)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("ALTER TABLE {table} ADD PARTITION ({clauses})")
            }
            SchemaChange::DropPartitions(partitions) => {
                let names = partitions
                    .iter()
                    .map(Identifier::quoted)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("ALTER TABLE {table} DROP PARTITION {names}")
            }
            SchemaChange::SetComment(comment) => {
                format!("ALTER TABLE {table} COMMENT = {}", quote_literal(comment))
            }
        }
    }
}

impl fmt::Display for DdlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Render a MySQL string literal.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DdlError {
    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: &'static str },

    #[error("Invalid table reference '{0}': expected <schema>.<table>")]
    MalformedTableRef(String),

    #[error("Statement needs at least one partition")]
    EmptyPartitionList,

    #[error("Partition '{0}' listed more than once")]
    DuplicatePartition(String),

    #[error("Partition bounds must be strictly ascending: {next} follows {previous}")]
    UnorderedBoundaries { previous: i64, next: i64 },

    #[error("Table comment is {0} characters long, MySQL allows at most 2048")]
    CommentTooLong(usize),
}
