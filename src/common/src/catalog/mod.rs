//! Access to the database catalog (`information_schema`) and to structural
//! changes on partitioned tables.
//!
//! Two seams are exposed:
//!
//! - [`Catalog`]: read-only queries for table existence, listings, the raw
//!   partition inventory of one table and whether a partition holds data.
//! - [`SchemaWriter`]: execution of validated [`DdlStatement`]s.
//!
//! [`MySqlCatalog`] implements both against a live server. With the `testing`
//! feature, `memory::InMemoryCatalog` implements them against an in-process
//! model so the reconciliation engine can be exercised without a database.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::ddl::{DdlStatement, Identifier};
use crate::table::TableRef;

#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod mysql;

pub use mysql::MySqlCatalog;

/// A base table as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub comment: String,
    pub partitioned: bool,
}

/// Which tables [`Catalog::list_tables`] returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TableFilter {
    #[default]
    All,
    /// Tables carrying any comment
    Commented,
    /// Tables whose comment contains the given text
    CommentContains(String),
}

impl TableFilter {
    pub fn matches(&self, table: &TableSummary) -> bool {
        match self {
            TableFilter::All => true,
            TableFilter::Commented => !table.comment.is_empty(),
            TableFilter::CommentContains(needle) => table.comment.contains(needle.as_str()),
        }
    }
}

/// One row of `information_schema.tables` joined with
/// `information_schema.partitions`, as returned by the server.
///
/// An unpartitioned table yields a single row with no partition name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionRow {
    pub create_options: Option<String>,
    pub table_comment: Option<String>,
    pub partition_name: Option<String>,
    pub partition_expression: Option<String>,
    pub partition_description: Option<String>,
    pub table_rows: Option<u64>,
    pub create_time: Option<NaiveDateTime>,
}

/// Read-only catalog queries.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Whether `table` exists.
    async fn table_exists(&self, table: &TableRef) -> Result<bool, CatalogError>;

    /// Base tables of `schema` matching `filter`, ordered by name.
    async fn list_tables(
        &self,
        schema: &Identifier,
        filter: &TableFilter,
    ) -> Result<Vec<TableSummary>, CatalogError>;

    /// Raw partition inventory of `table` in unspecified order. Empty when
    /// the table does not exist.
    async fn partition_rows(&self, table: &TableRef) -> Result<Vec<PartitionRow>, CatalogError>;

    /// `SHOW CREATE TABLE` output, `None` when the table does not exist.
    async fn show_create_table(&self, table: &TableRef) -> Result<Option<String>, CatalogError>;

    /// Whether `partition` holds at least one row, read from the table data
    /// rather than from the engine's row estimate.
    async fn partition_has_rows(
        &self,
        table: &TableRef,
        partition: &Identifier,
    ) -> Result<bool, CatalogError>;
}

/// Execution of structural changes. Statements are auto-committed.
#[async_trait]
pub trait SchemaWriter: Send + Sync {
    async fn execute(&self, statement: &DdlStatement) -> Result<(), CatalogError>;
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Catalog query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Statement rejected by server: {0}")]
    Rejected(String),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Inconsistent partition inventory for {table}: {reason}")]
    InconsistentInventory { table: String, reason: String },

    #[error("Invalid boundary '{value}' for partition {partition} of {table}")]
    InvalidBoundary {
        table: String,
        partition: String,
        value: String,
    },
}
