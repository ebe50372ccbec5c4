//! In-process catalog used by tests.
//!
//! The model enforces the rules MySQL applies to range partitions (strictly
//! ascending bounds on add, known names on drop, at least one partition left)
//! and can be told to fail loads or statements for individual tables.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};

use crate::ddl::{DdlStatement, Identifier, SchemaChange, quote_literal};
use crate::table::TableRef;

use super::{Catalog, CatalogError, PartitionRow, SchemaWriter, TableFilter, TableSummary};

/// Upper bound of an in-memory partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemoryBound {
    Value(i64),
    MaxValue,
}

impl MemoryBound {
    fn description(&self) -> String {
        match self {
            MemoryBound::Value(v) => v.to_string(),
            MemoryBound::MaxValue => "MAXVALUE".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryPartition {
    pub name: String,
    pub bound: MemoryBound,
    pub rows: u64,
    /// What the statistics report, which may lag behind `rows`
    pub estimate: u64,
    pub created: NaiveDateTime,
}

/// Definition of an in-memory table.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    pub comment: String,
    pub expression: String,
    pub partitioned: bool,
    pub partitions: Vec<MemoryPartition>,
}

impl MemoryTable {
    /// An unpartitioned table.
    pub fn plain(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            expression: String::new(),
            partitioned: false,
            partitions: Vec::new(),
        }
    }

    /// A `RANGE` partitioned table without partitions yet.
    pub fn partitioned(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            expression: "`id`".to_string(),
            partitioned: true,
            partitions: Vec::new(),
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self
    }

    /// Append a partition holding `rows` rows below `less_than`.
    pub fn partition(mut self, name: &str, less_than: i64, rows: u64) -> Self {
        self.partitions.push(MemoryPartition {
            name: name.to_string(),
            bound: MemoryBound::Value(less_than),
            rows,
            estimate: rows,
            created: Utc::now().naive_utc(),
        });
        self
    }

    /// Append a catch-all `VALUES LESS THAN MAXVALUE` partition.
    pub fn maxvalue(mut self, name: &str) -> Self {
        self.partitions.push(MemoryPartition {
            name: name.to_string(),
            bound: MemoryBound::MaxValue,
            rows: 0,
            estimate: 0,
            created: Utc::now().naive_utc(),
        });
        self
    }

    fn top(&self) -> Option<MemoryBound> {
        self.partitions.iter().map(|p| p.bound).max()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct FailureMode {
    loads: bool,
    statements: bool,
}

#[derive(Debug, Default)]
struct Inner {
    tables: BTreeMap<TableRef, MemoryTable>,
    failures: HashMap<TableRef, FailureMode>,
    executed: Vec<DdlStatement>,
    unavailable: bool,
}

impl Inner {
    fn partition_mut(&mut self, table: &TableRef, partition: &str) -> Option<&mut MemoryPartition> {
        self.tables
            .get_mut(table)
            .and_then(|t| t.partitions.iter_mut().find(|p| p.name == partition))
    }
}

/// Catalog and schema writer over an in-memory model.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    inner: Mutex<Inner>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_table(&self, table: TableRef, definition: MemoryTable) {
        self.lock().tables.insert(table, definition);
    }

    /// Builder form of [`InMemoryCatalog::insert_table`].
    pub fn with_table(self, table: TableRef, definition: MemoryTable) -> Self {
        self.insert_table(table, definition);
        self
    }

    /// Make every inventory query for `table` fail.
    pub fn fail_loads(&self, table: &TableRef) {
        self.lock().failures.entry(table.clone()).or_default().loads = true;
    }

    /// Make every statement against `table` fail.
    pub fn fail_statements(&self, table: &TableRef) {
        self.lock()
            .failures
            .entry(table.clone())
            .or_default()
            .statements = true;
    }

    /// Make every query fail, as if the server went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Simulate rows arriving in (or leaving) a partition.
    pub fn set_rows(&self, table: &TableRef, partition: &str, rows: u64) {
        if let Some(p) = self.lock().partition_mut(table, partition) {
            p.rows = rows;
            p.estimate = rows;
        }
    }

    /// Change the reported row estimate only, as stale statistics would.
    pub fn set_estimate(&self, table: &TableRef, partition: &str, estimate: u64) {
        if let Some(p) = self.lock().partition_mut(table, partition) {
            p.estimate = estimate;
        }
    }

    /// Partition names of `table` ordered by bound.
    pub fn partition_names(&self, table: &TableRef) -> Vec<String> {
        let inner = self.lock();
        let Some(definition) = inner.tables.get(table) else {
            return Vec::new();
        };
        let mut partitions: Vec<_> = definition.partitions.iter().collect();
        partitions.sort_by_key(|p| p.bound);
        partitions.into_iter().map(|p| p.name.clone()).collect()
    }

    pub fn comment(&self, table: &TableRef) -> Option<String> {
        self.lock().tables.get(table).map(|t| t.comment.clone())
    }

    /// Every statement that was applied successfully, in order.
    pub fn executed(&self) -> Vec<DdlStatement> {
        self.lock().executed.clone()
    }

    fn check_available(inner: &Inner) -> Result<(), CatalogError> {
        if inner.unavailable {
            return Err(CatalogError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn apply(inner: &mut Inner, statement: &DdlStatement) -> Result<(), CatalogError> {
        let table_ref = statement.table();
        let Some(table) = inner.tables.get_mut(table_ref) else {
            return Err(CatalogError::Rejected(format!(
                "Table '{table_ref}' doesn't exist"
            )));
        };

        match statement.change() {
            SchemaChange::AddPartitions(partitions) => {
                if !table.partitioned {
                    return Err(CatalogError::Rejected(
                        "Partition management on a not partitioned table is not possible"
                            .to_string(),
                    ));
                }
                let mut previous = table.top();
                if previous == Some(MemoryBound::MaxValue) {
                    return Err(CatalogError::Rejected(
                        "MAXVALUE can only be used in last partition definition".to_string(),
                    ));
                }
                let existing: HashSet<&str> =
                    table.partitions.iter().map(|p| p.name.as_str()).collect();
                for partition in partitions {
                    if existing.contains(partition.name.as_str()) {
                        return Err(CatalogError::Rejected(format!(
                            "Duplicate partition name {}",
                            partition.name
                        )));
                    }
                    let bound = MemoryBound::Value(partition.less_than);
                    if previous.is_some_and(|p| bound <= p) {
                        return Err(CatalogError::Rejected(
                            "VALUES LESS THAN value must be strictly increasing for each partition"
                                .to_string(),
                        ));
                    }
                    previous = Some(bound);
                }

                let created = Utc::now().naive_utc();
                table
                    .partitions
                    .extend(partitions.iter().map(|p| MemoryPartition {
                        name: p.name.to_string(),
                        bound: MemoryBound::Value(p.less_than),
                        rows: 0,
                        estimate: 0,
                        created,
                    }));
            }
            SchemaChange::DropPartitions(partitions) => {
                if !table.partitioned {
                    return Err(CatalogError::Rejected(
                        "Partition management on a not partitioned table is not possible"
                            .to_string(),
                    ));
                }
                let doomed: HashSet<&str> = partitions.iter().map(Identifier::as_str).collect();
                if doomed
                    .iter()
                    .any(|name| !table.partitions.iter().any(|p| p.name == *name))
                {
                    return Err(CatalogError::Rejected(
                        "Error in list of partitions to DROP".to_string(),
                    ));
                }
                if doomed.len() >= table.partitions.len() {
                    return Err(CatalogError::Rejected(
                        "Cannot remove all partitions, use DROP TABLE instead".to_string(),
                    ));
                }
                table
                    .partitions
                    .retain(|p| !doomed.contains(p.name.as_str()));
            }
            SchemaChange::SetComment(comment) => {
                table.comment = comment.clone();
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn table_exists(&self, table: &TableRef) -> Result<bool, CatalogError> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner.tables.contains_key(table))
    }

    async fn list_tables(
        &self,
        schema: &Identifier,
        filter: &TableFilter,
    ) -> Result<Vec<TableSummary>, CatalogError> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner
            .tables
            .iter()
            .filter(|(table, _)| &table.schema == schema)
            .map(|(table, definition)| TableSummary {
                name: table.table.to_string(),
                comment: definition.comment.clone(),
                partitioned: definition.partitioned,
            })
            .filter(|summary| filter.matches(summary))
            .collect())
    }

    async fn partition_rows(&self, table: &TableRef) -> Result<Vec<PartitionRow>, CatalogError> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        if inner.failures.get(table).is_some_and(|f| f.loads) {
            return Err(CatalogError::Unavailable(format!(
                "injected load failure for {table}"
            )));
        }

        let Some(definition) = inner.tables.get(table) else {
            return Ok(Vec::new());
        };

        let create_options = definition
            .partitioned
            .then(|| "partitioned".to_string())
            .or_else(|| Some(String::new()));

        if !definition.partitioned || definition.partitions.is_empty() {
            return Ok(vec![PartitionRow {
                create_options,
                table_comment: Some(definition.comment.clone()),
                ..Default::default()
            }]);
        }

        // Newest first: callers must not rely on catalog order.
        Ok(definition
            .partitions
            .iter()
            .rev()
            .map(|p| PartitionRow {
                create_options: create_options.clone(),
                table_comment: Some(definition.comment.clone()),
                partition_name: Some(p.name.clone()),
                partition_expression: Some(definition.expression.clone()),
                partition_description: Some(p.bound.description()),
                table_rows: Some(p.estimate),
                create_time: Some(p.created),
            })
            .collect())
    }

    async fn show_create_table(&self, table: &TableRef) -> Result<Option<String>, CatalogError> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner.tables.get(table).map(|definition| {
            let mut ddl = format!("CREATE TABLE {} (...)", table.table.quoted());
            if definition.partitioned {
                let mut partitions: Vec<_> = definition.partitions.iter().collect();
                partitions.sort_by_key(|p| p.bound);
                let clauses = partitions
                    .iter()
                    .map(|p| {
                        format!(
                            "PARTITION {} VALUES LESS THAN ({})",
                            p.name,
                            p.bound.description()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(",\n ");
                ddl.push_str(&format!(
                    "\nPARTITION BY RANGE ({})\n({clauses})",
                    definition.expression
                ));
            }
            if !definition.comment.is_empty() {
                ddl.push_str(&format!(" COMMENT={}", quote_literal(&definition.comment)));
            }
            ddl
        }))
    }

    async fn partition_has_rows(
        &self,
        table: &TableRef,
        partition: &Identifier,
    ) -> Result<bool, CatalogError> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        let Some(definition) = inner.tables.get(table) else {
            return Err(CatalogError::Rejected(format!("Table '{table}' doesn't exist")));
        };
        definition
            .partitions
            .iter()
            .find(|p| p.name == partition.as_str())
            .map(|p| p.rows > 0)
            .ok_or_else(|| {
                CatalogError::Rejected(format!(
                    "Unknown partition '{partition}' in table '{table}'"
                ))
            })
    }
}

#[async_trait]
impl SchemaWriter for InMemoryCatalog {
    async fn execute(&self, statement: &DdlStatement) -> Result<(), CatalogError> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;
        if inner
            .failures
            .get(statement.table())
            .is_some_and(|f| f.statements)
        {
            return Err(CatalogError::Rejected(
                "Lock wait timeout exceeded; try restarting transaction".to_string(),
            ));
        }

        Self::apply(&mut inner, statement)?;
        inner.executed.push(statement.clone());
        Ok(())
    }
}
