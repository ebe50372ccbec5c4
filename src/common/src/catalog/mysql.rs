use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Executor, Row, query};

use crate::config::DatabaseConfig;
use crate::ddl::{DdlStatement, Identifier};
use crate::table::TableRef;

use super::{Catalog, CatalogError, PartitionRow, SchemaWriter, TableFilter, TableSummary};

const PARTITION_INVENTORY: &str = r#"
SELECT
    CAST(t.CREATE_OPTIONS AS CHAR) AS create_options,
    CAST(t.TABLE_COMMENT AS CHAR) AS table_comment,
    CAST(p.PARTITION_NAME AS CHAR) AS partition_name,
    CAST(p.PARTITION_EXPRESSION AS CHAR) AS partition_expression,
    CAST(p.PARTITION_DESCRIPTION AS CHAR) AS partition_description,
    CAST(p.TABLE_ROWS AS SIGNED) AS table_rows,
    CAST(p.CREATE_TIME AS DATETIME) AS create_time
FROM information_schema.TABLES t
JOIN information_schema.PARTITIONS p
    ON p.TABLE_SCHEMA = t.TABLE_SCHEMA AND p.TABLE_NAME = t.TABLE_NAME
WHERE t.TABLE_SCHEMA = ? AND t.TABLE_NAME = ?
"#;

const LIST_TABLES: &str = r#"
SELECT
    CAST(TABLE_NAME AS CHAR) AS table_name,
    CAST(TABLE_COMMENT AS CHAR) AS table_comment,
    CAST(CREATE_OPTIONS AS CHAR) AS create_options
FROM information_schema.TABLES
WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
ORDER BY TABLE_NAME
"#;

const TABLE_EXISTS: &str = r#"
SELECT COUNT(*) AS present
FROM information_schema.TABLES
WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
"#;

const FRESH_STATISTICS: &str = "SET SESSION information_schema_stats_expiry = 0";

/// Catalog and schema writer backed by a bounded MySQL connection pool.
///
/// Cloning is cheap; clones share the pool.
#[derive(Clone, Debug)]
pub struct MySqlCatalog {
    pool: MySqlPool,
}

impl MySqlCatalog {
    /// Open the pool and verify connectivity.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, CatalogError> {
        log::info!(
            "Connecting to MySQL (max_connections={})",
            config.max_connections
        );

        let pool = MySqlPoolOptions::new()
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    // Row estimates are otherwise cached for up to a day.
                    conn.execute(sqlx::raw_sql(FRESH_STATISTICS)).await?;
                    Ok(())
                })
            })
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(&config.dsn)
            .await
            .map_err(|e| {
                log::error!("Failed to connect to MySQL: {e}");
                CatalogError::Connect(e)
            })?;

        log::info!("Database connection established successfully");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn decode_partition_row(row: &MySqlRow) -> Result<PartitionRow, sqlx::Error> {
        let table_rows: Option<i64> = row.try_get("table_rows")?;
        Ok(PartitionRow {
            create_options: row.try_get("create_options")?,
            table_comment: row.try_get("table_comment")?,
            partition_name: row.try_get("partition_name")?,
            partition_expression: row.try_get("partition_expression")?,
            partition_description: row.try_get("partition_description")?,
            table_rows: table_rows.map(|rows| rows.max(0) as u64),
            create_time: row.try_get::<Option<NaiveDateTime>, _>("create_time")?,
        })
    }
}

fn is_partitioned(create_options: &str) -> bool {
    create_options
        .split_whitespace()
        .any(|option| option.eq_ignore_ascii_case("partitioned"))
}

#[async_trait]
impl Catalog for MySqlCatalog {
    async fn table_exists(&self, table: &TableRef) -> Result<bool, CatalogError> {
        let present: i64 = query(TABLE_EXISTS)
            .bind(table.schema.as_str())
            .bind(table.table.as_str())
            .fetch_one(&self.pool)
            .await?
            .try_get("present")?;
        Ok(present > 0)
    }

    async fn list_tables(
        &self,
        schema: &Identifier,
        filter: &TableFilter,
    ) -> Result<Vec<TableSummary>, CatalogError> {
        let rows = query(LIST_TABLES)
            .bind(schema.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let create_options: Option<String> = row.try_get("create_options")?;
            let summary = TableSummary {
                name: row.try_get("table_name")?,
                comment: row
                    .try_get::<Option<String>, _>("table_comment")?
                    .unwrap_or_default(),
                partitioned: create_options.as_deref().is_some_and(is_partitioned),
            };
            if filter.matches(&summary) {
                tables.push(summary);
            }
        }

        log::debug!("Listed {} tables in schema {schema}", tables.len());
        Ok(tables)
    }

    async fn partition_rows(&self, table: &TableRef) -> Result<Vec<PartitionRow>, CatalogError> {
        let rows = query(PARTITION_INVENTORY)
            .bind(table.schema.as_str())
            .bind(table.table.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(Self::decode_partition_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(CatalogError::from)
    }

    async fn show_create_table(&self, table: &TableRef) -> Result<Option<String>, CatalogError> {
        if !self.table_exists(table).await? {
            return Ok(None);
        }

        // Identifiers are allow-listed, so interpolation is safe here.
        let sql = format!("SHOW CREATE TABLE {}", table.qualified());
        let row = self.pool.fetch_optional(sqlx::raw_sql(&sql)).await?;
        row.map(|row| row.try_get::<String, _>(1))
            .transpose()
            .map_err(CatalogError::from)
    }

    async fn partition_has_rows(
        &self,
        table: &TableRef,
        partition: &Identifier,
    ) -> Result<bool, CatalogError> {
        let sql = partition_probe(table, partition);
        let row = self.pool.fetch_optional(sqlx::raw_sql(&sql)).await?;
        Ok(row.is_some())
    }
}

/// Identifiers are allow-listed, so interpolation is safe here.
fn partition_probe(table: &TableRef, partition: &Identifier) -> String {
    format!(
        "SELECT 1 FROM {} PARTITION ({}) LIMIT 1",
        table.qualified(),
        partition.quoted()
    )
}

#[async_trait]
impl SchemaWriter for MySqlCatalog {
    async fn execute(&self, statement: &DdlStatement) -> Result<(), CatalogError> {
        let sql = statement.to_sql();
        log::debug!("Executing: {sql}");

        sqlx::raw_sql(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) => CatalogError::Rejected(db.message().to_string()),
                other => CatalogError::Query(other),
            })?;
        Ok(())
    }
}
