//! MySQL fixtures for integration tests.
//!
//! Every context starts its own MySQL container, so tests need a running
//! Docker daemon and are ignored by default:
//!
//! ```sh
//! cargo test -p tests-integration -- --ignored
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use common::TableRef;
use common::catalog::MySqlCatalog;
use common::config::DatabaseConfig;
use common::ddl::Identifier;
use testcontainers_modules::mysql::Mysql;
use testcontainers_modules::testcontainers::{ContainerAsync, runners::AsyncRunner};

/// Schema created by the default MySQL image.
pub const SCHEMA: &str = "test";

/// Initialize test logging
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub struct MySqlTestContext {
    #[allow(dead_code)] // Keeps the container alive for the test
    container: ContainerAsync<Mysql>,
    pub dsn: String,
    pub catalog: Arc<MySqlCatalog>,
}

impl MySqlTestContext {
    pub async fn new() -> Result<Self> {
        init_test_logging();

        let container = Mysql::default().start().await?;
        let host_port = container.get_host_port_ipv4(3306).await?;
        let dsn = format!("mysql://root@127.0.0.1:{host_port}/{SCHEMA}");

        let config = DatabaseConfig {
            dsn: dsn.clone(),
            ..Default::default()
        };
        let catalog = MySqlCatalog::connect(&config)
            .await
            .context("Failed to connect to MySQL container")?;

        Ok(Self {
            container,
            dsn,
            catalog: Arc::new(catalog),
        })
    }

    pub fn table(&self, name: &str) -> Result<TableRef> {
        Ok(TableRef::new(Identifier::new(SCHEMA)?, Identifier::new(name)?))
    }

    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(self.catalog.pool())
            .await
            .with_context(|| format!("Failed to execute: {sql}"))?;
        Ok(())
    }

    /// Create a table partitioned by `RANGE (id)` with the given bounds.
    pub async fn create_range_table(
        &self,
        name: &str,
        comment: &str,
        partitions: &[(&str, i64)],
    ) -> Result<TableRef> {
        let clauses = partitions
            .iter()
            .map(|(partition, bound)| format!("PARTITION `{partition}` VALUES LESS THAN ({bound})"))
            .collect::<Vec<_>>()
            .join(", ");
        self.execute(&format!(
            "CREATE TABLE `{name}` (id BIGINT NOT NULL, PRIMARY KEY (id)) \
             COMMENT = '{comment}' \
             PARTITION BY RANGE (id) ({clauses})"
        ))
        .await?;
        self.table(name)
    }

    /// Create a table partitioned by `RANGE (TO_DAYS(created_at))`.
    pub async fn create_daily_table(
        &self,
        name: &str,
        comment: &str,
        partitions: &[(&str, &str)],
    ) -> Result<TableRef> {
        let clauses = partitions
            .iter()
            .map(|(partition, day)| {
                format!("PARTITION `{partition}` VALUES LESS THAN (TO_DAYS('{day}'))")
            })
            .collect::<Vec<_>>()
            .join(", ");
        self.execute(&format!(
            "CREATE TABLE `{name}` (id BIGINT NOT NULL, created_at DATETIME NOT NULL, \
             PRIMARY KEY (id, created_at)) \
             COMMENT = '{comment}' \
             PARTITION BY RANGE (TO_DAYS(created_at)) ({clauses})"
        ))
        .await?;
        self.table(name)
    }

    /// Insert `ids` without refreshing statistics.
    pub async fn insert_ids(&self, name: &str, ids: &[i64]) -> Result<()> {
        let values = ids
            .iter()
            .map(|id| format!("({id})"))
            .collect::<Vec<_>>()
            .join(", ");
        self.execute(&format!("INSERT INTO `{name}` (id) VALUES {values}"))
            .await
    }

    /// Recompute the row estimates of `name`.
    pub async fn analyze(&self, name: &str) -> Result<()> {
        self.execute(&format!("ANALYZE TABLE `{name}`")).await
    }
}
