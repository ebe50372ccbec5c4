//! Test configuration builder for creating test setups quickly.

use std::time::Duration;

use crate::config::{Configuration, DaemonConfig};

/// Builder for creating test configurations.
///
/// # Example
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .with_database_dsn("mysql://root@127.0.0.1:3306/test")
///     .with_schema("shop")
///     .force_drop()
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    /// Create a builder starting from [`Configuration::default`].
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
        }
    }

    /// Set the database DSN.
    pub fn with_database_dsn(mut self, dsn: &str) -> Self {
        self.config.database.dsn = dsn.to_string();
        self
    }

    /// Set the schema reconciled by the daemon.
    pub fn with_schema(mut self, schema: &str) -> Self {
        self.config.daemon.schema = Some(schema.to_string());
        self
    }

    /// Set the daemon refresh interval (not validated here).
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.daemon.refresh_interval = interval;
        self
    }

    /// Drop eligible partitions with one statement per table.
    pub fn force_drop(mut self) -> Self {
        self.config.daemon.force_drop = true;
        self
    }

    /// Plan without executing.
    pub fn dry_run(mut self) -> Self {
        self.config.daemon.dry_run = true;
        self
    }

    /// Daemon section only.
    pub fn build_daemon(self) -> DaemonConfig {
        self.config.daemon
    }

    /// Build the final configuration.
    pub fn build(self) -> Configuration {
        self.config
    }
}
