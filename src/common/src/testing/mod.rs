//! Test utilities for rangekeeper.
//!
//! This module provides reusable helpers for building test configurations
//! and an in-memory catalog that stands in for a MySQL server.
//!
//! # Feature Flag
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```

mod config_builder;

pub use crate::catalog::memory::{InMemoryCatalog, MemoryBound, MemoryPartition, MemoryTable};
pub use config_builder::TestConfigBuilder;
