pub mod catalog;
pub mod cli;
pub mod config;
pub mod ddl;
pub mod table;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use catalog::{Catalog, CatalogError, SchemaWriter};
pub use table::TableRef;
