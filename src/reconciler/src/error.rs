use thiserror::Error;

use common::catalog::CatalogError;
use common::ddl::DdlError;

use crate::policy::PolicyError;

/// A structural change that could not be applied.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("Cannot build statement for {table}: {source}")]
    Statement {
        table: String,
        #[source]
        source: DdlError,
    },

    #[error("Statement failed on {table}: {source} [{sql}]")]
    Execution {
        table: String,
        sql: String,
        #[source]
        source: CatalogError,
    },
}

/// Why a table could not be reconciled in one pass.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Mutation(#[from] MutationError),
}
