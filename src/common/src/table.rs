use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::ddl::{DdlError, Identifier};

/// Fully qualified identity of a table: `<schema>.<table>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableRef {
    pub schema: Identifier,
    pub table: Identifier,
}

impl TableRef {
    pub fn new(schema: Identifier, table: Identifier) -> Self {
        Self { schema, table }
    }

    /// Parse the `schema.table` form accepted on the command line.
    pub fn parse(value: &str) -> Result<Self, DdlError> {
        let mut parts = value.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(schema), Some(table), None) => {
                Ok(Self::new(Identifier::new(schema)?, Identifier::new(table)?))
            }
            _ => Err(DdlError::MalformedTableRef(value.to_string())),
        }
    }

    /// Back-quoted `schema`.`table` form used in statements.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema.quoted(), self.table.quoted())
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

impl FromStr for TableRef {
    type Err = DdlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
