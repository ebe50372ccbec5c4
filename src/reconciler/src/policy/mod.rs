//! Per-table partitioning policy and its encoding in the table comment.

pub mod codec;
pub mod naming;
pub mod step;

use serde::Serialize;
use thiserror::Error;

use common::ddl::DdlError;

pub use codec::{MARKER, decode, decode_strict, encode, replace_in_comment};
pub use naming::NamingPattern;
pub use step::{BoundaryRepr, BoundaryStep, CalendarUnit};

/// How a table's partitions are created and retired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionPolicy {
    naming_pattern: NamingPattern,
    boundary_step: BoundaryStep,
    retention_count: u32,
    lead_count: u32,
    force_drop: bool,
}

impl PartitionPolicy {
    pub fn new(
        naming_pattern: NamingPattern,
        boundary_step: BoundaryStep,
        lead_count: u32,
        retention_count: u32,
        force_drop: bool,
    ) -> Result<Self, PolicyError> {
        boundary_step.validate()?;
        if retention_count == 0 {
            return Err(PolicyError::InvalidRetention(retention_count));
        }
        if naming_pattern.has_date_placeholder() && !boundary_step.is_calendar() {
            return Err(PolicyError::DatePatternNeedsCalendarStep);
        }

        Ok(Self {
            naming_pattern,
            boundary_step,
            retention_count,
            lead_count,
            force_drop,
        })
    }

    pub fn naming_pattern(&self) -> &NamingPattern {
        &self.naming_pattern
    }

    pub fn boundary_step(&self) -> &BoundaryStep {
        &self.boundary_step
    }

    /// Newest partitions kept by retention.
    pub fn retention_count(&self) -> u32 {
        self.retention_count
    }

    /// Empty partitions kept ahead of the active one.
    pub fn lead_count(&self) -> u32 {
        self.lead_count
    }

    /// Retire all eligible partitions in one statement.
    pub fn force_drop(&self) -> bool {
        self.force_drop
    }
}

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("No partitioning policy marker found")]
    MissingMarker,

    #[error("Malformed partitioning policy: {0}")]
    Malformed(String),

    #[error("Invalid {field} '{value}': expected a non-negative integer")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid boundary step: {0}")]
    InvalidStep(String),

    #[error("Invalid naming pattern {0}")]
    InvalidPattern(String),

    #[error("Retention count must be at least 1, got {0}")]
    InvalidRetention(u32),

    #[error("Date placeholders in a naming pattern need a calendar step")]
    DatePatternNeedsCalendarStep,

    #[error("Rendered partition name is invalid: {0}")]
    InvalidName(#[from] DdlError),

    #[error("Boundary {0} cannot be advanced or rendered")]
    BoundaryOutOfRange(i64),

    #[error("Naming pattern produced {0} consecutive names that already exist")]
    NameCollision(usize),
}
