//! Boundary planning: which partitions to append above the current top.
//!
//! The planner keeps `lead_count` empty partitions ahead of the active one.
//! For calendar steps the active partition is the one whose range contains
//! `now`; for numeric steps it is the highest partition holding rows, judged
//! from live data when the inventory checked it. Every
//! proposed boundary lies above the current maximum, and names that already
//! exist are never proposed again.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::policy::{PartitionPolicy, PolicyError};
use crate::retention::plan_removals;
use crate::state::{BoundaryValue, DropMode, Plan, PlannedPartition, TableState};

/// Consecutive name collisions tolerated before giving up on a table.
const MAX_NAME_COLLISIONS: usize = 1024;

/// Steps tolerated to bring a calendar table up to `now`.
const MAX_CATCH_UP_STEPS: usize = 10_000;

/// Partitions needed to restore the policy's lead.
pub fn plan_additions(
    state: &TableState,
    now: DateTime<Utc>,
) -> Result<Vec<PlannedPartition>, PolicyError> {
    let Some(policy) = state.managed_policy() else {
        return Ok(Vec::new());
    };
    if state.has_maxvalue_partition() {
        return Ok(Vec::new());
    }

    let step = policy.boundary_step();
    let boundaries: Vec<i64> = state
        .partitions
        .iter()
        .filter_map(|p| p.boundary.value())
        .collect();

    match step.watermark(now) {
        Some(watermark) => match boundaries.iter().copied().find(|b| *b > watermark) {
            Some(active) => {
                let missing = missing(policy, &boundaries, active);
                Stepper::new(state, policy, now)?.take(missing, None)
            }
            // Nothing covers `now` yet: catch up, then add the full lead.
            None => Stepper::new(state, policy, now)?
                .take(policy.lead_count() as usize, Some(watermark)),
        },
        None => {
            let active = state
                .partitions
                .iter()
                .rev()
                .find(|p| p.has_rows())
                .or(state.partitions.first())
                .and_then(|p| p.boundary.value());
            let missing = match active {
                Some(active) => missing(policy, &boundaries, active),
                None => policy.lead_count() as usize,
            };
            Stepper::new(state, policy, now)?.take(missing, None)
        }
    }
}

/// `count` partitions stepped from the current top, ignoring the lead.
pub fn plan_batch(
    state: &TableState,
    count: usize,
    now: DateTime<Utc>,
) -> Result<Vec<PlannedPartition>, PolicyError> {
    let Some(policy) = state.managed_policy() else {
        return Ok(Vec::new());
    };
    if state.has_maxvalue_partition() {
        return Ok(Vec::new());
    }
    Stepper::new(state, policy, now)?.take(count, None)
}

/// The single partition following the current top.
pub fn plan_next(
    state: &TableState,
    now: DateTime<Utc>,
) -> Result<Vec<PlannedPartition>, PolicyError> {
    plan_batch(state, 1, now)
}

/// Full reconciliation plan. `force_drop` combines removals regardless of
/// the policy flag.
pub fn plan_table(
    state: &TableState,
    now: DateTime<Utc>,
    force_drop: bool,
) -> Result<Plan, PolicyError> {
    let additions = plan_additions(state, now)?;
    let mut removals = plan_removals(state);
    if force_drop {
        removals.mode = DropMode::Combined;
    }
    Ok(Plan {
        additions,
        removals,
    })
}

fn missing(policy: &PartitionPolicy, boundaries: &[i64], active: i64) -> usize {
    let future = boundaries.iter().filter(|b| **b > active).count();
    (policy.lead_count() as usize).saturating_sub(future)
}

/// Walks boundaries upwards from the current top.
struct Stepper<'a> {
    policy: &'a PartitionPolicy,
    taken: HashSet<String>,
    previous: i64,
}

impl<'a> Stepper<'a> {
    fn new(
        state: &'a TableState,
        policy: &'a PartitionPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self, PolicyError> {
        let step = policy.boundary_step();
        let previous = match state.max_boundary() {
            Some(BoundaryValue::Value(top)) => top,
            // Callers bail out on MAXVALUE before stepping.
            Some(BoundaryValue::MaxValue) | None => step
                .floor(now)
                .ok_or_else(|| PolicyError::BoundaryOutOfRange(now.timestamp()))?,
        };

        Ok(Self {
            policy,
            taken: state.partitions.iter().map(|p| p.name.clone()).collect(),
            previous,
        })
    }

    /// Step until the top exceeds `catch_up_to` (when given), then `count`
    /// more partitions.
    fn take(
        mut self,
        count: usize,
        catch_up_to: Option<i64>,
    ) -> Result<Vec<PlannedPartition>, PolicyError> {
        let mut planned = Vec::with_capacity(count);

        if let Some(watermark) = catch_up_to {
            while self.previous <= watermark {
                if planned.len() >= MAX_CATCH_UP_STEPS {
                    return Err(PolicyError::BoundaryOutOfRange(self.previous));
                }
                planned.push(self.next_partition()?);
            }
        }
        for _ in 0..count {
            planned.push(self.next_partition()?);
        }

        Ok(planned)
    }

    /// Next boundary whose rendered name is not taken.
    fn next_partition(&mut self) -> Result<PlannedPartition, PolicyError> {
        let step = self.policy.boundary_step();
        for _ in 0..MAX_NAME_COLLISIONS {
            let boundary = step
                .advance(self.previous)
                .ok_or(PolicyError::BoundaryOutOfRange(self.previous))?;
            let name = self.policy.naming_pattern().render(boundary, step)?;
            self.previous = boundary;

            if self.taken.insert(name.to_string()) {
                return Ok(PlannedPartition { name, boundary });
            }
            tracing::debug!(partition = %name, boundary, "Skipping boundary with an existing name");
        }
        Err(PolicyError::NameCollision(MAX_NAME_COLLISIONS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{BoundaryRepr, codec};
    use crate::state::PartitionRecord;
    use chrono::{NaiveDate, TimeZone};
    use common::TableRef;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 15, 30, 0).unwrap()
    }

    fn state(comment: &str, partitions: &[(&str, i64, u64)]) -> TableState {
        TableState {
            table: TableRef::parse("shop.orders").unwrap(),
            exists: true,
            partitioned: true,
            comment: comment.to_string(),
            policy: codec::decode(comment),
            partitions: partitions
                .iter()
                .map(|(name, boundary, rows)| PartitionRecord {
                    name: name.to_string(),
                    boundary: BoundaryValue::Value(*boundary),
                    row_estimate: *rows,
                    holds_rows: None,
                    created_at: None,
                    expression: Some("`id`".to_string()),
                })
                .collect(),
        }
    }

    fn boundaries(planned: &[PlannedPartition]) -> Vec<i64> {
        planned.iter().map(|p| p.boundary).collect()
    }

    fn names(planned: &[PlannedPartition]) -> Vec<&str> {
        planned.iter().map(|p| p.name.as_str()).collect()
    }

    fn to_days(y: i32, m: u32, d: u32) -> i64 {
        let midnight = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        BoundaryRepr::Days.from_datetime(midnight)
    }

    #[test]
    fn test_lead_ahead_of_max() {
        let state = state(
            "[rk:p{n}:1000:2:3]",
            &[("p1000", 1000, 120), ("p2000", 2000, 40)],
        );

        let planned = plan_additions(&state, now()).unwrap();
        assert_eq!(boundaries(&planned), vec![3000, 4000]);
        assert_eq!(names(&planned), vec!["p3000", "p4000"]);
    }

    #[test]
    fn test_live_rows_override_stale_estimates() {
        let mut state = state(
            "[rk:p{n}:1000:2:3]",
            &[("p1000", 1000, 0), ("p2000", 2000, 0)],
        );
        state.partitions[1].holds_rows = Some(true);
        assert_eq!(
            boundaries(&plan_additions(&state, now()).unwrap()),
            vec![3000, 4000]
        );

        // An estimate left over from rows that were since deleted.
        let mut state = state_with_rows_up_to(2000);
        state.partitions[1].holds_rows = Some(false);
        state.partitions[0].holds_rows = Some(true);
        assert_eq!(
            boundaries(&plan_additions(&state, now()).unwrap()),
            vec![3000]
        );
    }

    #[test]
    fn test_empty_future_partitions_count_towards_lead() {
        let state = state(
            "[rk:p{n}:1000:2:3]",
            &[("p1000", 1000, 120), ("p2000", 2000, 0), ("p3000", 3000, 0)],
        );
        assert!(plan_additions(&state, now()).unwrap().is_empty());

        let state = state_with_rows_up_to(3000);
        assert_eq!(
            boundaries(&plan_additions(&state, now()).unwrap()),
            vec![4000, 5000]
        );
    }

    fn state_with_rows_up_to(top: i64) -> TableState {
        let partitions: Vec<(String, i64, u64)> = (1..=top / 1000)
            .map(|i| (format!("p{}", i * 1000), i * 1000, 10))
            .collect();
        let refs: Vec<(&str, i64, u64)> = partitions
            .iter()
            .map(|(n, b, r)| (n.as_str(), *b, *r))
            .collect();
        state("[rk:p{n}:1000:2:3]", &refs)
    }

    #[test]
    fn test_idempotent_and_converges() {
        let before = state(
            "[rk:p{n}:1000:2:3]",
            &[("p1000", 1000, 120), ("p2000", 2000, 40)],
        );
        let first = plan_additions(&before, now()).unwrap();
        assert_eq!(first, plan_additions(&before, now()).unwrap());

        let mut after = before.clone();
        after.partitions.extend(first.iter().map(|p| PartitionRecord {
            name: p.name.to_string(),
            boundary: BoundaryValue::Value(p.boundary),
            row_estimate: 0,
            holds_rows: None,
            created_at: None,
            expression: None,
        }));
        assert!(plan_additions(&after, now()).unwrap().is_empty());
    }

    #[test]
    fn test_monotonic_above_max() {
        let state = state(
            "[rk:p{n}:250:4:3]",
            &[("p0", 0, 0), ("p250", 250, 0), ("p900", 900, 5)],
        );
        let planned = plan_additions(&state, now()).unwrap();
        assert!(!planned.is_empty());
        assert!(planned.iter().all(|p| p.boundary > 900));
        assert!(planned.windows(2).all(|w| w[0].boundary < w[1].boundary));
    }

    #[test]
    fn test_batch_ignores_lead() {
        let state = state("[rk:p{n}:500:0:3]", &[("p1000", 1000, 0)]);

        let planned = plan_batch(&state, 3, now()).unwrap();
        assert_eq!(boundaries(&planned), vec![1500, 2000, 2500]);
        assert_eq!(boundaries(&plan_next(&state, now()).unwrap()), vec![1500]);
    }

    #[test]
    fn test_numeric_table_without_partitions_starts_at_zero() {
        let state = state("[rk:p{n}:100:2:3]", &[]);
        assert_eq!(
            boundaries(&plan_additions(&state, now()).unwrap()),
            vec![100, 200]
        );
    }

    #[test]
    fn test_existing_names_are_skipped() {
        // p3000 exists under an unrelated bound.
        let state = state(
            "[rk:p{n}:1000:2:3]",
            &[("p3000", 500, 0), ("p1000", 1000, 0), ("p2000", 2000, 9)],
        );
        let planned = plan_additions(&state, now()).unwrap();
        assert_eq!(names(&planned), vec!["p4000", "p5000"]);
    }

    #[test]
    fn test_unmanaged_tables_get_nothing() {
        let mut unpartitioned = state("[rk:p{n}:1000:2:3]", &[]);
        unpartitioned.partitioned = false;
        assert!(plan_additions(&unpartitioned, now()).unwrap().is_empty());
        assert!(plan_batch(&unpartitioned, 3, now()).unwrap().is_empty());

        let no_policy = state("orders", &[("p1000", 1000, 1)]);
        assert!(plan_additions(&no_policy, now()).unwrap().is_empty());

        let absent = TableState::absent(TableRef::parse("shop.gone").unwrap());
        assert!(plan_table(&absent, now(), true).unwrap().is_empty());
    }

    #[test]
    fn test_maxvalue_blocks_additions() {
        let mut state = state("[rk:p{n}:1000:2:3]", &[("p1000", 1000, 1)]);
        state.partitions.push(PartitionRecord {
            name: "pmax".to_string(),
            boundary: BoundaryValue::MaxValue,
            row_estimate: 0,
            holds_rows: None,
            created_at: None,
            expression: None,
        });
        assert!(plan_additions(&state, now()).unwrap().is_empty());
        assert!(plan_next(&state, now()).unwrap().is_empty());
    }

    #[test]
    fn test_calendar_lead_counts_from_today() {
        let comment = "[rk:p{%Y%m%d}:1d@days:2:7]";
        let state = state(
            comment,
            &[
                ("p20240314", to_days(2024, 3, 14), 50),
                ("p20240315", to_days(2024, 3, 15), 20),
                ("p20240316", to_days(2024, 3, 16), 0),
            ],
        );

        // p20240315 takes today's rows, p20240316 is the only future partition.
        let planned = plan_additions(&state, now()).unwrap();
        assert_eq!(names(&planned), vec!["p20240317"]);
        assert_eq!(boundaries(&planned), vec![to_days(2024, 3, 17)]);
    }

    #[test]
    fn test_calendar_catches_up_to_now() {
        let state = state(
            "[rk:p{%Y%m%d}:1d:1:7]",
            &[("p20240312", to_days(2024, 3, 12), 50)],
        );

        let planned = plan_additions(&state, now()).unwrap();
        assert_eq!(
            names(&planned),
            vec!["p20240313", "p20240314", "p20240315", "p20240316"]
        );
    }

    #[test]
    fn test_calendar_table_without_partitions_starts_this_month() {
        let state = state("[rk:m{%Y%m}:1m:1:12]", &[]);
        let planned = plan_additions(&state, now()).unwrap();
        assert_eq!(names(&planned), vec!["m202404", "m202405"]);
        assert_eq!(planned[0].boundary, to_days(2024, 4, 1));
    }

    #[test]
    fn test_hourly_unix_boundaries() {
        let start = Utc
            .with_ymd_and_hms(2024, 3, 14, 15, 0, 0)
            .unwrap()
            .timestamp();
        let state = state(
            "[rk:h{%Y%m%d%H}:1h:2:24]",
            &[("h2024031415", start, 10), ("h2024031416", start + 3600, 0)],
        );
        let planned = plan_additions(&state, now()).unwrap();
        assert_eq!(names(&planned), vec!["h2024031417", "h2024031418"]);
    }

    #[test]
    fn test_plan_table_force_drop_override() {
        let state = state_with_rows_up_to(5000);
        let plan = plan_table(&state, now(), false).unwrap();
        assert_eq!(plan.removals.mode, DropMode::Individual);
        assert_eq!(plan.removals.names.len(), 2);

        let plan = plan_table(&state, now(), true).unwrap();
        assert_eq!(plan.removals.mode, DropMode::Combined);
    }
}
