//! Distance between consecutive partition boundaries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use serde::{Serialize, Serializer};

use super::PolicyError;

/// Offset between `TO_DAYS()` and chrono's days-from-CE count.
const TO_DAYS_OFFSET: i64 = 365;

/// Calendar unit of a time-based step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarUnit {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl CalendarUnit {
    pub fn symbol(&self) -> char {
        match self {
            CalendarUnit::Hour => 'h',
            CalendarUnit::Day => 'd',
            CalendarUnit::Week => 'w',
            CalendarUnit::Month => 'm',
            CalendarUnit::Year => 'y',
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "h" => Some(CalendarUnit::Hour),
            "d" => Some(CalendarUnit::Day),
            "w" => Some(CalendarUnit::Week),
            "m" => Some(CalendarUnit::Month),
            "y" => Some(CalendarUnit::Year),
            _ => None,
        }
    }

    /// Start of the unit containing `at`.
    fn truncate(&self, at: NaiveDateTime) -> Option<NaiveDateTime> {
        let date = at.date();
        let start = match self {
            CalendarUnit::Hour => return date.and_hms_opt(at.time().hour(), 0, 0),
            CalendarUnit::Day => date,
            CalendarUnit::Week => {
                date - TimeDelta::days(i64::from(date.weekday().num_days_from_monday()))
            }
            CalendarUnit::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?,
            CalendarUnit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)?,
        };
        start.and_hms_opt(0, 0, 0)
    }
}

/// How a point in time is stored as a partition bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryRepr {
    /// `TO_DAYS(col)`: days since year 0
    Days,
    /// `UNIX_TIMESTAMP(col)`: seconds since the epoch, UTC
    Unix,
}

impl BoundaryRepr {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundaryRepr::Days => "days",
            BoundaryRepr::Unix => "unix",
        }
    }

    /// Point in time a bound value denotes.
    pub fn to_datetime(&self, value: i64) -> Option<NaiveDateTime> {
        match self {
            BoundaryRepr::Days => {
                let days = i32::try_from(value.checked_sub(TO_DAYS_OFFSET)?).ok()?;
                NaiveDate::from_num_days_from_ce_opt(days)?.and_hms_opt(0, 0, 0)
            }
            BoundaryRepr::Unix => DateTime::from_timestamp(value, 0).map(|dt| dt.naive_utc()),
        }
    }

    /// Bound value of a point in time. `Days` truncates to midnight.
    pub fn from_datetime(&self, at: NaiveDateTime) -> i64 {
        match self {
            BoundaryRepr::Days => i64::from(at.date().num_days_from_ce()) + TO_DAYS_OFFSET,
            BoundaryRepr::Unix => at.and_utc().timestamp(),
        }
    }
}

/// Step between successive partition boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryStep {
    /// Fixed integer increment over a numeric partitioning expression
    Numeric(i64),
    /// Calendar increment over a time-derived partitioning expression
    Calendar {
        count: u32,
        unit: CalendarUnit,
        repr: BoundaryRepr,
    },
}

impl BoundaryStep {
    pub fn numeric(step: i64) -> Result<Self, PolicyError> {
        let step = BoundaryStep::Numeric(step);
        step.validate()?;
        Ok(step)
    }

    pub fn calendar(
        count: u32,
        unit: CalendarUnit,
        repr: BoundaryRepr,
    ) -> Result<Self, PolicyError> {
        let step = BoundaryStep::Calendar { count, unit, repr };
        step.validate()?;
        Ok(step)
    }

    /// Reject steps that do not move the boundary forward or that the
    /// representation cannot express.
    pub fn validate(&self) -> Result<(), PolicyError> {
        match *self {
            BoundaryStep::Numeric(step) if step <= 0 => Err(PolicyError::InvalidStep(format!(
                "numeric step must be positive, got {step}"
            ))),
            BoundaryStep::Calendar { count: 0, .. } => Err(PolicyError::InvalidStep(
                "calendar step count must be at least 1".to_string(),
            )),
            BoundaryStep::Calendar {
                unit: CalendarUnit::Hour,
                repr: BoundaryRepr::Days,
                ..
            } => Err(PolicyError::InvalidStep(
                "hourly steps need unix boundaries, TO_DAYS cannot express hours".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn is_calendar(&self) -> bool {
        matches!(self, BoundaryStep::Calendar { .. })
    }

    /// Boundary representation for calendar steps.
    pub fn repr(&self) -> Option<BoundaryRepr> {
        match self {
            BoundaryStep::Numeric(_) => None,
            BoundaryStep::Calendar { repr, .. } => Some(*repr),
        }
    }

    /// The boundary one step above `boundary`, `None` when it cannot be
    /// represented.
    pub fn advance(&self, boundary: i64) -> Option<i64> {
        match *self {
            BoundaryStep::Numeric(step) => boundary.checked_add(step),
            BoundaryStep::Calendar { count, unit, repr } => {
                let at = repr.to_datetime(boundary)?;
                let next = match unit {
                    CalendarUnit::Hour => {
                        at.checked_add_signed(TimeDelta::hours(i64::from(count)))?
                    }
                    CalendarUnit::Day => {
                        at.checked_add_signed(TimeDelta::days(i64::from(count)))?
                    }
                    CalendarUnit::Week => {
                        at.checked_add_signed(TimeDelta::weeks(i64::from(count)))?
                    }
                    CalendarUnit::Month => at.checked_add_months(Months::new(count))?,
                    CalendarUnit::Year => {
                        at.checked_add_months(Months::new(count.checked_mul(12)?))?
                    }
                };
                Some(repr.from_datetime(next))
            }
        }
    }

    /// Where stepping starts for a table without partitions: zero for
    /// numeric steps, the start of the current unit for calendar steps.
    pub fn floor(&self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            BoundaryStep::Numeric(_) => Some(0),
            BoundaryStep::Calendar { unit, repr, .. } => {
                Some(repr.from_datetime(unit.truncate(now.naive_utc())?))
            }
        }
    }

    /// `now` expressed as a bound value. Numeric steps have no time axis.
    pub fn watermark(&self, now: DateTime<Utc>) -> Option<i64> {
        self.repr().map(|repr| repr.from_datetime(now.naive_utc()))
    }
}

impl fmt::Display for BoundaryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryStep::Numeric(step) => write!(f, "{step}"),
            BoundaryStep::Calendar { count, unit, repr } => {
                write!(f, "{count}{}@{}", unit.symbol(), repr.as_str())
            }
        }
    }
}

impl FromStr for BoundaryStep {
    type Err = PolicyError;

    /// Accepts `1000`, `1d`, `1d@days`, `6h@unix`, `1m@unix`. Without `@`,
    /// hourly steps use unix boundaries and all other units `TO_DAYS`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            let step = s
                .parse::<i64>()
                .map_err(|e| PolicyError::InvalidStep(format!("'{s}': {e}")))?;
            return BoundaryStep::numeric(step);
        }

        let (head, repr) = match s.split_once('@') {
            Some((head, "days")) => (head, Some(BoundaryRepr::Days)),
            Some((head, "unix")) => (head, Some(BoundaryRepr::Unix)),
            Some((_, other)) => {
                return Err(PolicyError::InvalidStep(format!(
                    "unknown boundary representation '{other}', expected 'days' or 'unix'"
                )));
            }
            None => (s, None),
        };

        let split = head
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| PolicyError::InvalidStep(format!("'{s}' has no unit")))?;
        let (count, symbol) = head.split_at(split);
        let count = count
            .parse::<u32>()
            .map_err(|_| PolicyError::InvalidStep(format!("'{s}' has no valid count")))?;
        let unit = CalendarUnit::from_symbol(symbol).ok_or_else(|| {
            PolicyError::InvalidStep(format!("unknown unit '{symbol}', expected one of h d w m y"))
        })?;
        let repr = repr.unwrap_or(match unit {
            CalendarUnit::Hour => BoundaryRepr::Unix,
            _ => BoundaryRepr::Days,
        });

        BoundaryStep::calendar(count, unit, repr)
    }
}

impl Serialize for BoundaryStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn to_days(y: i32, m: u32, d: u32) -> i64 {
        let midnight = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        BoundaryRepr::Days.from_datetime(midnight)
    }

    #[test]
    fn test_to_days_matches_mysql() {
        // SELECT TO_DAYS('2024-01-01') = 739251
        assert_eq!(to_days(2024, 1, 1), 739251);
        assert_eq!(
            BoundaryRepr::Days.to_datetime(739251).unwrap().date(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_parse_steps() {
        assert_eq!("1000".parse::<BoundaryStep>().unwrap(), BoundaryStep::Numeric(1000));
        assert_eq!(
            "1d".parse::<BoundaryStep>().unwrap(),
            BoundaryStep::Calendar {
                count: 1,
                unit: CalendarUnit::Day,
                repr: BoundaryRepr::Days
            }
        );
        assert_eq!(
            "6h".parse::<BoundaryStep>().unwrap(),
            BoundaryStep::Calendar {
                count: 6,
                unit: CalendarUnit::Hour,
                repr: BoundaryRepr::Unix
            }
        );
        assert_eq!("1m@unix".parse::<BoundaryStep>().unwrap().to_string(), "1m@unix");

        for bad in ["0", "-5", "", "d", "0d", "1x", "1h@days", "1d@epoch", "1.5d"] {
            assert!(bad.parse::<BoundaryStep>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_advance_calendar() {
        let daily: BoundaryStep = "1d@days".parse().unwrap();
        assert_eq!(daily.advance(to_days(2024, 2, 28)), Some(to_days(2024, 2, 29)));

        let monthly: BoundaryStep = "1m".parse().unwrap();
        assert_eq!(monthly.advance(to_days(2024, 1, 1)), Some(to_days(2024, 2, 1)));

        let yearly: BoundaryStep = "1y@unix".parse().unwrap();
        let start = utc(2024, 1, 1, 0).timestamp();
        assert_eq!(yearly.advance(start), Some(utc(2025, 1, 1, 0).timestamp()));

        let hourly: BoundaryStep = "6h".parse().unwrap();
        assert_eq!(hourly.advance(start), Some(start + 6 * 3600));
    }

    #[test]
    fn test_advance_numeric_overflow() {
        assert_eq!(BoundaryStep::Numeric(10).advance(i64::MAX - 5), None);
    }

    #[test]
    fn test_floor_and_watermark() {
        let now = utc(2024, 3, 14, 15); // a Thursday

        assert_eq!(BoundaryStep::Numeric(100).floor(now), Some(0));
        assert_eq!(BoundaryStep::Numeric(100).watermark(now), None);

        let weekly: BoundaryStep = "1w".parse().unwrap();
        assert_eq!(weekly.floor(now), Some(to_days(2024, 3, 11)));

        let monthly: BoundaryStep = "1m".parse().unwrap();
        assert_eq!(monthly.floor(now), Some(to_days(2024, 3, 1)));
        assert_eq!(monthly.watermark(now), Some(to_days(2024, 3, 14)));

        let hourly: BoundaryStep = "1h".parse().unwrap();
        assert_eq!(hourly.floor(now), Some(now.timestamp()));
    }
}
