//! Instant and period value types, and the period algebra the engine relies on.
pub mod instant;
pub mod period;

pub use instant::Instant;
pub use period::{Period, PeriodParseError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity of a period. The derived ordering is by coarseness
/// (`Day < Month < Year < Eternity`), which is what the aggregation
/// checks compare.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DateUnit {
    Day,
    Month,
    Year,
    Eternity,
}

impl fmt::Display for DateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            DateUnit::Day => "day",
            DateUnit::Month => "month",
            DateUnit::Year => "year",
            DateUnit::Eternity => "eternity",
        };
        f.write_str(tag)
    }
}

impl FromStr for DateUnit {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(DateUnit::Day),
            "month" => Ok(DateUnit::Month),
            "year" => Ok(DateUnit::Year),
            "eternity" => Ok(DateUnit::Eternity),
            other => Err(PeriodParseError {
                literal: other.to_string(),
                reason: "unknown date unit".to_string(),
            }),
        }
    }
}

/// Coercion from period-like values. The engine entry points accept either a
/// ready-made [`Period`] or a compact literal such as `"2020-01"`.
pub trait IntoPeriod {
    fn into_period(self) -> Result<Period, PeriodParseError>;
}

impl IntoPeriod for Period {
    fn into_period(self) -> Result<Period, PeriodParseError> {
        Ok(self)
    }
}

impl IntoPeriod for &Period {
    fn into_period(self) -> Result<Period, PeriodParseError> {
        Ok(*self)
    }
}

impl IntoPeriod for &str {
    fn into_period(self) -> Result<Period, PeriodParseError> {
        self.parse()
    }
}

impl IntoPeriod for &String {
    fn into_period(self) -> Result<Period, PeriodParseError> {
        self.parse()
    }
}
