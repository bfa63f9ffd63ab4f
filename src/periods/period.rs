//! An interval of time: a unit, a start instant and a size in units.
use super::instant::Instant;
use super::DateUnit;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{literal}' is not a valid period: {reason}")]
pub struct PeriodParseError {
    pub literal: String,
    pub reason: String,
}

/// An immutable time interval. Periods are cache keys, so they are `Hash + Eq`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct Period {
    pub unit: DateUnit,
    pub start: Instant,
    pub size: usize,
}

impl Period {
    pub fn new(unit: DateUnit, start: Instant, size: usize) -> Self {
        Self { unit, start, size }
    }

    pub fn year(year: i32) -> Self {
        Self::new(DateUnit::Year, Instant::new(year, 1, 1), 1)
    }

    pub fn month(year: i32, month: u32) -> Self {
        Self::new(DateUnit::Month, Instant::new(year, month, 1), 1)
    }

    pub fn day(year: i32, month: u32, day: u32) -> Self {
        Self::new(DateUnit::Day, Instant::new(year, month, day), 1)
    }

    pub fn eternity() -> Self {
        Self::new(DateUnit::Eternity, Instant::FAR_PAST, 1)
    }

    /// The last day covered by this period.
    pub fn stop(&self) -> Instant {
        if self.unit == DateUnit::Eternity {
            return Instant::FAR_FUTURE;
        }
        self.start
            .offset(self.unit, self.size as i64)
            .offset(DateUnit::Day, -1)
    }

    /// The calendar year enclosing this period's start.
    pub fn this_year(&self) -> Period {
        Period::year(self.start.year)
    }

    /// Same unit and size, start shifted by `count` units.
    pub fn offset(&self, count: i64) -> Period {
        Period::new(self.unit, self.start.offset(self.unit, count), self.size)
    }

    pub fn contains(&self, instant: Instant) -> bool {
        if self.unit == DateUnit::Eternity {
            return true;
        }
        self.start <= instant && instant <= self.stop()
    }

    /// Decomposes this period into consecutive size-1 periods of `unit`.
    ///
    /// Returns an empty vector when `unit` is coarser than this period's unit
    /// or when the period is eternal; callers check aggregation compatibility
    /// before decomposing.
    pub fn subperiods(&self, unit: DateUnit) -> Vec<Period> {
        if self.unit == DateUnit::Eternity || unit > self.unit {
            return Vec::new();
        }
        let steps = match (self.unit, unit) {
            (u, v) if u == v => self.size,
            (DateUnit::Year, DateUnit::Month) => self.size * 12,
            (DateUnit::Year, DateUnit::Day) | (DateUnit::Month, DateUnit::Day) => {
                let stop = self.start.offset(self.unit, self.size as i64);
                let mut out = Vec::new();
                let mut cursor = self.start;
                while cursor < stop {
                    out.push(Period::new(DateUnit::Day, cursor, 1));
                    cursor = cursor.offset(DateUnit::Day, 1);
                }
                return out;
            }
            _ => return Vec::new(),
        };
        (0..steps)
            .map(|i| Period::new(unit, self.start.offset(unit, i as i64), 1))
            .collect()
    }

    fn start_literal(&self) -> String {
        match self.unit {
            DateUnit::Year => format!("{:04}", self.start.year),
            DateUnit::Month => format!("{:04}-{:02}", self.start.year, self.start.month),
            _ => self.start.to_string(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit == DateUnit::Eternity {
            return f.write_str("eternity");
        }
        if self.size == 1 {
            f.write_str(&self.start_literal())
        } else {
            write!(f, "{}:{}:{}", self.unit, self.start_literal(), self.size)
        }
    }
}

impl FromStr for Period {
    type Err = PeriodParseError;

    /// Parses the compact literal forms: `"2020"`, `"2020-01"`, `"2020-01-15"`,
    /// `"eternity"`, and the explicit `"unit:start[:size]"` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| PeriodParseError {
            literal: s.to_string(),
            reason: reason.to_string(),
        };

        if s == "eternity" {
            return Ok(Period::eternity());
        }

        let (unit_hint, date_part, size) = match s.split(':').collect::<Vec<_>>()[..] {
            [date] => (None, date, 1),
            [unit, date] => (Some(unit.parse::<DateUnit>()?), date, 1),
            [unit, date, size] => {
                let size: usize = size
                    .parse()
                    .map_err(|_| fail("size must be a positive integer"))?;
                if size == 0 {
                    return Err(fail("size must be a positive integer"));
                }
                (Some(unit.parse::<DateUnit>()?), date, size)
            }
            _ => return Err(fail("too many ':' separators")),
        };

        let fields: Vec<&str> = date_part.split('-').collect();
        let (unit, start) = match fields[..] {
            [y] => {
                let year = y.parse().map_err(|_| fail("bad year"))?;
                (DateUnit::Year, Instant::new(year, 1, 1))
            }
            [y, m] => {
                let year = y.parse().map_err(|_| fail("bad year"))?;
                let month: u32 = m.parse().map_err(|_| fail("bad month"))?;
                if !(1..=12).contains(&month) {
                    return Err(fail("month must be in 1..=12"));
                }
                (DateUnit::Month, Instant::new(year, month, 1))
            }
            [y, m, d] => {
                let year = y.parse().map_err(|_| fail("bad year"))?;
                let month: u32 = m.parse().map_err(|_| fail("bad month"))?;
                let day: u32 = d.parse().map_err(|_| fail("bad day"))?;
                if !(1..=12).contains(&month) {
                    return Err(fail("month must be in 1..=12"));
                }
                if day == 0 || day > super::instant::days_in_month(year, month) {
                    return Err(fail("day out of range for month"));
                }
                (DateUnit::Day, Instant::new(year, month, day))
            }
            _ => return Err(fail("expected YYYY, YYYY-MM or YYYY-MM-DD")),
        };

        // An explicit unit may be coarser than the date literal implies
        // ("year:2020-01" is the year starting in January), never finer.
        if let Some(hint) = unit_hint {
            if hint < unit {
                return Err(fail("unit is finer than the start literal"));
            }
            return Ok(Period::new(hint, start, size));
        }
        Ok(Period::new(unit, start, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2020", Period::year(2020))]
    #[case("2020-06", Period::month(2020, 6))]
    #[case("2020-06-15", Period::day(2020, 6, 15))]
    #[case("eternity", Period::eternity())]
    #[case("month:2020-01:3", Period::new(DateUnit::Month, Instant::new(2020, 1, 1), 3))]
    #[case("year:2019:2", Period::new(DateUnit::Year, Instant::new(2019, 1, 1), 2))]
    fn test_parse_valid(#[case] literal: &str, #[case] expected: Period) {
        assert_eq!(literal.parse::<Period>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("2020-13")]
    #[case("2020-02-30")]
    #[case("week:2020")]
    #[case("month:2020-01:0")]
    #[case("day:2020:1:1:1")]
    fn test_parse_invalid(#[case] literal: &str) {
        assert!(literal.parse::<Period>().is_err(), "should fail: '{}'", literal);
    }

    #[test]
    fn test_display_roundtrip() {
        for literal in ["2020", "2020-06", "2020-06-15", "eternity", "month:2020-01:3"] {
            let period: Period = literal.parse().unwrap();
            assert_eq!(period.to_string(), literal);
        }
    }

    #[test]
    fn test_year_decomposes_into_twelve_months() {
        let subs = Period::year(2020).subperiods(DateUnit::Month);
        assert_eq!(subs.len(), 12);
        assert_eq!(subs[0], Period::month(2020, 1));
        assert_eq!(subs[11], Period::month(2020, 12));
    }

    #[test]
    fn test_month_decomposes_into_days() {
        assert_eq!(Period::month(2020, 2).subperiods(DateUnit::Day).len(), 29);
        assert_eq!(Period::month(2021, 2).subperiods(DateUnit::Day).len(), 28);
    }

    #[test]
    fn test_multi_month_decomposes_into_months() {
        let quarter = Period::new(DateUnit::Month, Instant::new(2020, 11, 1), 3);
        let subs = quarter.subperiods(DateUnit::Month);
        assert_eq!(
            subs,
            vec![Period::month(2020, 11), Period::month(2020, 12), Period::month(2021, 1)]
        );
    }

    #[test]
    fn test_coarser_subperiod_request_is_empty() {
        assert!(Period::month(2020, 1).subperiods(DateUnit::Year).is_empty());
        assert!(Period::eternity().subperiods(DateUnit::Month).is_empty());
    }

    #[test]
    fn test_stop_and_contains() {
        let q = Period::new(DateUnit::Month, Instant::new(2020, 1, 1), 3);
        assert_eq!(q.stop(), Instant::new(2020, 3, 31));
        assert!(q.contains(Instant::new(2020, 2, 14)));
        assert!(!q.contains(Instant::new(2020, 4, 1)));
        assert!(Period::eternity().contains(Instant::new(1900, 1, 1)));
    }

    #[test]
    fn test_this_year_and_offset() {
        assert_eq!(Period::month(2020, 6).this_year(), Period::year(2020));
        assert_eq!(Period::month(2020, 1).offset(-1), Period::month(2019, 12));
        assert_eq!(Period::year(2020).offset(2), Period::year(2022));
    }
}
