//! A single point in time, with Gregorian calendar arithmetic.
use super::DateUnit;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Instant {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl Instant {
    /// Sentinel used for open-ended validity ranges. Never fed to `offset`.
    pub const FAR_PAST: Instant = Instant { year: -9999, month: 1, day: 1 };
    pub const FAR_FUTURE: Instant = Instant { year: 9999, month: 12, day: 31 };

    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Shifts this instant by `count` units.
    ///
    /// Month and year offsets clamp the day to the end of the target month
    /// (e.g. Jan 31 + 1 month = Feb 28/29). Day offsets use exact civil-day
    /// arithmetic. An eternity offset is the identity.
    pub fn offset(&self, unit: DateUnit, count: i64) -> Instant {
        match unit {
            DateUnit::Day => {
                let days = days_from_civil(self.year, self.month, self.day) + count;
                let (year, month, day) = civil_from_days(days);
                Instant { year, month, day }
            }
            DateUnit::Month => {
                let total = self.year as i64 * 12 + (self.month as i64 - 1) + count;
                let year = total.div_euclid(12) as i32;
                let month = (total.rem_euclid(12) + 1) as u32;
                let day = self.day.min(days_in_month(year, month));
                Instant { year, month, day }
            }
            DateUnit::Year => {
                let year = self.year + count as i32;
                let day = self.day.min(days_in_month(year, self.month));
                Instant { year, month: self.month, day }
            }
            DateUnit::Eternity => *self,
        }
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

pub(crate) fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        _ => 28,
    }
}

// Civil-date <-> day-number conversions (proleptic Gregorian, epoch 1970-01-01).
fn days_from_civil(y: i32, m: u32, d: u32) -> i64 {
    let y = (y - if m <= 2 { 1 } else { 0 }) as i64;
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = if m > 2 { m - 3 } else { m + 9 } as i64;
    let doy = (153 * mp + 2) / 5 + d as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

fn civil_from_days(z: i64) -> (i32, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    ((y + if m <= 2 { 1 } else { 0 }) as i32, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_offset_crosses_month_and_year() {
        let i = Instant::new(2020, 12, 31);
        assert_eq!(i.offset(DateUnit::Day, 1), Instant::new(2021, 1, 1));
        assert_eq!(i.offset(DateUnit::Day, -31), Instant::new(2020, 11, 30));
    }

    #[test]
    fn test_day_offset_handles_leap_february() {
        let i = Instant::new(2020, 2, 28);
        assert_eq!(i.offset(DateUnit::Day, 1), Instant::new(2020, 2, 29));
        assert_eq!(i.offset(DateUnit::Day, 2), Instant::new(2020, 3, 1));
    }

    #[test]
    fn test_month_offset_wraps_year() {
        let i = Instant::new(2020, 11, 1);
        assert_eq!(i.offset(DateUnit::Month, 3), Instant::new(2021, 2, 1));
        assert_eq!(i.offset(DateUnit::Month, -11), Instant::new(2019, 12, 1));
    }

    #[test]
    fn test_month_offset_clamps_day() {
        let i = Instant::new(2020, 1, 31);
        assert_eq!(i.offset(DateUnit::Month, 1), Instant::new(2020, 2, 29));
    }

    #[test]
    fn test_year_offset_clamps_leap_day() {
        let i = Instant::new(2020, 2, 29);
        assert_eq!(i.offset(DateUnit::Year, 1), Instant::new(2021, 2, 28));
    }

    #[test]
    fn test_ordering_is_calendar_order() {
        assert!(Instant::new(2019, 12, 31) < Instant::new(2020, 1, 1));
        assert!(Instant::new(2020, 1, 2) < Instant::new(2020, 2, 1));
    }

    #[test]
    fn test_civil_roundtrip() {
        for &(y, m, d) in &[(1970, 1, 1), (2000, 2, 29), (2024, 12, 31), (1899, 3, 15)] {
            let days = days_from_civil(y, m, d);
            assert_eq!(civil_from_days(days), (y, m, d));
        }
    }
}
