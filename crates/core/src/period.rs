use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A contribution month. Ordered chronologically (year first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Period { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Period {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Signed number of months from `self` to `later`; positive when `later` is after `self`.
    pub fn months_until(self, later: Period) -> i32 {
        (later.year - self.year) * 12 + (later.month as i32 - self.month as i32)
    }

    pub fn with_year(self, year: i32) -> Self {
        Period { year, ..self }
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = (self.month as usize)
            .checked_sub(1)
            .and_then(|i| MONTH_ABBREVIATIONS.get(i))
            .copied()
            .unwrap_or("???");
        write!(f, "{} {}", name, self.year)
    }
}

/// Inclusive span of contribution months, e.g. the coverage of one report page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRange {
    pub start: Period,
    pub end: Period,
}

impl fmt::Display for PeriodRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl PeriodRange {
    pub fn new(start: Period, end: Period) -> Self {
        PeriodRange { start, end }
    }

    pub fn contains(self, period: Period) -> bool {
        period >= self.start && period <= self.end
    }
}
