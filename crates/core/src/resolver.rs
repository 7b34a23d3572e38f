//! Reference resolution: which contributor paid, and for which month.
//!
//! Each step yields a [`Step`] instead of failing outright, and the fallback
//! chain is spelled out in [`ReferenceResolver::resolve_period`]:
//!
//! 1. contributor: exactly one handle must match, anything else rejects;
//! 2. month: a single textual month, else the month of the transaction date;
//! 3. year: a single numeric token, else the year of the transaction date;
//! 4. date-carry: a period lagging the transaction by roughly whole years is
//!    moved forward by that many years.

use chrono::{Datelike, NaiveDate};
use std::fmt;
use thiserror::Error;

use crate::contributor::{Contributor, ContributorDirectory, ContributorId};
use crate::months::MonthCatalog;
use crate::period::Period;
use crate::tokenizer::{tokenize, Token};

pub const DEFAULT_MIN_TOKENS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Reference has {found} tokens, at least {required} required")]
    InsufficientTokens { found: usize, required: usize },
    #[error("No contributor handle in reference")]
    NoContributor,
    #[error("Reference names several contributors: {}", .0.join(", "))]
    AmbiguousContributor(Vec<String>),
    #[error("No month in reference or transaction date")]
    NoMonth,
    #[error("Reference names several months: {0:?}")]
    AmbiguousMonth(Vec<u32>),
    #[error("No single year in reference")]
    NoYear,
}

/// Outcome of one resolution step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Matched(T),
    Ambiguous(Vec<T>),
    Absent,
}

impl<T> Step<T> {
    fn from_candidates(mut candidates: Vec<T>) -> Self {
        match candidates.len() {
            0 => Step::Absent,
            1 => Step::Matched(candidates.remove(0)),
            _ => Step::Ambiguous(candidates),
        }
    }

    pub fn matched(self) -> Option<T> {
        match self {
            Step::Matched(value) => Some(value),
            _ => None,
        }
    }
}

/// Where a resolved month or year came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Reference,
    TransactionDate,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Reference => write!(f, "reference"),
            Source::TransactionDate => write!(f, "transaction date"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPeriod {
    pub period: Period,
    pub month_source: Source,
    pub year_source: Source,
    /// Years added by the date-carry correction.
    pub carried_years: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub contributor: ContributorId,
    pub handle: String,
    pub period: ResolvedPeriod,
}

/// Every distinct non-house contributor named by the tokens.
pub fn match_contributor<'a>(
    tokens: &[Token],
    directory: &'a ContributorDirectory,
) -> Step<&'a Contributor> {
    Step::from_candidates(directory.matches(tokens))
}

/// Distinct months named by any token, in calendar order.
pub fn match_month(tokens: &[Token], months: &MonthCatalog) -> Step<u32> {
    let mut found: Vec<u32> = tokens.iter().filter_map(|t| months.month_of_token(t)).collect();
    found.sort_unstable();
    found.dedup();
    Step::from_candidates(found)
}

/// The month named in the statement form of the date (`"15 Aug 2017"` -> `AUG`).
pub fn month_from_date(date: NaiveDate, months: &MonthCatalog) -> Step<u32> {
    let tokens = tokenize(&date.format("%d %b %Y").to_string());
    match tokens.get(1).and_then(|t| months.month_of_token(t)) {
        Some(month) => Step::Matched(month),
        None => Step::Absent,
    }
}

/// A lone numeric token read as a year. Four-digit tokens are taken as
/// written; anything else is a two-digit year in the century of `date`.
pub fn match_year(tokens: &[Token], date: NaiveDate) -> Step<i32> {
    let century = date.year() - date.year().rem_euclid(100);
    let years = tokens
        .iter()
        .filter_map(Token::as_number)
        .map(|n| match n {
            1000..=9999 => n as i32,
            _ => century + (n % 100) as i32,
        })
        .collect();
    Step::from_candidates(years)
}

/// Moves `resolved` forward by its lag behind `actual`, rounded to whole years
/// with exact half-years going to the even count: a 6-month lag stays, 18 months
/// moves two years. A lag of 7 to 11 months moves one year, which can put the
/// period after `actual`. Periods at or ahead of `actual` are returned unchanged.
pub fn carry_year(resolved: Period, actual: Period) -> (Period, i32) {
    let lag = resolved.months_until(actual);
    if lag <= 0 {
        return (resolved, 0);
    }
    let (years, rest) = (lag / 12, lag % 12);
    let offset = if rest > 6 || (rest == 6 && years % 2 == 1) {
        years + 1
    } else {
        years
    };
    if offset > 0 {
        tracing::debug!(%resolved, offset, "date-carry correction");
    }
    (resolved.with_year(resolved.year + offset), offset)
}

#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    months: MonthCatalog,
    min_tokens: usize,
}

impl Default for ReferenceResolver {
    fn default() -> Self {
        ReferenceResolver::new(MonthCatalog::default(), DEFAULT_MIN_TOKENS)
    }
}

impl ReferenceResolver {
    pub fn new(months: MonthCatalog, min_tokens: usize) -> Self {
        Self { months, min_tokens }
    }

    pub fn months(&self) -> &MonthCatalog {
        &self.months
    }

    pub fn resolve(
        &self,
        tokens: &[Token],
        date: NaiveDate,
        directory: &ContributorDirectory,
    ) -> Result<Resolution, ResolveError> {
        if tokens.len() < self.min_tokens {
            return Err(ResolveError::InsufficientTokens {
                found: tokens.len(),
                required: self.min_tokens,
            });
        }

        let contributor = match match_contributor(tokens, directory) {
            Step::Matched(c) => c,
            Step::Absent => return Err(ResolveError::NoContributor),
            Step::Ambiguous(all) => {
                return Err(ResolveError::AmbiguousContributor(
                    all.into_iter().map(|c| c.primary_handle.clone()).collect(),
                ))
            }
        };

        let period = self.resolve_period(tokens, date)?;
        Ok(Resolution {
            contributor: contributor.id,
            handle: contributor.primary_handle.clone(),
            period,
        })
    }

    /// Steps 2–4 only; also used when the contributor is already known.
    pub fn resolve_period(
        &self,
        tokens: &[Token],
        date: NaiveDate,
    ) -> Result<ResolvedPeriod, ResolveError> {
        let (month, month_source) = match match_month(tokens, &self.months) {
            Step::Matched(m) => (m, Source::Reference),
            other => {
                if let Step::Ambiguous(months) = other {
                    tracing::debug!(
                        "{}; using transaction date",
                        ResolveError::AmbiguousMonth(months)
                    );
                }
                let month = month_from_date(date, &self.months)
                    .matched()
                    .ok_or(ResolveError::NoMonth)?;
                (month, Source::TransactionDate)
            }
        };

        let (year, year_source) = match match_year(tokens, date) {
            Step::Matched(y) => (y, Source::Reference),
            _ => {
                tracing::trace!("{}; using transaction date", ResolveError::NoYear);
                (date.year(), Source::TransactionDate)
            }
        };

        let declared = Period::new(month, year).ok_or(ResolveError::NoMonth)?;
        let (period, carried_years) = carry_year(declared, Period::of(date));
        Ok(ResolvedPeriod {
            period,
            month_source,
            year_source,
            carried_years,
        })
    }
}
