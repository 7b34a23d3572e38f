use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;
use topline_core::{AccountNumber, AmountParseError, ContributorId, Money, RawTransaction};

/// Layout of an offline backfill file. Columns are fixed:
/// `date, description, reference, fee, amount, contributor_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillProfile {
    pub has_header: bool,
    pub delimiter: String,
    pub date_format: String,
}

impl Default for BackfillProfile {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: ",".to_string(),
            date_format: "%d %b %Y".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackfillRow {
    pub date: NaiveDate,
    pub description: String,
    pub reference: String,
    pub fee: String,
    pub amount: Money,
    /// Contributor the row is already known to belong to.
    pub contributor: Option<ContributorId>,
}

impl BackfillRow {
    pub fn into_raw(self, account: AccountNumber) -> RawTransaction {
        RawTransaction {
            account,
            date: self.date,
            description: self.description,
            reference: self.reference,
            fee: self.fee,
            amount: self.amount,
            balance: Money::zero(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Line {line}: missing column {column}")]
    MissingColumn { line: u64, column: &'static str },
    #[error("Line {line}: invalid date '{value}'")]
    InvalidDate { line: u64, value: String },
    #[error("Line {line}: {source}")]
    InvalidAmount { line: u64, source: AmountParseError },
    #[error("Line {line}: invalid contributor id '{value}'")]
    InvalidContributor { line: u64, value: String },
    #[error("No data rows")]
    NoDataRows,
}

const COLUMNS: [&str; 6] = [
    "date",
    "description",
    "reference",
    "fee",
    "amount",
    "contributor_id",
];

pub fn import_backfill<R: Read>(
    data: R,
    profile: &BackfillProfile,
) -> Result<Vec<BackfillRow>, CsvError> {
    let delimiter = profile
        .delimiter
        .as_bytes()
        .first()
        .copied()
        .unwrap_or(b',');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(profile.has_header)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(data);

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let field = |index: usize| {
            record
                .get(index)
                .map(str::trim)
                .ok_or(CsvError::MissingColumn {
                    line,
                    column: COLUMNS[index],
                })
        };

        let date = parse_date(field(0)?, &profile.date_format).ok_or_else(|| {
            CsvError::InvalidDate {
                line,
                value: record.get(0).unwrap_or_default().to_string(),
            }
        })?;
        let amount = Money::parse_statement(field(4)?)
            .map_err(|source| CsvError::InvalidAmount { line, source })?;
        let contributor = match record.get(5).map(str::trim).filter(|s| !s.is_empty()) {
            Some(value) => Some(ContributorId(value.parse().map_err(|_| {
                CsvError::InvalidContributor {
                    line,
                    value: value.to_string(),
                }
            })?)),
            None => None,
        };

        rows.push(BackfillRow {
            date,
            description: field(1)?.to_string(),
            reference: record.get(2).unwrap_or_default().trim().to_string(),
            fee: record.get(3).unwrap_or_default().trim().to_string(),
            amount,
            contributor,
        });
    }

    if rows.is_empty() {
        return Err(CsvError::NoDataRows);
    }
    tracing::debug!("Read {} backfill rows", rows.len());
    Ok(rows)
}

fn parse_date(s: &str, format: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, format) {
        return Some(date);
    }
    ["%d %b %Y", "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
