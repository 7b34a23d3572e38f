//! Statement feed: the per-account output of the acquisition step, as JSON.
//!
//! ```json
//! {"accounts": [{"number": 62000000001, "name": "Gold Cheque Account",
//!   "balance": "12,450.00",
//!   "transactions": [["15 Aug 2017", "FNB APP PAYMENT", "AA AUG 17", "", "1,500.00", "12,450.00"]]}]}
//! ```
//!
//! Transactions are listed newest first, as the bank shows them.

use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use topline_core::{AccountNumber, AmountParseError, Money, RawTransaction};

pub const STATEMENT_DATE_FORMAT: &str = "%d %b %Y";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid feed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Account {account}, line {line}: expected at least 5 fields, got {found}")]
    ShortLine {
        account: AccountNumber,
        line: usize,
        found: usize,
    },
    #[error("Account {account}, line {line}: invalid date '{value}'")]
    InvalidDate {
        account: AccountNumber,
        line: usize,
        value: String,
    },
    #[error("Account {account}: {source}")]
    InvalidAmount {
        account: AccountNumber,
        source: AmountParseError,
    },
}

#[derive(Deserialize)]
struct FeedFile {
    accounts: Vec<FeedAccount>,
}

#[derive(Deserialize)]
struct FeedAccount {
    number: i64,
    name: String,
    balance: String,
    #[serde(default)]
    transactions: Vec<Vec<String>>,
}

/// One account as fetched: its current balance and its transactions in
/// acquisition order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub number: AccountNumber,
    pub name: String,
    pub balance: Money,
    pub transactions: Vec<RawTransaction>,
}

impl Statement {
    /// Oldest first, the order reconciliation applies them in.
    pub fn chronological(&self) -> impl Iterator<Item = &RawTransaction> {
        self.transactions.iter().rev()
    }
}

pub fn load_feed(path: &Path) -> Result<Vec<Statement>, FeedError> {
    let file = std::fs::File::open(path).map_err(|source| FeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_feed(std::io::BufReader::new(file))
}

pub fn parse_feed<R: Read>(reader: R) -> Result<Vec<Statement>, FeedError> {
    let feed: FeedFile = serde_json::from_reader(reader)?;
    feed.accounts.into_iter().map(statement).collect()
}

fn statement(account: FeedAccount) -> Result<Statement, FeedError> {
    let number = AccountNumber(account.number);
    let amount = |s: &str| {
        Money::parse_statement(s).map_err(|source| FeedError::InvalidAmount {
            account: number,
            source,
        })
    };

    let transactions = account
        .transactions
        .iter()
        .enumerate()
        .map(|(index, fields)| {
            let line = index + 1;
            if fields.len() < 5 {
                return Err(FeedError::ShortLine {
                    account: number,
                    line,
                    found: fields.len(),
                });
            }
            let date = NaiveDate::parse_from_str(fields[0].trim(), STATEMENT_DATE_FORMAT)
                .map_err(|_| FeedError::InvalidDate {
                    account: number,
                    line,
                    value: fields[0].clone(),
                })?;
            let balance = match fields.get(5).filter(|s| !s.trim().is_empty()) {
                Some(b) => amount(b)?,
                None => Money::zero(),
            };
            Ok(RawTransaction {
                account: number,
                date,
                description: fields[1].clone(),
                reference: fields[2].clone(),
                fee: fields[3].clone(),
                amount: amount(&fields[4])?,
                balance,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(account = %number, count = transactions.len(), "statement read");
    Ok(Statement {
        number,
        balance: amount(&account.balance)?,
        name: account.name,
        transactions,
    })
}
