use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::AccountNumber;
use crate::contributor::ContributorId;
use crate::money::Money;
use crate::period::Period;
use crate::resolver::ResolveError;

/// One statement line as delivered by the acquisition side. Never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub account: AccountNumber,
    pub date: NaiveDate,
    pub description: String,
    pub reference: String,
    pub fee: String,
    pub amount: Money,
    pub balance: Money,
}

impl RawTransaction {
    pub fn key(&self) -> TransactionKey {
        TransactionKey {
            account: self.account,
            date: self.date,
            description: self.description.clone(),
            reference: self.reference.clone(),
            amount: self.amount,
        }
    }
}

/// The ledger's only deduplication key. Transfers differing in any one field are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionKey {
    pub account: AccountNumber,
    pub date: NaiveDate,
    pub description: String,
    pub reference: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Contribution,
    Expense,
    Roi,
    Unknown,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Contribution => write!(f, "contribution"),
            TransactionType::Expense => write!(f, "expense"),
            TransactionType::Roi => write!(f, "roi"),
            TransactionType::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contribution" => Ok(TransactionType::Contribution),
            "expense" => Ok(TransactionType::Expense),
            "roi" => Ok(TransactionType::Roi),
            "unknown" => Ok(TransactionType::Unknown),
            other => Err(format!("Unknown transaction type: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub contributor: ContributorId,
    pub handle: String,
}

/// A statement line after resolution and classification. Lives for one
/// transaction's processing only; the ledger and report receive its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTransaction {
    pub raw: RawTransaction,
    pub kind: TransactionType,
    pub attribution: Option<Attribution>,
    pub period: Option<Period>,
    /// Why reference resolution failed, kept for operator logs.
    pub rejection: Option<ResolveError>,
}

impl ResolvedTransaction {
    pub fn is_unknown(&self) -> bool {
        self.kind == TransactionType::Unknown
    }

    pub fn contributor_id(&self) -> Option<ContributorId> {
        self.attribution.as_ref().map(|a| a.contributor)
    }

    /// Short human-readable line used for report cell annotations.
    pub fn annotation(&self) -> String {
        let raw = &self.raw;
        let reference = if raw.reference.trim().is_empty() {
            raw.description.trim()
        } else {
            raw.reference.trim()
        };
        format!("{} {} {}", raw.date.format("%d %b %Y"), reference, raw.amount)
    }
}
