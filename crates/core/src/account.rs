use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountNumber(pub i64);

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decides which transaction types an account admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountCategory {
    Checking,
    /// Savings and fixed-deposit accounts.
    Savings,
}

impl fmt::Display for AccountCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountCategory::Checking => write!(f, "checking"),
            AccountCategory::Savings => write!(f, "savings"),
        }
    }
}

impl std::str::FromStr for AccountCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "checking" | "cheque" => Ok(AccountCategory::Checking),
            "savings" | "deposit" => Ok(AccountCategory::Savings),
            other => Err(format!("Unknown account category: '{other}'")),
        }
    }
}

impl AccountCategory {
    /// Guesses the category from a bank's product name, e.g. "Gold Cheque Account"
    /// or "32 Day Notice Deposit".
    pub fn infer(display_name: &str) -> Option<Self> {
        let name = display_name.to_lowercase();
        if name.contains("cheque") || name.contains("check") {
            Some(AccountCategory::Checking)
        } else if name.contains("savings") || name.contains("deposit") {
            Some(AccountCategory::Savings)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub number: AccountNumber,
    pub display_name: String,
    /// `None` when the name gave no hint and no override was configured.
    pub category: Option<AccountCategory>,
    pub balance: Money,
    pub is_active: bool,
}

impl Account {
    pub fn new(number: i64, display_name: &str, balance: Money) -> Self {
        Account {
            number: AccountNumber(number),
            display_name: display_name.to_string(),
            category: AccountCategory::infer(display_name),
            balance,
            is_active: true,
        }
    }

    pub fn with_category(mut self, category: AccountCategory) -> Self {
        self.category = Some(category);
        self
    }
}
