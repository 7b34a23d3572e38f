use serde::{Deserialize, Serialize};

use crate::account::AccountCategory;
use crate::contributor::ContributorDirectory;
use crate::period::Period;
use crate::resolver::{ReferenceResolver, ResolveError, Resolution};
use crate::tokenizer::{tokenize, Token};
use crate::transaction::{Attribution, RawTransaction, ResolvedTransaction, TransactionType};

/// Description markers, matched case-insensitively as substrings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub expense_markers: Vec<String>,
    pub roi_markers: Vec<String>,
    /// Handle of the house account-holder that `expense` and `roi` entries belong to.
    pub house_handle: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            expense_markers: vec!["MONTHLY ACCOUNT FEE".to_string()],
            roi_markers: vec!["PROFIT SHARE".to_string()],
            house_handle: "TIG".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    expense_markers: Vec<String>,
    roi_markers: Vec<String>,
    house_handle: String,
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier::new(&ClassifierConfig::default())
    }
}

fn contains_any(text: &str, markers: &[String]) -> bool {
    let text = text.to_uppercase();
    markers.iter().any(|m| !m.is_empty() && text.contains(m.as_str()))
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let upper = |markers: &[String]| {
            markers
                .iter()
                .map(|m| m.trim().to_uppercase())
                .collect::<Vec<_>>()
        };
        Self {
            expense_markers: upper(&config.expense_markers),
            roi_markers: upper(&config.roi_markers),
            house_handle: config.house_handle.clone(),
        }
    }

    pub fn classify(
        &self,
        category: Option<AccountCategory>,
        resolution: &Result<Resolution, ResolveError>,
        description: &str,
    ) -> TransactionType {
        match category {
            Some(AccountCategory::Checking) => {
                if resolution.is_ok() {
                    TransactionType::Contribution
                } else if contains_any(description, &self.expense_markers) {
                    TransactionType::Expense
                } else {
                    TransactionType::Unknown
                }
            }
            Some(AccountCategory::Savings) => {
                if contains_any(description, &self.roi_markers) {
                    TransactionType::Roi
                } else {
                    TransactionType::Unknown
                }
            }
            None => TransactionType::Unknown,
        }
    }

    /// Tokenizes, resolves and classifies one statement line.
    ///
    /// The reference is the evidence; when it has no tokens at all the
    /// description is tokenized instead. `expense` and `roi` lines are booked
    /// to the house account-holder for the month of their own date.
    pub fn attribute(
        &self,
        raw: &RawTransaction,
        category: Option<AccountCategory>,
        resolver: &ReferenceResolver,
        directory: &ContributorDirectory,
    ) -> ResolvedTransaction {
        let tokens = evidence_tokens(raw);
        let resolution = resolver.resolve(&tokens, raw.date, directory);
        let kind = self.classify(category, &resolution, &raw.description);

        let mut resolved = ResolvedTransaction {
            raw: raw.clone(),
            kind,
            attribution: None,
            period: None,
            rejection: None,
        };

        match kind {
            TransactionType::Contribution => {
                if let Ok(resolution) = resolution {
                    resolved.attribution = Some(Attribution {
                        contributor: resolution.contributor,
                        handle: resolution.handle,
                    });
                    resolved.period = Some(resolution.period.period);
                }
            }
            TransactionType::Expense | TransactionType::Roi => {
                match directory.by_handle(&self.house_handle) {
                    Some(house) => {
                        resolved.attribution = Some(Attribution {
                            contributor: house.id,
                            handle: house.primary_handle.clone(),
                        });
                        resolved.period = Some(Period::of(raw.date));
                    }
                    None => {
                        tracing::warn!(
                            house = %self.house_handle,
                            "house account-holder missing from directory"
                        );
                        resolved.kind = TransactionType::Unknown;
                    }
                }
            }
            TransactionType::Unknown => {
                resolved.rejection = resolution.err();
            }
        }

        resolved
    }
}

pub fn evidence_tokens(raw: &RawTransaction) -> Vec<Token> {
    let tokens = tokenize(&raw.reference);
    if tokens.is_empty() {
        tokenize(&raw.description)
    } else {
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountNumber;
    use crate::contributor::{Contributor, ContributorId};
    use crate::money::Money;
    use chrono::NaiveDate;

    fn directory() -> ContributorDirectory {
        ContributorDirectory::new(vec![
            Contributor::new(1, "Topline", "TIG").house(),
            Contributor::new(2, "Anna Adams", "AA"),
            Contributor::new(3, "Ben Botha", "BB"),
        ])
    }

    fn raw(description: &str, reference: &str, cents: i64) -> RawTransaction {
        RawTransaction {
            account: AccountNumber(62000000001),
            date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            description: description.to_string(),
            reference: reference.to_string(),
            fee: String::new(),
            amount: Money::from_cents(cents),
            balance: Money::zero(),
        }
    }

    fn attribute(raw: &RawTransaction, category: Option<AccountCategory>) -> ResolvedTransaction {
        Classifier::default().attribute(raw, category, &ReferenceResolver::default(), &directory())
    }

    #[test]
    fn checking_with_contributor_is_a_contribution() {
        let t = attribute(
            &raw("FNB APP PAYMENT", "AA FEB 24", 100000),
            Some(AccountCategory::Checking),
        );
        assert_eq!(t.kind, TransactionType::Contribution);
        assert_eq!(t.contributor_id(), Some(ContributorId(2)));
        assert_eq!(t.period, Period::new(2, 2024));
        assert!(t.rejection.is_none());
    }

    #[test]
    fn account_fee_without_contributor_is_an_expense() {
        let t = attribute(
            &raw("#MONTHLY ACCOUNT FEE", "", -6900),
            Some(AccountCategory::Checking),
        );
        assert_eq!(t.kind, TransactionType::Expense);
        assert_eq!(t.contributor_id(), Some(ContributorId(1)));
        assert_eq!(t.period, Period::new(2, 2024));
    }

    #[test]
    fn unrecognized_checking_line_is_unknown_with_reason() {
        let t = attribute(
            &raw("POS PURCHASE", "SPAR KLOOF STREET", -12000),
            Some(AccountCategory::Checking),
        );
        assert_eq!(t.kind, TransactionType::Unknown);
        assert_eq!(t.rejection, Some(ResolveError::NoContributor));
        assert!(t.attribution.is_none());
    }

    #[test]
    fn savings_profit_share_is_roi() {
        let t = attribute(
            &raw("Profit Share", "INTEREST", 4512),
            Some(AccountCategory::Savings),
        );
        assert_eq!(t.kind, TransactionType::Roi);
        assert_eq!(t.contributor_id(), Some(ContributorId(1)));
    }

    #[test]
    fn contribution_into_savings_is_unknown() {
        let t = attribute(&raw("TRANSFER", "AA FEB 24", 100000), Some(AccountCategory::Savings));
        assert_eq!(t.kind, TransactionType::Unknown);
    }

    #[test]
    fn uncategorized_account_admits_nothing() {
        let t = attribute(&raw("FNB APP PAYMENT", "AA FEB 24", 100000), None);
        assert_eq!(t.kind, TransactionType::Unknown);
    }

    #[test]
    fn empty_reference_falls_back_to_description() {
        let t = attribute(
            &raw("BB CONTRIB JAN 24", "  -- ", 100000),
            Some(AccountCategory::Checking),
        );
        assert_eq!(t.kind, TransactionType::Contribution);
        assert_eq!(t.contributor_id(), Some(ContributorId(3)));
        assert_eq!(t.period, Period::new(1, 2024));
    }

    #[test]
    fn missing_house_degrades_to_unknown() {
        let directory = ContributorDirectory::new(vec![Contributor::new(2, "Anna Adams", "AA")]);
        let t = Classifier::default().attribute(
            &raw("MONTHLY ACCOUNT FEE", "", -6900),
            Some(AccountCategory::Checking),
            &ReferenceResolver::default(),
            &directory,
        );
        assert_eq!(t.kind, TransactionType::Unknown);
    }
}
