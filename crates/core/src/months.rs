use std::collections::HashMap;

use crate::contributor::normalize_handle;
use crate::tokenizer::Token;

const DEFAULT_SPELLINGS: [&[&str]; 12] = [
    &["JANUARY", "JAN"],
    &["FEBRUARY", "FEB"],
    &["MARCH", "MAR"],
    &["APRIL", "APR"],
    &["MAY"],
    &["JUNE", "JUN"],
    &["JULY", "JUL"],
    &["AUGUST", "AUG"],
    &["SEPTEMBER", "SEPT", "SEP"],
    &["OCTOBER", "OCT"],
    &["NOVEMBER", "NOV"],
    &["DECEMBER", "DEC"],
];

/// Accepted spellings for each calendar month (1–12).
///
/// Spellings are normalized the same way as contributor handles, so a token
/// only has to be compared for equality.
#[derive(Debug, Clone)]
pub struct MonthCatalog {
    lookup: HashMap<String, u32>,
}

impl Default for MonthCatalog {
    fn default() -> Self {
        let mut catalog = MonthCatalog {
            lookup: HashMap::new(),
        };
        for (index, spellings) in DEFAULT_SPELLINGS.iter().enumerate() {
            for spelling in spellings.iter() {
                catalog.insert(index as u32 + 1, spelling);
            }
        }
        catalog
    }
}

impl MonthCatalog {
    /// The default English catalog extended with extra spellings per month.
    /// Aliases for months outside 1–12 are ignored.
    pub fn with_aliases<'a, I>(aliases: I) -> Self
    where
        I: IntoIterator<Item = (u32, &'a str)>,
    {
        let mut catalog = MonthCatalog::default();
        for (month, spelling) in aliases {
            if (1..=12).contains(&month) {
                catalog.insert(month, spelling);
            } else {
                tracing::warn!(month, spelling, "ignoring alias for invalid month");
            }
        }
        catalog
    }

    fn insert(&mut self, month: u32, spelling: &str) {
        let key = normalize_handle(spelling);
        if !key.is_empty() {
            self.lookup.insert(key, month);
        }
    }

    pub fn month_of(&self, spelling: &str) -> Option<u32> {
        self.lookup.get(&normalize_handle(spelling)).copied()
    }

    pub fn month_of_token(&self, token: &Token) -> Option<u32> {
        token.as_word().and_then(|w| self.month_of(w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_knows_names_and_abbreviations() {
        let catalog = MonthCatalog::default();
        assert_eq!(catalog.month_of("AUG"), Some(8));
        assert_eq!(catalog.month_of("august"), Some(8));
        assert_eq!(catalog.month_of("Sept"), Some(9));
        assert_eq!(catalog.month_of("SEP"), Some(9));
        assert_eq!(catalog.month_of("MAY"), Some(5));
        assert_eq!(catalog.month_of("AUGU"), None);
    }

    #[test]
    fn aliases_extend_the_catalog() {
        let catalog = MonthCatalog::with_aliases([(5, "Mei"), (10, "OKT"), (13, "XYZ")]);
        assert_eq!(catalog.month_of("MEI"), Some(5));
        assert_eq!(catalog.month_of("okt"), Some(10));
        assert_eq!(catalog.month_of("XYZ"), None);
        assert_eq!(catalog.month_of("OCT"), Some(10));
    }

    #[test]
    fn numbers_never_name_a_month() {
        let catalog = MonthCatalog::default();
        assert_eq!(catalog.month_of_token(&Token::Number(8)), None);
        assert_eq!(catalog.month_of_token(&Token::from("DEC")), Some(12));
    }
}
