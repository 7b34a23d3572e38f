use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::money::Money;
use crate::tokenizer::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContributorId(pub i64);

impl fmt::Display for ContributorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub id: ContributorId,
    pub display_name: String,
    pub primary_handle: String,
    pub alternate_handle: Option<String>,
    /// The reserved account-holder that `expense` and `roi` entries are booked to.
    pub is_house: bool,
    pub total: Money,
    pub share: f64,
    pub last_transaction_id: Option<i64>,
}

impl Contributor {
    pub fn new(id: i64, display_name: &str, primary_handle: &str) -> Self {
        Contributor {
            id: ContributorId(id),
            display_name: display_name.to_string(),
            primary_handle: primary_handle.to_string(),
            alternate_handle: None,
            is_house: false,
            total: Money::zero(),
            share: 0.0,
            last_transaction_id: None,
        }
    }

    pub fn with_alternate(mut self, handle: &str) -> Self {
        self.alternate_handle = Some(handle.to_string());
        self
    }

    pub fn house(mut self) -> Self {
        self.is_house = true;
        self
    }

    pub fn handles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary_handle.as_str()).chain(self.alternate_handle.as_deref())
    }
}

/// Uppercases and strips everything that is not a letter or digit.
///
/// Applied to reference tokens, contributor handles and month spellings alike,
/// so `"a.a"`, `"A-A"` and `"AA"` all compare equal.
pub fn normalize_handle(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Read-only roster of contributors for one reconciliation run, indexed by
/// every accepted handle spelling. Roster order is preserved.
#[derive(Debug, Clone, Default)]
pub struct ContributorDirectory {
    contributors: Vec<Contributor>,
    by_handle: HashMap<String, BTreeSet<usize>>,
}

impl ContributorDirectory {
    pub fn new(contributors: Vec<Contributor>) -> Self {
        let mut by_handle: HashMap<String, BTreeSet<usize>> = HashMap::new();
        for (index, contributor) in contributors.iter().enumerate() {
            for handle in contributor.handles() {
                let key = normalize_handle(handle);
                if key.is_empty() {
                    continue;
                }
                let owners = by_handle.entry(key).or_default();
                owners.insert(index);
                if owners.len() == 2 {
                    tracing::warn!(
                        handle,
                        "handle is shared by several contributors; references using it are ambiguous"
                    );
                }
            }
        }
        ContributorDirectory {
            contributors,
            by_handle,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contributors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.contributors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contributor> {
        self.contributors.iter()
    }

    pub fn get(&self, id: ContributorId) -> Option<&Contributor> {
        self.contributors.iter().find(|c| c.id == id)
    }

    pub fn house(&self) -> Option<&Contributor> {
        self.contributors.iter().find(|c| c.is_house)
    }

    /// The contributor owning `handle`, or `None` when no one or several
    /// contributors share that spelling.
    pub fn by_handle(&self, handle: &str) -> Option<&Contributor> {
        match self.by_handle.get(&normalize_handle(handle)) {
            Some(owners) if owners.len() == 1 => {
                owners.first().map(|&i| &self.contributors[i])
            }
            _ => None,
        }
    }

    /// Every distinct non-house contributor named by at least one word token.
    pub fn matches<'a>(&'a self, tokens: &[Token]) -> Vec<&'a Contributor> {
        let hits: BTreeSet<usize> = tokens
            .iter()
            .filter_map(Token::as_word)
            .filter_map(|w| self.by_handle.get(&normalize_handle(w)))
            .flatten()
            .copied()
            .filter(|&i| !self.contributors[i].is_house)
            .collect();
        hits.into_iter().map(|i| &self.contributors[i]).collect()
    }
}
