use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::account::{AccountCategory, AccountNumber};
use crate::classifier::ClassifierConfig;
use crate::months::MonthCatalog;
use crate::resolver::{ReferenceResolver, DEFAULT_MIN_TOKENS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub report: ReportConfig,
    pub classifier: ClassifierConfig,
    pub resolver: ResolverConfig,
    pub accounts: Vec<AccountOverride>,
    pub backup: BackupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,
    /// Roster used to seed a ledger that does not exist yet.
    pub roster: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("topline.db"),
            roster: PathBuf::from("users.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub path: PathBuf,
    /// Where the updated workbook is saved. Without it the run's edits are discarded.
    pub output: Option<PathBuf>,
    pub layout: ReportLayout,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("master.json"),
            output: None,
            layout: ReportLayout::default(),
        }
    }
}

/// Fixed coordinates of the report workbook. Rows and columns are 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportLayout {
    pub summary_page: String,
    /// Column on the summary page listing contributor handles in report order.
    pub roster_column: u32,
    pub roster_rows: [u32; 2],
    /// Row holding the month header of every period page.
    pub header_row: u32,
    /// Row of the first roster entry on a period page; entry `n` lands on `base + n`.
    pub contribution_base_row: u32,
    pub roi_rows: [u32; 2],
    pub roi_label_column: u32,
    pub expense_row: u32,
    pub balance_rows: [u32; 2],
    pub balance_label_column: u32,
    pub balance_value_column: u32,
    /// Cell texts that count as empty.
    pub placeholders: Vec<String>,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            summary_page: "Summary".to_string(),
            roster_column: 1,
            roster_rows: [3, 30],
            header_row: 1,
            contribution_base_row: 2,
            roi_rows: [40, 45],
            roi_label_column: 1,
            expense_row: 48,
            balance_rows: [35, 40],
            balance_label_column: 1,
            balance_value_column: 2,
            placeholders: vec!["-".to_string(), "N/A".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub min_tokens: usize,
    pub month_aliases: Vec<MonthAlias>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_tokens: DEFAULT_MIN_TOKENS,
            month_aliases: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthAlias {
    pub month: u32,
    pub spellings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountOverride {
    pub number: i64,
    pub category: AccountCategory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub dir: Option<PathBuf>,
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let layout = &self.report.layout;
        for (name, [first, last]) in [
            ("roster_rows", layout.roster_rows),
            ("roi_rows", layout.roi_rows),
            ("balance_rows", layout.balance_rows),
        ] {
            if first == 0 || first > last {
                return Err(ConfigError::Invalid(format!(
                    "report.layout.{name} must be a non-empty 1-based range, got [{first}, {last}]"
                )));
            }
        }
        if let Some(alias) = self
            .resolver
            .month_aliases
            .iter()
            .find(|a| !(1..=12).contains(&a.month))
        {
            return Err(ConfigError::Invalid(format!(
                "resolver.month_aliases: month {} is not in 1..=12",
                alias.month
            )));
        }
        if self.classifier.house_handle.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "classifier.house_handle must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn resolver(&self) -> ReferenceResolver {
        let aliases = self
            .resolver
            .month_aliases
            .iter()
            .flat_map(|a| a.spellings.iter().map(move |s| (a.month, s.as_str())));
        ReferenceResolver::new(MonthCatalog::with_aliases(aliases), self.resolver.min_tokens)
    }

    pub fn category_override(&self, number: AccountNumber) -> Option<AccountCategory> {
        self.accounts
            .iter()
            .find(|o| o.number == number.0)
            .map(|o| o.category)
    }
}
