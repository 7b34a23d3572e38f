pub mod account;
pub mod classifier;
pub mod config;
pub mod contributor;
pub mod money;
pub mod months;
pub mod period;
pub mod resolver;
pub mod tokenizer;
pub mod transaction;

pub use account::{Account, AccountCategory, AccountNumber};
pub use classifier::{evidence_tokens, Classifier, ClassifierConfig};
pub use config::{Config, ConfigError, ReportLayout};
pub use contributor::{normalize_handle, Contributor, ContributorDirectory, ContributorId};
pub use money::{AmountParseError, Money};
pub use months::MonthCatalog;
pub use period::{Period, PeriodRange};
pub use resolver::{ReferenceResolver, Resolution, ResolveError, ResolvedPeriod, Source, Step};
pub use tokenizer::{tokenize, Token};
pub use transaction::{
    Attribution, RawTransaction, ResolvedTransaction, TransactionKey, TransactionType,
};
