pub mod csv;
pub mod feed;

pub use csv::{import_backfill, BackfillProfile, BackfillRow, CsvError};
pub use feed::{load_feed, parse_feed, FeedError, Statement, STATEMENT_DATE_FORMAT};
