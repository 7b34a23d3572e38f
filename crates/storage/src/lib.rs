pub mod db;
pub mod ledger;
pub mod snapshot;

pub use db::{
    open_in_memory, open_ledger, read_roster, seed_contributors, DbPool, LedgerEntry, RosterEntry,
    StorageError, StoredTransaction,
};
pub use ledger::{InsertOutcome, Ledger, SqliteLedger};
pub use snapshot::snapshot;
