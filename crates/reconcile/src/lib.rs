pub mod accounts;
pub mod engine;

pub use accounts::{reconcile_accounts, AccountChanges};
pub use engine::{AccountSummary, Engine, ReconcileError, RunSummary, TransactionOutcome};
