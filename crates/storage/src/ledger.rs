use std::path::Path;

use topline_core::{
    Account, AccountNumber, ContributorDirectory, ContributorId, Money, ResolvedTransaction,
    TransactionKey,
};

use crate::db::{self, DbPool, LedgerEntry, StorageError, StoredTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    Duplicate,
}

impl LedgerEntry {
    /// `None` for unknown transactions, which the ledger never keeps.
    pub fn from_resolved(resolved: &ResolvedTransaction) -> Option<Self> {
        if resolved.is_unknown() {
            return None;
        }
        Some(Self {
            key: resolved.raw.key(),
            kind: resolved.kind,
            contributor: resolved.contributor_id(),
            period: resolved.period,
        })
    }
}

/// Persistent store of contributors, accounts and reconciled transactions.
#[allow(async_fn_in_trait)]
pub trait Ledger {
    async fn contributors(&self) -> Result<ContributorDirectory, StorageError>;
    async fn transaction_exists(&self, key: &TransactionKey) -> Result<bool, StorageError>;
    async fn insert_transaction(&self, entry: &LedgerEntry) -> Result<InsertOutcome, StorageError>;
    /// Insert plus, for contributions, the contributor credit, applied
    /// together or not at all.
    async fn record_transaction(&self, entry: &LedgerEntry) -> Result<InsertOutcome, StorageError>;
    async fn increment_contributor_total(
        &self,
        contributor: ContributorId,
        amount: Money,
        last_transaction_id: i64,
    ) -> Result<(), StorageError>;
    async fn list_accounts(&self) -> Result<Vec<Account>, StorageError>;
    async fn upsert_account(
        &self,
        number: AccountNumber,
        name: &str,
        balance: Money,
    ) -> Result<(), StorageError>;
    async fn deactivate_account(&self, number: AccountNumber) -> Result<(), StorageError>;
}

pub struct SqliteLedger {
    pool: DbPool,
}

impl SqliteLedger {
    pub async fn open(path: &Path, roster: &Path) -> Result<Self, StorageError> {
        Ok(Self {
            pool: db::open_ledger(path, roster).await?,
        })
    }

    pub async fn in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            pool: db::open_in_memory().await?,
        })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn transactions(&self) -> Result<Vec<StoredTransaction>, StorageError> {
        db::get_transactions(&self.pool).await
    }

    pub async fn transaction_count(&self) -> Result<i64, StorageError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

impl Ledger for SqliteLedger {
    async fn contributors(&self) -> Result<ContributorDirectory, StorageError> {
        Ok(ContributorDirectory::new(db::get_contributors(&self.pool).await?))
    }

    async fn transaction_exists(&self, key: &TransactionKey) -> Result<bool, StorageError> {
        Ok(db::transaction_exists(&self.pool, key).await?)
    }

    async fn insert_transaction(&self, entry: &LedgerEntry) -> Result<InsertOutcome, StorageError> {
        Ok(match db::insert_transaction(&self.pool, entry).await? {
            Some(id) => InsertOutcome::Inserted(id),
            None => InsertOutcome::Duplicate,
        })
    }

    async fn record_transaction(&self, entry: &LedgerEntry) -> Result<InsertOutcome, StorageError> {
        Ok(match db::record_transaction(&self.pool, entry).await? {
            Some(id) => InsertOutcome::Inserted(id),
            None => InsertOutcome::Duplicate,
        })
    }

    async fn increment_contributor_total(
        &self,
        contributor: ContributorId,
        amount: Money,
        last_transaction_id: i64,
    ) -> Result<(), StorageError> {
        db::increment_contributor_total(&self.pool, contributor, amount, last_transaction_id).await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StorageError> {
        Ok(db::get_accounts(&self.pool).await?)
    }

    async fn upsert_account(
        &self,
        number: AccountNumber,
        name: &str,
        balance: Money,
    ) -> Result<(), StorageError> {
        Ok(db::upsert_account(&self.pool, number, name, balance).await?)
    }

    async fn deactivate_account(&self, number: AccountNumber) -> Result<(), StorageError> {
        Ok(db::deactivate_account(&self.pool, number).await?)
    }
}
