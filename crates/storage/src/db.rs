use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use topline_core::{
    Account, AccountNumber, Contributor, ContributorId, Money, Period, TransactionKey,
    TransactionType,
};

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid roster file {path}: {source}")]
    Roster {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Ledger {ledger} does not exist and no roster was found at {roster}")]
    MissingRoster { ledger: PathBuf, roster: PathBuf },
    #[error("Contributor not found: {0}")]
    UnknownContributor(ContributorId),
    #[error("Amount {0} cannot be stored in cents")]
    AmountOutOfRange(Money),
    #[error("Corrupt row in {table}: {detail}")]
    CorruptRow { table: &'static str, detail: String },
}

/// One contributor as listed in the roster file used to seed a new ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub handle: String,
    #[serde(default, alias = "alt_id")]
    pub alt_handle: Option<String>,
    #[serde(alias = "firstName")]
    pub first_name: String,
    #[serde(alias = "lastName")]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub house: bool,
}

pub fn read_roster(path: &Path) -> Result<Vec<RosterEntry>, StorageError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| StorageError::Roster {
        path: path.to_path_buf(),
        source,
    })
}

/// Opens the ledger at `path`. A missing ledger is created and seeded from
/// `roster`; when the roster is missing too, nothing is created.
pub async fn open_ledger(path: &Path, roster: &Path) -> Result<DbPool, StorageError> {
    if path.is_file() {
        tracing::debug!("Connecting to ledger {}", path.display());
        let pool = connect(file_options(path, false)).await?;
        run_migrations(&pool).await?;
        return Ok(pool);
    }

    if !roster.is_file() {
        return Err(StorageError::MissingRoster {
            ledger: path.to_path_buf(),
            roster: roster.to_path_buf(),
        });
    }

    tracing::warn!("Ledger {} not found, creating it", path.display());
    let entries = read_roster(roster)?;
    let pool = connect(file_options(path, true)).await?;
    run_migrations(&pool).await?;
    seed_contributors(&pool, &entries).await?;
    Ok(pool)
}

/// A private ledger that lives as long as the returned pool.
pub async fn open_in_memory() -> Result<DbPool, StorageError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

fn file_options(path: &Path, create: bool) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(5000))
}

async fn connect(options: SqliteConnectOptions) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contributors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            handle TEXT NOT NULL UNIQUE,
            alt_handle TEXT,
            is_house INTEGER NOT NULL DEFAULT 0,
            last_transaction_id INTEGER,
            total_cents INTEGER NOT NULL DEFAULT 0,
            share REAL NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            acc_num INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            balance_cents INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            acc_num INTEGER NOT NULL,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            reference TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            kind TEXT NOT NULL,
            contributor_id INTEGER,
            contrib_month INTEGER,
            contrib_year INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (contributor_id) REFERENCES contributors(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS unique_transaction
            ON transactions(acc_num, date, description, reference, amount_cents)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn seed_contributors(pool: &DbPool, entries: &[RosterEntry]) -> Result<(), sqlx::Error> {
    for entry in entries {
        tracing::debug!(handle = %entry.handle, "Adding contributor");
        sqlx::query(
            "INSERT OR IGNORE INTO contributors (first_name, last_name, email, handle, alt_handle, is_house) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.first_name)
        .bind(&entry.last_name)
        .bind(&entry.email)
        .bind(&entry.handle)
        .bind(entry.alt_handle.as_deref().filter(|h| !h.trim().is_empty()))
        .bind(entry.house)
        .execute(pool)
        .await?;
    }
    Ok(())
}

type ContributorRow = (i64, String, String, String, Option<String>, bool, Option<i64>, i64, f64);

pub async fn get_contributors(pool: &DbPool) -> Result<Vec<Contributor>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ContributorRow>(
        "SELECT id, first_name, last_name, handle, alt_handle, is_house, last_transaction_id, total_cents, share FROM contributors ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Contributor {
            id: ContributorId(r.0),
            display_name: format!("{} {}", r.1, r.2).trim().to_string(),
            primary_handle: r.3,
            alternate_handle: r.4,
            is_house: r.5,
            last_transaction_id: r.6,
            total: Money::from_cents(r.7),
            share: r.8,
        })
        .collect())
}

fn cents(amount: Money) -> Result<i64, StorageError> {
    amount
        .to_cents()
        .ok_or(StorageError::AmountOutOfRange(amount))
}

pub async fn transaction_exists(
    pool: &DbPool,
    key: &TransactionKey,
) -> Result<bool, StorageError> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM transactions WHERE acc_num = ? AND date = ? AND description = ? AND reference = ? AND amount_cents = ?",
    )
    .bind(key.account.0)
    .bind(key.date.to_string())
    .bind(&key.description)
    .bind(&key.reference)
    .bind(cents(key.amount)?)
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}

/// What the ledger keeps of a reconciled transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub key: TransactionKey,
    pub kind: TransactionType,
    pub contributor: Option<ContributorId>,
    pub period: Option<Period>,
}

/// Returns `None` when the uniqueness key is already taken.
pub async fn insert_transaction(
    pool: &DbPool,
    entry: &LedgerEntry,
) -> Result<Option<i64>, StorageError> {
    let mut conn = pool.acquire().await?;
    insert_row(&mut conn, entry).await
}

/// Inserts `entry` and, for a contribution, credits its contributor in the
/// same SQL transaction, so a row is never kept without its total.
/// Returns `None` when the uniqueness key is already taken.
pub async fn record_transaction(
    pool: &DbPool,
    entry: &LedgerEntry,
) -> Result<Option<i64>, StorageError> {
    let mut tx = pool.begin().await?;

    let Some(id) = insert_row(&mut tx, entry).await? else {
        return Ok(None);
    };
    if let (TransactionType::Contribution, Some(contributor)) = (entry.kind, entry.contributor) {
        credit_contributor(&mut tx, contributor, entry.key.amount, id).await?;
    }

    tx.commit().await?;
    Ok(Some(id))
}

async fn insert_row(
    conn: &mut SqliteConnection,
    entry: &LedgerEntry,
) -> Result<Option<i64>, StorageError> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT OR IGNORE INTO transactions
            (acc_num, date, description, reference, amount_cents, kind, contributor_id, contrib_month, contrib_year)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(entry.key.account.0)
    .bind(entry.key.date.to_string())
    .bind(&entry.key.description)
    .bind(&entry.key.reference)
    .bind(cents(entry.key.amount)?)
    .bind(entry.kind.to_string())
    .bind(entry.contributor.map(|c| c.0))
    .bind(entry.period.map(|p| p.month as i64))
    .bind(entry.period.map(|p| p.year as i64))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

/// Adds `amount` to one contributor's total, then recomputes every
/// non-house contributor's share of the pool.
pub async fn increment_contributor_total(
    pool: &DbPool,
    contributor: ContributorId,
    amount: Money,
    last_transaction_id: i64,
) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;
    credit_contributor(&mut tx, contributor, amount, last_transaction_id).await?;
    tx.commit().await?;
    Ok(())
}

async fn credit_contributor(
    conn: &mut SqliteConnection,
    contributor: ContributorId,
    amount: Money,
    last_transaction_id: i64,
) -> Result<(), StorageError> {
    let updated = sqlx::query(
        "UPDATE contributors SET total_cents = total_cents + ?, last_transaction_id = ? WHERE id = ?",
    )
    .bind(cents(amount)?)
    .bind(last_transaction_id)
    .bind(contributor.0)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(StorageError::UnknownContributor(contributor));
    }

    sqlx::query(
        r#"
        UPDATE contributors
        SET share = CASE
            WHEN (SELECT SUM(total_cents) FROM contributors WHERE is_house = 0) > 0
            THEN total_cents * 100.0 / (SELECT SUM(total_cents) FROM contributors WHERE is_house = 0)
            ELSE 0
        END
        WHERE is_house = 0
        "#,
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_accounts(pool: &DbPool) -> Result<Vec<Account>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, String, i64, bool)>(
        "SELECT acc_num, name, balance_cents, is_active FROM accounts ORDER BY acc_num",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Account {
            is_active: r.3,
            ..Account::new(r.0, &r.1, Money::from_cents(r.2))
        })
        .collect())
}

pub async fn upsert_account(
    pool: &DbPool,
    number: AccountNumber,
    name: &str,
    balance: Money,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO accounts (acc_num, name, balance_cents, is_active) VALUES (?, ?, ?, 1)
        ON CONFLICT(acc_num) DO UPDATE SET
            name = excluded.name,
            balance_cents = excluded.balance_cents,
            is_active = 1,
            updated_at = datetime('now')
        "#,
    )
    .bind(number.0)
    .bind(name)
    .bind(cents(balance)?)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn deactivate_account(pool: &DbPool, number: AccountNumber) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE accounts SET is_active = 0, updated_at = datetime('now') WHERE acc_num = ?")
        .bind(number.0)
        .execute(pool)
        .await?;
    Ok(())
}

/// A persisted transaction row, for listings and checks.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTransaction {
    pub id: i64,
    pub entry: LedgerEntry,
}

type TransactionRow = (
    i64,
    i64,
    String,
    String,
    String,
    i64,
    String,
    Option<i64>,
    Option<i64>,
    Option<i64>,
);

pub async fn get_transactions(pool: &DbPool) -> Result<Vec<StoredTransaction>, StorageError> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        "SELECT id, acc_num, date, description, reference, amount_cents, kind, contributor_id, contrib_month, contrib_year FROM transactions ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            let corrupt = |detail: String| StorageError::CorruptRow {
                table: "transactions",
                detail,
            };
            let date = NaiveDate::parse_from_str(&r.2, "%Y-%m-%d")
                .map_err(|e| corrupt(format!("id {}: date '{}': {e}", r.0, r.2)))?;
            let kind = r.6.parse::<TransactionType>().map_err(corrupt)?;
            let period = match (r.8, r.9) {
                (Some(month), Some(year)) => Period::new(month as u32, year as i32),
                _ => None,
            };
            Ok(StoredTransaction {
                id: r.0,
                entry: LedgerEntry {
                    key: TransactionKey {
                        account: AccountNumber(r.1),
                        date,
                        description: r.3,
                        reference: r.4,
                        amount: Money::from_cents(r.5),
                    },
                    kind,
                    contributor: r.7.map(ContributorId),
                    period,
                },
            })
        })
        .collect()
}
