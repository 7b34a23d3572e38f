use std::collections::HashSet;

use topline_core::AccountNumber;
use topline_import::Statement;
use topline_storage::{Ledger, StorageError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountChanges {
    pub inserted: Vec<AccountNumber>,
    pub updated: Vec<AccountNumber>,
    pub deactivated: Vec<AccountNumber>,
    pub unchanged: usize,
}

/// Brings the stored accounts in line with the fetched statements. Stored
/// accounts that were not fetched are deactivated, never deleted.
pub async fn reconcile_accounts<L: Ledger>(
    ledger: &L,
    statements: &[Statement],
) -> Result<AccountChanges, StorageError> {
    let stored = ledger.list_accounts().await?;
    let mut changes = AccountChanges::default();

    for statement in statements {
        match stored.iter().find(|a| a.number == statement.number) {
            Some(account)
                if account.is_active
                    && account.display_name == statement.name
                    && account.balance == statement.balance =>
            {
                changes.unchanged += 1;
            }
            Some(_) => {
                ledger
                    .upsert_account(statement.number, &statement.name, statement.balance)
                    .await?;
                tracing::debug!(account = %statement.number, balance = %statement.balance, "account updated");
                changes.updated.push(statement.number);
            }
            None => {
                ledger
                    .upsert_account(statement.number, &statement.name, statement.balance)
                    .await?;
                tracing::info!(account = %statement.number, name = %statement.name, "new account");
                changes.inserted.push(statement.number);
            }
        }
    }

    let fetched: HashSet<AccountNumber> = statements.iter().map(|s| s.number).collect();
    for account in stored.iter().filter(|a| a.is_active && !fetched.contains(&a.number)) {
        ledger.deactivate_account(account.number).await?;
        tracing::warn!(account = %account.number, name = %account.display_name, "account no longer listed, deactivated");
        changes.deactivated.push(account.number);
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use topline_core::Money;
    use topline_storage::SqliteLedger;

    fn statement(number: i64, name: &str, cents: i64) -> Statement {
        Statement {
            number: AccountNumber(number),
            name: name.to_string(),
            balance: Money::from_cents(cents),
            transactions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn inserts_updates_and_deactivates() {
        let ledger = SqliteLedger::in_memory().await.unwrap();
        ledger
            .upsert_account(AccountNumber(1), "Gold Cheque", Money::from_cents(100))
            .await
            .unwrap();
        ledger
            .upsert_account(AccountNumber(2), "Old Savings", Money::from_cents(5))
            .await
            .unwrap();
        ledger
            .upsert_account(AccountNumber(4), "Fixed Deposit", Money::from_cents(7))
            .await
            .unwrap();

        let changes = reconcile_accounts(
            &ledger,
            &[
                statement(1, "Gold Cheque", 250),
                statement(3, "Money Market Savings", 0),
                statement(4, "Fixed Deposit", 7),
            ],
        )
        .await
        .unwrap();

        assert_eq!(changes.updated, vec![AccountNumber(1)]);
        assert_eq!(changes.inserted, vec![AccountNumber(3)]);
        assert_eq!(changes.deactivated, vec![AccountNumber(2)]);
        assert_eq!(changes.unchanged, 1);

        let accounts = ledger.list_accounts().await.unwrap();
        assert_eq!(accounts.len(), 4);
        assert_eq!(accounts[0].balance, Money::from_cents(250));
        assert!(!accounts[1].is_active);
    }

    #[tokio::test]
    async fn second_pass_changes_nothing() {
        let ledger = SqliteLedger::in_memory().await.unwrap();
        let statements = [statement(1, "Gold Cheque", 250)];
        reconcile_accounts(&ledger, &statements).await.unwrap();
        let changes = reconcile_accounts(&ledger, &statements).await.unwrap();
        assert_eq!(
            changes,
            AccountChanges {
                unchanged: 1,
                ..Default::default()
            }
        );
    }
}
