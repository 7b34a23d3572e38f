use thiserror::Error;
use topline_core::{
    evidence_tokens, Account, AccountCategory, AccountNumber, Attribution, Classifier, Config,
    ContributorDirectory, ContributorId, RawTransaction, ReferenceResolver, ResolveError,
    ResolvedTransaction, TransactionType,
};
use topline_import::{BackfillRow, Statement};
use topline_report::{CellRef, ReportWriter, Workbook, WriteError, WriteMode};
use topline_storage::{InsertOutcome, Ledger, LedgerEntry, StorageError};

use crate::accounts::{reconcile_accounts, AccountChanges};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Ledger error: {0}")]
    Storage(#[from] StorageError),
    #[error("Contributor directory is empty; nothing can be attributed")]
    EmptyDirectory,
}

/// Terminal state of one transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    /// Classified `unknown`; neither persisted nor written.
    Rejected(Option<ResolveError>),
    /// Already in the ledger; nothing was touched.
    Duplicate,
    Written { id: i64, cell: CellRef },
    /// Persisted, but the report write failed. The ledger row stands.
    ReportSkipped { id: i64, reason: WriteError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub account: AccountNumber,
    pub name: String,
    pub processed: usize,
    pub persisted: usize,
    pub written: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

impl AccountSummary {
    fn new(account: AccountNumber, name: &str) -> Self {
        Self {
            account,
            name: name.to_string(),
            processed: 0,
            persisted: 0,
            written: 0,
            duplicates: 0,
            rejected: 0,
        }
    }

    fn record(&mut self, outcome: &TransactionOutcome) {
        self.processed += 1;
        match outcome {
            TransactionOutcome::Rejected(_) => self.rejected += 1,
            TransactionOutcome::Duplicate => self.duplicates += 1,
            TransactionOutcome::Written { .. } => {
                self.persisted += 1;
                self.written += 1;
            }
            TransactionOutcome::ReportSkipped { .. } => self.persisted += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub accounts: AccountChanges,
    pub statements: Vec<AccountSummary>,
}

impl RunSummary {
    pub fn persisted(&self) -> usize {
        self.statements.iter().map(|s| s.persisted).sum()
    }

    pub fn written(&self) -> usize {
        self.statements.iter().map(|s| s.written).sum()
    }
}

/// Runs statement lines through resolve → classify → dedup → persist →
/// report write, one at a time, oldest first.
pub struct Engine<L: Ledger> {
    ledger: L,
    directory: ContributorDirectory,
    resolver: ReferenceResolver,
    classifier: Classifier,
    writer: ReportWriter,
    config: Config,
}

impl<L: Ledger> Engine<L> {
    /// Loads the contributor directory. An empty directory aborts the run
    /// before any transaction is looked at.
    pub async fn start(ledger: L, config: &Config) -> Result<Self, ReconcileError> {
        let directory = ledger.contributors().await?;
        if directory.is_empty() {
            return Err(ReconcileError::EmptyDirectory);
        }
        tracing::debug!(contributors = directory.len(), "contributor directory loaded");
        Ok(Self {
            ledger,
            directory,
            resolver: config.resolver(),
            classifier: Classifier::new(&config.classifier),
            writer: ReportWriter::new(config.report.layout.clone()),
            config: config.clone(),
        })
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn into_ledger(self) -> L {
        self.ledger
    }

    pub fn directory(&self) -> &ContributorDirectory {
        &self.directory
    }

    pub fn category_of(&self, number: AccountNumber, name: &str) -> Option<AccountCategory> {
        self.config
            .category_override(number)
            .or_else(|| AccountCategory::infer(name))
    }

    /// Reconciles account records, then every statement in feed order.
    pub async fn run(
        &self,
        workbook: &mut Workbook,
        statements: &[Statement],
    ) -> Result<RunSummary, ReconcileError> {
        let accounts = reconcile_accounts(&self.ledger, statements).await?;
        let mut summary = RunSummary {
            accounts,
            statements: Vec::with_capacity(statements.len()),
        };
        for statement in statements {
            summary
                .statements
                .push(self.process_statement(workbook, statement).await?);
        }
        tracing::info!(
            persisted = summary.persisted(),
            written = summary.written(),
            "run complete"
        );
        Ok(summary)
    }

    pub async fn process_statement(
        &self,
        workbook: &mut Workbook,
        statement: &Statement,
    ) -> Result<AccountSummary, ReconcileError> {
        tracing::info!(
            "Processing transactions in account: {} - {}",
            statement.number,
            statement.name
        );
        let category = self.category_of(statement.number, &statement.name);
        if category.is_none() {
            tracing::warn!(
                account = %statement.number,
                name = %statement.name,
                "account category cannot be determined; its transactions will be unknown"
            );
        }

        let mut summary = AccountSummary::new(statement.number, &statement.name);
        let total = statement.transactions.len();
        for (index, raw) in statement.chronological().enumerate() {
            tracing::debug!(
                "Processing transaction {}/{}: date = {}, desc = {}, ref = {}, amount = {}",
                index + 1,
                total,
                raw.date,
                raw.description,
                raw.reference,
                raw.amount
            );
            let resolved = self
                .classifier
                .attribute(raw, category, &self.resolver, &self.directory);
            let outcome = self.apply(workbook, resolved).await?;
            summary.record(&outcome);
        }

        if let Err(e) = self
            .writer
            .update_account_balance(workbook, statement.number, statement.balance)
        {
            tracing::warn!(account = %statement.number, "balance not written to report: {e}");
        }

        log_summary(&summary);
        Ok(summary)
    }

    /// Imports offline rows for one account, oldest first. Rows that name their
    /// contributor only have their period resolved; the rest take the normal path.
    pub async fn backfill(
        &self,
        workbook: &mut Workbook,
        account: AccountNumber,
        mut rows: Vec<BackfillRow>,
    ) -> Result<AccountSummary, ReconcileError> {
        rows.sort_by_key(|row| row.date);

        let stored: Option<Account> = self
            .ledger
            .list_accounts()
            .await?
            .into_iter()
            .find(|a| a.number == account);
        let name = stored
            .as_ref()
            .map(|a| a.display_name.clone())
            .unwrap_or_default();
        let category = self.category_of(account, &name);

        let mut summary = AccountSummary::new(account, &name);
        for row in rows {
            let contributor = row.contributor;
            let raw = row.into_raw(account);
            let resolved = match contributor {
                Some(id) => self.attribute_known(raw, id),
                None => self
                    .classifier
                    .attribute(&raw, category, &self.resolver, &self.directory),
            };
            let outcome = self.apply(workbook, resolved).await?;
            summary.record(&outcome);
        }

        log_summary(&summary);
        Ok(summary)
    }

    fn attribute_known(&self, raw: RawTransaction, contributor: ContributorId) -> ResolvedTransaction {
        let mut resolved = ResolvedTransaction {
            kind: TransactionType::Unknown,
            attribution: None,
            period: None,
            rejection: None,
            raw,
        };
        let Some(known) = self.directory.get(contributor) else {
            tracing::warn!(%contributor, "backfill row names an unknown contributor");
            resolved.rejection = Some(ResolveError::NoContributor);
            return resolved;
        };
        match self
            .resolver
            .resolve_period(&evidence_tokens(&resolved.raw), resolved.raw.date)
        {
            Ok(period) => {
                resolved.kind = TransactionType::Contribution;
                resolved.attribution = Some(Attribution {
                    contributor: known.id,
                    handle: known.primary_handle.clone(),
                });
                resolved.period = Some(period.period);
            }
            Err(e) => resolved.rejection = Some(e),
        }
        resolved
    }

    /// Everything after classification: dedup, persist, running totals and
    /// the additive report write.
    async fn apply(
        &self,
        workbook: &mut Workbook,
        resolved: ResolvedTransaction,
    ) -> Result<TransactionOutcome, ReconcileError> {
        // 1. Unknowns stop here.
        let Some(entry) = LedgerEntry::from_resolved(&resolved) else {
            let reason = resolved
                .rejection
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "no rule admits it for this account".to_string());
            tracing::warn!(
                account = %resolved.raw.account,
                reference = %resolved.raw.reference,
                "Unknown transaction: {reason}"
            );
            return Ok(TransactionOutcome::Rejected(resolved.rejection));
        };

        // 2. Dedup on the five-field key.
        if self.ledger.transaction_exists(&entry.key).await? {
            tracing::debug!("duplicate transaction skipped");
            return Ok(TransactionOutcome::Duplicate);
        }

        // 3. Persist, crediting the contributor's running total in the same
        // ledger transaction.
        let id = match self.ledger.record_transaction(&entry).await? {
            InsertOutcome::Inserted(id) => id,
            InsertOutcome::Duplicate => return Ok(TransactionOutcome::Duplicate),
        };

        // 4. Report.
        match self
            .writer
            .locate_and_write(workbook, &resolved, &self.directory, WriteMode::Additive)
        {
            Ok(cell) => Ok(TransactionOutcome::Written { id, cell }),
            Err(reason) => {
                tracing::warn!(id, "transaction kept in ledger but not written to report: {reason}");
                Ok(TransactionOutcome::ReportSkipped { id, reason })
            }
        }
    }
}

fn log_summary(summary: &AccountSummary) {
    tracing::info!(
        "Processed {} transactions in account: {}. {} added to database, {} written to report, {} duplicates, {} unknown",
        summary.processed,
        summary.name,
        summary.persisted,
        summary.written,
        summary.duplicates,
        summary.rejected
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use topline_core::{Money, Period, PeriodRange};
    use topline_report::{CellValue, Page};
    use topline_storage::{seed_contributors, RosterEntry, SqliteLedger};

    const CHEQUE: AccountNumber = AccountNumber(62000000001);
    const SAVINGS: AccountNumber = AccountNumber(74000000002);

    fn roster_entry(handle: &str, house: bool) -> RosterEntry {
        RosterEntry {
            handle: handle.to_string(),
            alt_handle: None,
            first_name: handle.to_string(),
            last_name: "Test".to_string(),
            email: format!("{}@example.com", handle.to_lowercase()),
            house,
        }
    }

    async fn ledger() -> SqliteLedger {
        let ledger = SqliteLedger::in_memory().await.unwrap();
        seed_contributors(
            ledger.pool(),
            &[
                roster_entry("TIG", true),
                roster_entry("AA", false),
                roster_entry("BB", false),
            ],
        )
        .await
        .unwrap();
        ledger
    }

    async fn engine() -> Engine<SqliteLedger> {
        Engine::start(ledger().await, &Config::default()).await.unwrap()
    }

    fn period(month: u32, year: i32) -> Period {
        Period::new(month, year).unwrap()
    }

    /// Roster AA, BB on the summary page; one page for Aug 2017 - Jul 2018.
    fn workbook() -> Workbook {
        let mut workbook = Workbook::new();
        workbook
            .add_page(Page::new("Summary"))
            .unwrap()
            .set(3, 1, CellValue::Text("AA".into()))
            .set(4, 1, CellValue::Text("BB".into()));
        let page = workbook
            .add_page(
                Page::new("2017-2018")
                    .with_coverage(PeriodRange::new(period(8, 2017), period(7, 2018))),
            )
            .unwrap();
        for i in 0..12u32 {
            let month = (7 + i) % 12 + 1;
            let year = if month >= 8 { 2017 } else { 2018 };
            page.set(
                1,
                2 + i,
                CellValue::Date(NaiveDate::from_ymd_opt(year, month, 1).unwrap()),
            );
        }
        workbook
    }

    fn line(account: AccountNumber, date: (i32, u32, u32), desc: &str, reference: &str, cents: i64) -> RawTransaction {
        RawTransaction {
            account,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            description: desc.to_string(),
            reference: reference.to_string(),
            fee: String::new(),
            amount: Money::from_cents(cents),
            balance: Money::zero(),
        }
    }

    /// Newest first, as fetched.
    fn statements() -> Vec<Statement> {
        vec![
            Statement {
                number: CHEQUE,
                name: "Gold Cheque Account".to_string(),
                balance: Money::from_cents(1245000),
                transactions: vec![
                    line(CHEQUE, (2017, 9, 2), "#MONTHLY ACCOUNT FEE", "", -6900),
                    line(CHEQUE, (2017, 8, 20), "FNB APP PAYMENT", "BB AUG 17", 50000),
                    line(CHEQUE, (2017, 8, 16), "FNB APP PAYMENT", "AA - AUG'17 SECOND", 50000),
                    line(CHEQUE, (2017, 8, 15), "FNB APP PAYMENT", "AA - AUG'17", 150000),
                    line(CHEQUE, (2017, 8, 14), "POS PURCHASE", "SPAR KLOOF STREET", -12000),
                ],
            },
            Statement {
                number: SAVINGS,
                name: "Money Market Savings".to_string(),
                balance: Money::from_cents(500000),
                transactions: vec![line(SAVINGS, (2017, 8, 31), "PROFIT SHARE", "INTEREST", 4512)],
            },
        ]
    }

    #[tokio::test]
    async fn full_run_persists_and_writes() {
        let engine = engine().await;
        let mut workbook = workbook();
        let summary = engine.run(&mut workbook, &statements()).await.unwrap();

        let cheque = &summary.statements[0];
        assert_eq!(cheque.processed, 5);
        assert_eq!(cheque.persisted, 4);
        assert_eq!(cheque.written, 4);
        assert_eq!(cheque.rejected, 1);
        assert_eq!(summary.statements[1].written, 1);
        assert_eq!(summary.accounts.inserted, vec![CHEQUE, SAVINGS]);

        let page = workbook.page("2017-2018").unwrap();
        // AA: two August payments summed, oldest annotation first.
        let aa = page.cell(3, 2).unwrap();
        assert_eq!(aa.value, CellValue::Number(Decimal::new(200000, 2)));
        let notes = aa.annotation.as_deref().unwrap();
        assert!(notes.starts_with("15 Aug 2017"));
        assert_eq!(notes.lines().count(), 2);
        assert_eq!(page.value(4, 2).as_number(), Some(Decimal::new(50000, 2)));
        // Fee in September on the expense row, ROI claims the first ROI row.
        assert_eq!(page.value(48, 3).as_number(), Some(Decimal::new(-6900, 2)));
        assert_eq!(page.value(40, 2).as_number(), Some(Decimal::new(4512, 2)));

        let summary_page = workbook.page("Summary").unwrap();
        assert_eq!(summary_page.value(35, 2).as_number(), Some(Decimal::new(1245000, 2)));
        assert_eq!(summary_page.value(36, 2).as_number(), Some(Decimal::new(500000, 2)));
    }

    #[tokio::test]
    async fn totals_and_shares_follow_contributions() {
        let engine = engine().await;
        engine.run(&mut workbook(), &statements()).await.unwrap();

        let directory = engine.ledger().contributors().await.unwrap();
        let aa = directory.by_handle("AA").unwrap();
        let bb = directory.by_handle("BB").unwrap();
        let house = directory.house().unwrap();
        assert_eq!(aa.total, Money::from_cents(200000));
        assert_eq!(bb.total, Money::from_cents(50000));
        assert!((aa.share - 80.0).abs() < 1e-9);
        assert!((bb.share - 20.0).abs() < 1e-9);
        // Fees and ROI are booked to the house but never change totals.
        assert_eq!(house.total, Money::zero());
        assert!(aa.last_transaction_id.is_some());
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let engine = engine().await;
        let mut workbook = workbook();
        engine.run(&mut workbook, &statements()).await.unwrap();
        let after_first = workbook.clone();
        let totals_first: Vec<Money> = engine
            .ledger()
            .contributors()
            .await
            .unwrap()
            .iter()
            .map(|c| c.total)
            .collect();

        let summary = engine.run(&mut workbook, &statements()).await.unwrap();
        assert_eq!(summary.persisted(), 0);
        assert_eq!(summary.statements[0].duplicates, 4);
        assert_eq!(summary.accounts.unchanged, 2);
        assert_eq!(workbook, after_first);
        let totals_second: Vec<Money> = engine
            .ledger()
            .contributors()
            .await
            .unwrap()
            .iter()
            .map(|c| c.total)
            .collect();
        assert_eq!(totals_first, totals_second);
        assert_eq!(engine.ledger().transaction_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn report_failure_keeps_ledger_row() {
        let engine = engine().await;
        let mut workbook = workbook();
        workbook.page_mut("2017-2018").unwrap().lock(4, 2);

        let summary = engine.run(&mut workbook, &statements()).await.unwrap();
        let cheque = &summary.statements[0];
        assert_eq!(cheque.persisted, 4);
        assert_eq!(cheque.written, 3);

        let stored = engine.ledger().transactions().await.unwrap();
        assert!(stored.iter().any(|t| t.entry.key.reference == "BB AUG 17"));
        assert_eq!(
            workbook.page("2017-2018").unwrap().value(4, 2),
            &CellValue::Empty
        );
    }

    #[tokio::test]
    async fn unknown_transactions_are_not_persisted() {
        let engine = engine().await;
        let statement = Statement {
            number: CHEQUE,
            name: "Gold Cheque Account".to_string(),
            balance: Money::zero(),
            transactions: vec![line(CHEQUE, (2017, 8, 14), "POS", "AA BB AUG 17", 100)],
        };
        let summary = engine
            .process_statement(&mut workbook(), &statement)
            .await
            .unwrap();
        assert_eq!(summary.rejected, 1);
        assert_eq!(engine.ledger().transaction_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn uncategorized_account_rejects_everything() {
        let engine = engine().await;
        let statement = Statement {
            number: AccountNumber(5),
            name: "Credit Card".to_string(),
            balance: Money::zero(),
            transactions: vec![line(AccountNumber(5), (2017, 8, 15), "PAYMENT", "AA AUG 17", 100)],
        };
        let summary = engine
            .process_statement(&mut workbook(), &statement)
            .await
            .unwrap();
        assert_eq!(summary.rejected, 1);
    }

    #[tokio::test]
    async fn category_override_wins_over_name() {
        let config = Config::from_toml("[[accounts]]\nnumber = 5\ncategory = \"checking\"\n").unwrap();
        let engine = Engine::start(ledger().await, &config).await.unwrap();
        assert_eq!(
            engine.category_of(AccountNumber(5), "Credit Card"),
            Some(AccountCategory::Checking)
        );
    }

    #[tokio::test]
    async fn empty_directory_is_fatal() {
        let ledger = SqliteLedger::in_memory().await.unwrap();
        assert!(matches!(
            Engine::start(ledger, &Config::default()).await,
            Err(ReconcileError::EmptyDirectory)
        ));
    }

    #[tokio::test]
    async fn backfill_uses_known_contributor_and_skips_duplicates() {
        let engine = engine().await;
        let mut workbook = workbook();
        let rows = vec![
            BackfillRow {
                date: NaiveDate::from_ymd_opt(2017, 9, 3).unwrap(),
                description: "CASH DEPOSIT".to_string(),
                reference: "AUG 17 CONTRIBUTION".to_string(),
                fee: String::new(),
                amount: Money::from_cents(100000),
                contributor: Some(ContributorId(3)),
            },
            BackfillRow {
                date: NaiveDate::from_ymd_opt(2017, 9, 4).unwrap(),
                description: "CASH DEPOSIT".to_string(),
                reference: "NOTHING".to_string(),
                fee: String::new(),
                amount: Money::from_cents(100),
                contributor: Some(ContributorId(99)),
            },
        ];

        let summary = engine
            .backfill(&mut workbook, CHEQUE, rows.clone())
            .await
            .unwrap();
        assert_eq!(summary.persisted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(
            workbook.page("2017-2018").unwrap().value(4, 2).as_number(),
            Some(Decimal::new(100000, 2))
        );

        let again = engine.backfill(&mut workbook, CHEQUE, rows).await.unwrap();
        assert_eq!(again.duplicates, 1);
        assert_eq!(again.persisted, 0);
    }

    #[tokio::test]
    async fn backfill_applies_rows_oldest_first() {
        let engine = engine().await;
        let mut workbook = workbook();
        let row = |day: u32, reference: &str, cents: i64| BackfillRow {
            date: NaiveDate::from_ymd_opt(2017, 9, day).unwrap(),
            description: "CASH DEPOSIT".to_string(),
            reference: reference.to_string(),
            fee: String::new(),
            amount: Money::from_cents(cents),
            contributor: Some(ContributorId(3)),
        };
        let rows = vec![row(20, "SEP 17", 20000), row(5, "AUG 17", 10000)];

        engine.backfill(&mut workbook, CHEQUE, rows).await.unwrap();

        let stored = engine.ledger().transactions().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].entry.key.reference, "AUG 17");
        assert_eq!(stored[1].entry.key.reference, "SEP 17");
        let directory = engine.ledger().contributors().await.unwrap();
        let bb = directory.get(ContributorId(3)).unwrap();
        assert_eq!(bb.last_transaction_id, Some(stored[1].id));
        assert_eq!(bb.total, Money::from_cents(30000));
    }
}
