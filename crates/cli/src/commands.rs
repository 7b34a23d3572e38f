use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use topline_core::{AccountNumber, Config};
use topline_import::{import_backfill, load_feed, BackfillProfile};
use topline_reconcile::{AccountSummary, Engine};
use topline_report::Workbook;
use topline_storage::{snapshot, Ledger, SqliteLedger};

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::warn!("Config file {} not found, using defaults", path.display());
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("loading config {}", path.display()))
}

pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let content = Config::default()
        .to_toml()
        .context("serializing default config")?;
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn open_ledger(config: &Config) -> Result<SqliteLedger> {
    SqliteLedger::open(&config.ledger.path, &config.ledger.roster)
        .await
        .with_context(|| format!("opening ledger {}", config.ledger.path.display()))
}

fn open_report(config: &Config) -> Result<Workbook> {
    Workbook::open(&config.report.path)
        .with_context(|| format!("opening report {}", config.report.path.display()))
}

pub async fn run(
    config: &Config,
    feed: &Path,
    output: Option<PathBuf>,
    backup: bool,
) -> Result<()> {
    let statements =
        load_feed(feed).with_context(|| format!("reading statement feed {}", feed.display()))?;

    if let (true, Some(dir)) = (backup, &config.backup.dir) {
        let files = [config.ledger.path.as_path(), config.report.path.as_path()];
        snapshot(dir, &files).context("writing snapshot")?;
    }

    let ledger = open_ledger(config).await?;
    let mut workbook = match open_report(config) {
        Ok(workbook) => workbook,
        Err(e) => {
            ledger.close().await;
            return Err(e);
        }
    };
    let engine = Engine::start(ledger, config)
        .await
        .context("starting reconciliation")?;

    let result = engine.run(&mut workbook, &statements).await;
    engine.into_ledger().close().await;

    match result {
        Ok(summary) => {
            let output = output.or_else(|| config.report.output.clone());
            workbook.close(output.as_deref()).context("saving report")?;
            print_summaries(&summary.statements);
            Ok(())
        }
        Err(e) => {
            workbook.close(None)?;
            Err(e).context("reconciliation aborted")
        }
    }
}

pub async fn backfill(
    config: &Config,
    csv: &Path,
    account: i64,
    profile: &BackfillProfile,
    output: Option<PathBuf>,
) -> Result<()> {
    let file = std::fs::File::open(csv).with_context(|| format!("opening {}", csv.display()))?;
    let rows = import_backfill(file, profile)
        .with_context(|| format!("reading backfill file {}", csv.display()))?;

    let ledger = open_ledger(config).await?;
    let mut workbook = match open_report(config) {
        Ok(workbook) => workbook,
        Err(e) => {
            ledger.close().await;
            return Err(e);
        }
    };
    let engine = Engine::start(ledger, config)
        .await
        .context("starting reconciliation")?;

    let result = engine
        .backfill(&mut workbook, AccountNumber(account), rows)
        .await;
    engine.into_ledger().close().await;

    match result {
        Ok(summary) => {
            let output = output.or_else(|| config.report.output.clone());
            workbook.close(output.as_deref()).context("saving report")?;
            print_summaries(std::slice::from_ref(&summary));
            Ok(())
        }
        Err(e) => {
            workbook.close(None)?;
            Err(e).context("backfill aborted")
        }
    }
}

pub async fn contributors(config: &Config) -> Result<()> {
    let ledger = open_ledger(config).await?;
    let directory = ledger.contributors().await;
    ledger.close().await;
    let directory = directory.context("reading contributors")?;

    let width = directory
        .iter()
        .map(|c| c.display_name.len())
        .max()
        .unwrap_or(0);
    for c in directory.iter() {
        let handles = c.handles().collect::<Vec<_>>().join("/");
        let marker = if c.is_house { " (house)" } else { "" };
        println!(
            "{:<10} {:width$} {:>12} {:>7.2}%{}",
            handles,
            c.display_name,
            c.total.to_string(),
            c.share,
            marker,
            width = width
        );
    }
    Ok(())
}

pub async fn accounts(config: &Config) -> Result<()> {
    let ledger = open_ledger(config).await?;
    let accounts = ledger.list_accounts().await;
    ledger.close().await;

    for account in accounts.context("reading accounts")? {
        let category = account
            .category
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<14} {:<32} {:<9} {:>12}{}",
            account.number.0,
            account.display_name,
            category,
            account.balance.to_string(),
            if account.is_active { "" } else { " (inactive)" }
        );
    }
    Ok(())
}

fn print_summaries(summaries: &[AccountSummary]) {
    for s in summaries {
        println!(
            "{:<14} {:<32} processed {:>4}  persisted {:>4}  written {:>4}  duplicates {:>4}  unknown {:>4}",
            s.account.0, s.name, s.processed, s.persisted, s.written, s.duplicates, s.rejected
        );
    }
}
