use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

mod commands;

#[derive(Parser)]
#[command(author, version, about = "Reconcile bank statements into the contributor ledger and report", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "topline.toml")]
    config: PathBuf,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a statement feed into the ledger and the report.
    Run {
        #[arg(long, value_name = "FILE")]
        feed: PathBuf,
        /// Save the report here instead of the configured output.
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
        #[arg(long)]
        no_backup: bool,
    },
    /// Import a delimited backfill file for one account.
    Backfill {
        csv: PathBuf,
        #[arg(long)]
        account: i64,
        #[arg(long)]
        no_header: bool,
        #[arg(long, default_value = ",")]
        delimiter: String,
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// List contributors with their totals and shares.
    Contributors,
    /// List known bank accounts.
    Accounts,
    /// Write a configuration file with every default spelled out.
    InitConfig {
        #[arg(long)]
        force: bool,
    },
}

fn log_filter(verbose: u8) -> String {
    match verbose {
        0 => std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        1 => "debug".into(),
        _ => "trace".into(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_filter(cli.verbose)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Commands::InitConfig { force } = cli.command {
        return commands::init_config(&cli.config, force);
    }

    let config = commands::load_config(&cli.config)?;
    match cli.command {
        Commands::Run {
            feed,
            output,
            no_backup,
        } => commands::run(&config, &feed, output, !no_backup).await,
        Commands::Backfill {
            csv,
            account,
            no_header,
            delimiter,
            output,
        } => {
            let profile = topline_import::BackfillProfile {
                has_header: !no_header,
                delimiter,
                ..Default::default()
            };
            commands::backfill(&config, &csv, account, &profile, output).await
        }
        Commands::Contributors => commands::contributors(&config).await,
        Commands::Accounts => commands::accounts(&config).await,
        Commands::InitConfig { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_verbosity() {
        let cli = Cli::parse_from(["topline", "-vv", "run", "--feed", "feed.json"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, PathBuf::from("topline.toml"));
        assert!(matches!(cli.command, Commands::Run { no_backup: false, .. }));
        assert_eq!(log_filter(2), "trace");
    }

    #[test]
    fn parses_backfill() {
        let cli = Cli::parse_from([
            "topline",
            "--config",
            "other.toml",
            "backfill",
            "old.csv",
            "--account",
            "62000000001",
            "--no-header",
        ]);
        match cli.command {
            Commands::Backfill {
                account, no_header, ..
            } => {
                assert_eq!(account, 62000000001);
                assert!(no_header);
            }
            _ => panic!("expected backfill"),
        }
    }
}
