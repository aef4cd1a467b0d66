//! Returnbook CLI: maintain and inspect the monthly returns table.
//!
//! Commands:
//! - `update`: fetch daily closes, derive monthly returns, merge into the store
//! - `show`: print the stored table as a year × month grid with summary stats

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use returnbook_core::{
    run_update, yearly_returns, Baseline, Config, CsvSource, FetchWindow, MalformedPolicy, Month,
    PriceSource, ReturnsTable, RunSummary, TableStats, TableStore, YahooSource,
};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "returnbook",
    about = "Returnbook: cumulative monthly return history for a market index"
)]
struct Cli {
    /// TOML config file. Every setting has a default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the returns table (overrides the config file).
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch recent prices and merge the derived monthly returns into the store.
    Update {
        /// Instrument symbol (e.g. ^NSEI).
        #[arg(long)]
        symbol: Option<String>,

        /// Fetch this many whole months before the current one.
        #[arg(long, conflicts_with = "full_history")]
        months: Option<u32>,

        /// Fetch the entire available history.
        #[arg(long, default_value_t = false)]
        full_history: bool,

        /// Import closes from a CSV export instead of Yahoo Finance.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// What to do if the stored table cannot be parsed.
        #[arg(long, value_enum)]
        on_malformed: Option<PolicyArg>,

        /// Treat this date (YYYY-MM-DD) as today. Defaults to the local date.
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Print the stored table.
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Quarantine,
    Abort,
}

impl From<PolicyArg> for MalformedPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Quarantine => MalformedPolicy::Quarantine,
            PolicyArg::Abort => MalformedPolicy::Abort,
        }
    }
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(store) = cli.store {
        config.store_path = store;
    }

    match cli.command {
        Commands::Update {
            symbol,
            months,
            full_history,
            csv,
            on_malformed,
            as_of,
        } => {
            if let Some(symbol) = symbol {
                config.symbol = symbol;
            }
            if full_history {
                config.window = FetchWindow::Full;
            } else if let Some(months) = months {
                config.window = FetchWindow::Recent { months };
            }
            if let Some(policy) = on_malformed {
                config.on_malformed = policy.into();
            }
            run_update_cmd(&config, csv, as_of.as_deref())
        }
        Commands::Show => run_show(&config),
    }
}

fn run_update_cmd(config: &Config, csv: Option<PathBuf>, as_of: Option<&str>) -> Result<()> {
    let as_of = as_of
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("--as-of must be YYYY-MM-DD")?
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let source: Box<dyn PriceSource> = match csv {
        Some(path) => Box::new(CsvSource::new(path)),
        None => Box::new(YahooSource::new(&config.yahoo)?),
    };

    let summary = run_update(config, &*source, as_of).map_err(|e| {
        let stage = e.stage();
        anyhow::Error::new(e).context(format!("{stage} stage failed"))
    })?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(s: &RunSummary) {
    println!("Updated {} ({}, {})", s.store_path.display(), s.symbol, s.window);
    println!(
        "  Samples:  {} fetched from {}, {} used",
        s.samples_fetched, s.source, s.samples_used
    );
    if s.invalid_samples + s.duplicate_samples > 0 {
        println!(
            "            {} invalid, {} duplicate dates dropped",
            s.invalid_samples, s.duplicate_samples
        );
    }
    match s.derived_span {
        Some(((y0, m0), (y1, m1))) => println!(
            "  Returns:  {} derived, {m0} {y0} to {m1} {y1}",
            s.records_derived
        ),
        None => println!("  Returns:  none derived (fewer than two months of data)"),
    }
    match &s.baseline {
        Baseline::Missing => println!("  Baseline: no existing table"),
        Baseline::Loaded { cells } => println!("  Baseline: {cells} stored months"),
        Baseline::Quarantined { path } => {
            println!("  Baseline: malformed table moved to {}", path.display())
        }
    }
    println!(
        "  Merge:    {} inserted, {} overwritten, {} unchanged",
        s.merge.inserted, s.merge.overwritten, s.merge.unchanged
    );
    println!(
        "  Table:    {} years, {} months{}",
        s.table_years,
        s.table_cells,
        if s.changed { "" } else { " (no change on disk)" }
    );
}

fn run_show(config: &Config) -> Result<()> {
    let store = TableStore::new(&config.store_path);
    let Some(table) = store.load()? else {
        println!("No returns table at {}", store.path().display());
        return Ok(());
    };

    print!("{}", format_grid(&table));

    if let Some(stats) = TableStats::compute(&table) {
        println!();
        println!(
            "Best month:  {} {} ({:+.2}%)",
            stats.best.month, stats.best.year, stats.best.return_pct
        );
        println!(
            "Worst month: {} {} ({:+.2}%)",
            stats.worst.month, stats.worst.year, stats.worst.return_pct
        );
        println!(
            "Average:     {:+.2}% over {} months",
            stats.average, stats.count
        );
    }

    Ok(())
}

/// Year × month grid with a compounded yearly column, newest year first.
fn format_grid(table: &ReturnsTable) -> String {
    let yearly = yearly_returns(table);
    let mut out = format!("{:<6}", "Year");
    for m in Month::ALL {
        out.push_str(&format!("{:>8}", m.label()));
    }
    out.push_str(&format!("{:>9}\n", "Year%"));
    out.push_str(&"-".repeat(6 + 8 * 12 + 9));
    out.push('\n');

    for year in table.years().rev() {
        out.push_str(&format!("{year:<6}"));
        for m in Month::ALL {
            match table.get(year, m) {
                Some(v) => out.push_str(&format!("{v:>8.2}")),
                None => out.push_str(&format!("{:>8}", "-")),
            }
        }
        if let Some(y) = yearly.get(&year) {
            out.push_str(&format!("{y:>9.2}"));
        }
        out.push('\n');
    }
    out
}
