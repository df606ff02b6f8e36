mod aggregate;
mod anomaly;
mod cli;
mod config;
mod error;
mod filter;
mod loader;
mod output;
mod quota;
mod session;
mod types;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Command, OutputFormat};
use config::Config;
use filter::FilterSpec;
use output::Money;
use session::Session;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn resolve_input(cli: &Cli, config: &Config) -> Result<PathBuf> {
    if let Some(path) = &cli.file {
        return Ok(path.clone());
    }
    if config.sample_file.exists() {
        debug!(path = %config.sample_file.display(), "using sample file");
        return Ok(config.sample_file.clone());
    }
    bail!(
        "No input file. Pass an Excel or CSV export with --file, or place {} in the working directory.",
        config.sample_file.display()
    )
}

fn build_filter(cli: &Cli, session: &Session) -> FilterSpec {
    let (mut from, mut to) = match cli.range.and_then(|p| session.preset_range(p)) {
        Some((from, to)) => (Some(from), Some(to)),
        None => (None, None),
    };
    if cli.from.is_some() {
        from = cli.from;
    }
    if cli.to.is_some() {
        to = cli.to;
    }

    FilterSpec::default()
        .between(from, to)
        .with_subaccounts(cli.subaccount.iter().cloned())
        .with_services(cli.service.iter().cloned())
        .excluding_subaccounts(cli.exclude_subaccount.iter().cloned())
        .excluding_directories(cli.exclude_directory.iter().cloned())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;
    let input = resolve_input(&cli, &config)?;

    let loaded = loader::load_file(&input, &config.loader_options())
        .with_context(|| format!("Failed to load {}", input.display()))?;
    let session = Session::new(loaded, config.analysis_settings(cli.top));
    output::print_warning(session.diagnostics());

    let mode = cli.effective_command();
    if mode == Command::Options {
        let options = session.options();
        return match cli.format {
            OutputFormat::Json => output::print_json(&options),
            OutputFormat::Table => {
                output::print_options(&options);
                Ok(())
            }
        };
    }

    let spec = build_filter(&cli, &session);
    let report = session.analyze(&spec);

    if cli.format == OutputFormat::Json {
        return match mode {
            Command::Summary => output::print_json(&report),
            Command::Subaccounts => output::print_json(&report.by_subaccount),
            Command::Services => output::print_json(&report.by_service),
            Command::Labels => output::print_json(&report.by_label),
            Command::Trend => output::print_json(&report.trend),
            Command::Anomalies => output::print_json(&(&report.trend, &report.outliers)),
            Command::Quota => output::print_json(&(&report.quota, &report.quota_overview)),
            Command::Breakdown => output::print_json(&report.breakdown),
            Command::Records => output::print_json(&report.records),
            Command::Options => Ok(()),
        };
    }

    if report.is_empty() && mode != Command::Quota {
        output::print_empty();
        return Ok(());
    }

    let top = session.settings().top_n;
    let money = Money::new(&config.currency_symbol);
    match mode {
        Command::Summary => output::print_summary(&report, top, &money),
        Command::Subaccounts => {
            output::print_aggregate("Cost by Subaccount", "Subaccount", &report.by_subaccount, top, &money)
        }
        Command::Services => {
            output::print_aggregate("Cost by Service", "Service", &report.by_service, top, &money)
        }
        Command::Labels => output::print_labels(&report, top, &money),
        Command::Trend => output::print_trend(&report, &money),
        Command::Anomalies => output::print_anomalies(&report, &money),
        Command::Quota => output::print_quota(&report),
        Command::Breakdown => output::print_breakdown(&report, top, &money),
        Command::Records => output::print_records(&report, &money),
        Command::Options => {}
    }

    Ok(())
}
