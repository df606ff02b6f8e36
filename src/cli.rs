use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use crate::filter::DatePreset;

#[derive(Parser, Debug)]
#[command(
    name = "btpcost",
    version,
    about = "Cost and usage analysis for SAP BTP cost exports"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Excel or CSV export to analyze (defaults to the configured sample file)
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    /// Start date filter (YYYY-MM-DD)
    #[arg(long, global = true)]
    pub from: Option<NaiveDate>,

    /// End date filter (YYYY-MM-DD)
    #[arg(long, global = true)]
    pub to: Option<NaiveDate>,

    /// Relative range ending at the newest record; --from/--to override its bounds
    #[arg(long, global = true)]
    pub range: Option<DatePreset>,

    /// Only these subaccounts (comma-separated)
    #[arg(long, global = true, value_delimiter = ',')]
    pub subaccount: Vec<String>,

    /// Only these services (comma-separated)
    #[arg(long, global = true, value_delimiter = ',')]
    pub service: Vec<String>,

    /// Leave these subaccounts out of every analysis
    #[arg(long, global = true, value_delimiter = ',')]
    pub exclude_subaccount: Vec<String>,

    /// Leave these directories out of every analysis
    #[arg(long, global = true, value_delimiter = ',')]
    pub exclude_directory: Vec<String>,

    /// Rows shown per ranking before the rest is folded into "Other"
    #[arg(long, global = true)]
    pub top: Option<usize>,

    /// Output format: table (default), json
    #[arg(long, global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log loader and filter decisions to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Key metrics plus top subaccounts and services (default)
    Summary,
    /// Cost by subaccount
    Subaccounts,
    /// Cost by service
    Services,
    /// Cost by label
    Labels,
    /// Daily cost with moving average
    Trend,
    /// Days above the moving-average threshold and per-service outliers
    Anomalies,
    /// Quota utilization per subaccount and the global quota overview
    Quota,
    /// Service breakdown of the most expensive subaccounts
    Breakdown,
    /// Filtered records
    Records,
    /// Values available for --subaccount, --service and --exclude-directory
    Options,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl Cli {
    pub fn effective_command(&self) -> Command {
        self.command.unwrap_or(Command::Summary)
    }
}
