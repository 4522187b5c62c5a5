//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing.

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};

use crate::filters::{self, FilterState};
use crate::output::Format;

/// Turkish earthquake monitoring from your terminal.
#[derive(Parser, Debug)]
#[command(name = "quakewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Override the Kandilli API base URL
    #[arg(long, global = true, value_name = "URL")]
    pub api_base: Option<String>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show recent earthquakes (one-shot fetch and exit)
    Tail(TailArgs),

    /// Follow the feed on the 5-minute refresh grid
    Live(LiveArgs),

    /// Summarize the current feed (counts, averages, extremes)
    Stats(StatsArgs),

    /// Write the current feed to a CSV file
    Export(ExportArgs),

    /// Start the web dashboard server
    Ui(UiArgs),
}

/// Filter options shared by the listing commands.
#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Minimum magnitude (0 disables the floor)
    #[arg(long, default_value = "0")]
    pub min_magnitude: f64,

    /// Maximum magnitude
    #[arg(long)]
    pub max_magnitude: Option<f64>,

    /// Minimum depth in km
    #[arg(long)]
    pub min_depth: Option<f64>,

    /// Maximum depth in km
    #[arg(long)]
    pub max_depth: Option<f64>,

    /// Window start, YYYY-MM-DD or "YYYY-MM-DD HH:MM:SS"
    #[arg(long, value_parser = parse_start_bound)]
    pub start: Option<NaiveDateTime>,

    /// Window end, YYYY-MM-DD or "YYYY-MM-DD HH:MM:SS"
    #[arg(long, value_parser = parse_end_bound)]
    pub end: Option<NaiveDateTime>,
}

impl FilterArgs {
    /// Convert parsed flags into scheduler filter state.
    #[must_use]
    pub fn to_state(&self) -> FilterState {
        FilterState {
            min_magnitude: self.min_magnitude,
            max_magnitude: self.max_magnitude,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
            starts: self.start,
            ends: self.end,
        }
    }
}

/// Arguments for the `tail` command.
#[derive(Parser, Debug)]
pub struct TailArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Fetch the N most recent events instead of the live window
    #[arg(long, value_name = "N", conflicts_with_all = ["city_code", "month"])]
    pub latest: Option<usize>,

    /// Restrict to a province by provider city code
    #[arg(long, value_name = "CODE")]
    pub city_code: Option<u32>,

    /// Fetch an archived month (YYYY-MM)
    #[arg(long, value_parser = parse_month, conflicts_with = "city_code")]
    pub month: Option<ArchiveMonth>,

    /// Maximum number of events to show
    #[arg(long, short = 'n', default_value = "50")]
    pub limit: usize,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Arguments for the `live` command.
#[derive(Parser, Debug)]
pub struct LiveArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Arguments for the `stats` command.
#[derive(Parser, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Arguments for the `export` command.
#[derive(Parser, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Output file (defaults to turkish_earthquakes_<date>.csv)
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<std::path::PathBuf>,
}

/// Arguments for the `ui` command.
#[derive(Parser, Debug)]
pub struct UiArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,
}

/// A calendar month of the Kandilli archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveMonth {
    pub year: i32,
    pub month: u32,
}

impl std::str::FromStr for ArchiveMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("invalid month: {s} (expected YYYY-MM)"))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("invalid year in: {s}"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("invalid month in: {s}"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range: {month}"));
        }
        Ok(Self { year, month })
    }
}

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}

/// Parse an archive month from string.
fn parse_month(s: &str) -> Result<ArchiveMonth, String> {
    s.parse()
}

/// Parse a window start, defaulting the time to midnight.
fn parse_start_bound(s: &str) -> Result<NaiveDateTime, String> {
    filters::parse_bound(s, false)
}

/// Parse a window end, defaulting the time to end of day.
fn parse_end_bound(s: &str) -> Result<NaiveDateTime, String> {
    filters::parse_bound(s, true)
}
