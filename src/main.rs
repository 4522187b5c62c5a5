//! QuakeWatch - Turkish earthquake monitoring from your terminal.
//!
//! Follows the Kandilli feed on a fixed 5-minute wall-clock grid, tracks
//! deltas between refreshes, and serves a live map dashboard.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::error;

mod cli;
mod client;
mod errors;
mod export;
mod filters;
mod models;
mod output;
mod schedule;
mod server;
mod stats;
mod visual;

use cli::{Cli, Command};
use client::{FeedSource, KandilliClient};
use schedule::{Scheduler, SyncUpdate};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;

    match cli.command {
        Command::Tail(args) => runtime.block_on(cmd_tail(args, cli.api_base)),
        Command::Live(args) => runtime.block_on(cmd_live(args, cli.api_base)),
        Command::Stats(args) => runtime.block_on(cmd_stats(args, cli.api_base)),
        Command::Export(args) => runtime.block_on(cmd_export(args, cli.api_base)),
        Command::Ui(args) => runtime.block_on(cmd_ui(args, cli.api_base)),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn build_client(api_base: Option<String>) -> Result<KandilliClient> {
    let client = match api_base {
        Some(base) => KandilliClient::with_base_url(base),
        None => KandilliClient::new(),
    };
    client.context("failed to create Kandilli client")
}

/// Execute the `tail` command - one-shot fetch of recent earthquakes.
async fn cmd_tail(args: cli::TailArgs, api_base: Option<String>) -> Result<()> {
    let client = build_client(api_base)?;
    let state = args.filters.to_state();

    let envelope = if let Some(limit) = args.latest {
        client.fetch_latest(limit).await
    } else if let Some(code) = args.city_code {
        client.fetch_city(code, &state.criteria()).await
    } else if let Some(month) = args.month {
        client.fetch_historical(month.year, month.month).await
    } else {
        client.fetch(&state.plan()).await
    }
    .context("failed to fetch earthquake feed")?;

    // The latest-N and archive endpoints take no criteria; narrow locally
    let mut events = envelope.events;
    events.retain(|event| state.matches(event));

    // Sort by time descending (most recent first)
    events.sort_by(|a, b| b.occurred_at().cmp(&a.occurred_at()));

    if events.len() > args.limit {
        tracing::debug!("showing {} of {} matching events", args.limit, events.len());
    }
    events.truncate(args.limit);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_events(&mut handle, &events, args.format)?;

    Ok(())
}

/// Execute the `live` command - follow the feed on the refresh grid.
async fn cmd_live(args: cli::LiveArgs, api_base: Option<String>) -> Result<()> {
    let client = build_client(api_base)?;
    let source: Arc<dyn FeedSource + Send + Sync> = Arc::new(client);

    let (scheduler, handle) = Scheduler::new(source, args.filters.to_state());
    let mut updates = handle.subscribe();
    let driver = tokio::spawn(scheduler.run());

    // Print startup banner
    {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "\x1b[1m🌍 QuakeWatch Live\x1b[0m")?;
        writeln!(
            out,
            "\x1b[2mKandilli feed | refresh on 5-minute marks | Press Ctrl+C to stop\x1b[0m"
        )?;
        writeln!(
            out,
            "\x1b[2m─────────────────────────────────────────────────────────────────────\x1b[0m"
        )?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update {
                Ok(SyncUpdate::Refreshed { snapshot, fresh, first_load, window }) => {
                    let stdout = io::stdout();
                    let mut out = stdout.lock();
                    if first_load {
                        output::write_events(&mut out, &snapshot.events, args.format)?;
                    } else if fresh.is_empty() {
                        tracing::info!("refresh complete: no new events");
                    } else {
                        output::write_events(&mut out, &fresh, args.format)?;
                        tracing::info!("refresh complete: {} new events", fresh.len());
                    }
                    let _ = out.flush();
                    tracing::debug!("next refresh at {}", window.next);
                }
                Ok(SyncUpdate::Skipped { window }) => {
                    tracing::debug!("interval already cached; next refresh at {}", window.next);
                }
                Ok(SyncUpdate::Failed { error, .. }) => {
                    tracing::warn!("refresh failed, will retry: {}", error);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("output lagging; {} updates dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    handle.dispose();
    // The driver exits promptly once disposed
    let _ = driver.await;
    Ok(())
}

/// Execute the `stats` command - aggregate the current feed.
async fn cmd_stats(args: cli::StatsArgs, api_base: Option<String>) -> Result<()> {
    let client = build_client(api_base)?;
    let state = args.filters.to_state();

    let envelope = client
        .fetch(&state.plan())
        .await
        .context("failed to fetch earthquake feed")?;
    let mut events = envelope.events;
    events.retain(|event| state.matches(event));

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match stats::summarize(&events) {
        Some(summary) => output::write_summary(&mut handle, &summary, args.format)?,
        None => writeln!(handle, "no events in the current window")?,
    }

    Ok(())
}

/// Execute the `export` command - write the current feed to a CSV file.
async fn cmd_export(args: cli::ExportArgs, api_base: Option<String>) -> Result<()> {
    let client = build_client(api_base)?;
    let state = args.filters.to_state();

    let envelope = client
        .fetch(&state.plan())
        .await
        .context("failed to fetch earthquake feed")?;
    let mut events = envelope.events;
    events.retain(|event| state.matches(event));

    let csv = export::to_csv(&events);
    if csv.is_empty() {
        anyhow::bail!("no events to export");
    }

    let path = args.output.unwrap_or_else(|| {
        export::csv_filename(chrono::Utc::now().date_naive()).into()
    });
    std::fs::write(&path, csv).with_context(|| format!("failed to write {}", path.display()))?;

    println!("Exported {} events to {}", events.len(), path.display());
    Ok(())
}

/// Execute the `ui` command - start the dashboard server.
async fn cmd_ui(args: cli::UiArgs, api_base: Option<String>) -> Result<()> {
    let config = server::ServerConfig {
        port: args.port,
        host: args.host.clone(),
        filters: args.filters.to_state(),
        api_base,
    };

    // Print startup message
    let url = format!("http://{}:{}", args.host, args.port);
    println!("\x1b[1m🌍 QuakeWatch Dashboard\x1b[0m");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("  Local:   \x1b[96m{url}\x1b[0m");
    println!("  Feed:    Kandilli (api.orhanaydogdu.com.tr)");
    println!("  Refresh: every 5 minutes on the wall-clock grid");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("\x1b[2mPress Ctrl+C to stop\x1b[0m\n");

    // Open browser if requested (using xdg-open/open command)
    if args.open {
        #[cfg(target_os = "linux")]
        let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
        #[cfg(target_os = "macos")]
        let _ = std::process::Command::new("open").arg(&url).spawn();
        #[cfg(target_os = "windows")]
        let _ = std::process::Command::new("cmd").args(["/c", "start", &url]).spawn();
    }

    server::run_server(config).await
}
