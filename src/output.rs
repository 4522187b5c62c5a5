//! Output formatters for earthquake events.
//!
//! Supports human-readable (with colors), JSON, NDJSON, and CSV formats.

use std::io::{self, Write};

use serde::Serialize;

use crate::export;
use crate::models::{EventRecord, Quake};
use crate::stats::{BandCounts, MagnitudeBand, Summary};
use crate::visual;

// ANSI color codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const ICON_QUAKE: &str = "🌍";

/// Widest bar in the band histogram.
const HISTOGRAM_WIDTH: usize = 30;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable terminal output (default)
    #[default]
    Human,
    /// JSON array
    Json,
    /// Newline-delimited JSON (one object per line)
    Ndjson,
    /// Comma-delimited download format
    Csv,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "ndjson" => Ok(Self::Ndjson),
            "csv" => Ok(Self::Csv),
            _ => Err(format!(
                "unknown format: {s} (expected: human, json, ndjson, csv)"
            )),
        }
    }
}

/// Write events in human-readable format.
///
/// One line per event, magnitude tinted with the same color the map
/// markers use.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_human<W: Write>(writer: &mut W, events: &[Quake]) -> io::Result<()> {
    for event in events {
        let color = visual::marker_color(event.mag).ansi_fg();
        let band = MagnitudeBand::classify(event.mag).name();
        let city = &event.location_properties.closest_city.name;

        writeln!(
            writer,
            "{ICON_QUAKE} {color}{BOLD}M{:.1}{RESET} │ \
             {color}{band:8}{RESET} │ \
             {DIM}{:>5.1}km{RESET} │ \
             {} {} │ \
             {} {DIM}({city} {:.1}km){RESET}",
            event.mag,
            event.depth,
            event.date_time,
            event.location_tz,
            event.title,
            event.closest_city_km(),
        )?;
    }
    Ok(())
}

/// Write events as a JSON array.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write>(writer: &mut W, events: &[Quake]) -> io::Result<()> {
    let output: Vec<EventRecord> = events.iter().map(EventRecord::from).collect();
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{json}")
}

/// Write events as newline-delimited JSON.
///
/// Each event is written as a single line of JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_ndjson<W: Write>(writer: &mut W, events: &[Quake]) -> io::Result<()> {
    for event in events {
        let output = EventRecord::from(event);
        let json = serde_json::to_string(&output)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{json}")?;
    }
    Ok(())
}

/// Write events in the specified format.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_events<W: Write>(writer: &mut W, events: &[Quake], format: Format) -> io::Result<()> {
    match format {
        Format::Human => write_human(writer, events),
        Format::Json => write_json(writer, events),
        Format::Ndjson => write_ndjson(writer, events),
        Format::Csv => export::write_csv(writer, events),
    }
}

/// Serializable projection of a [`Summary`].
#[derive(Debug, Serialize)]
pub struct SummaryRecord {
    pub total: usize,
    pub average_magnitude: f64,
    pub average_depth_km: f64,
    pub bands: BandCounts,
    pub strongest: EventRecord,
    pub most_recent: EventRecord,
}

impl From<&Summary> for SummaryRecord {
    fn from(summary: &Summary) -> Self {
        Self {
            total: summary.total,
            average_magnitude: summary.avg_magnitude,
            average_depth_km: summary.avg_depth,
            bands: summary.bands,
            strongest: EventRecord::from(&summary.strongest),
            most_recent: EventRecord::from(&summary.most_recent),
        }
    }
}

/// Write aggregate statistics in the specified format.
///
/// # Errors
///
/// Returns an error if writing fails, or for [`Format::Csv`], which only
/// covers event listings.
pub fn write_summary<W: Write>(
    writer: &mut W,
    summary: &Summary,
    format: Format,
) -> io::Result<()> {
    match format {
        Format::Human => write_summary_human(writer, summary),
        Format::Json => {
            let record = SummaryRecord::from(summary);
            let json = serde_json::to_string_pretty(&record)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{json}")
        }
        Format::Ndjson => {
            let record = SummaryRecord::from(summary);
            let json = serde_json::to_string(&record)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{json}")
        }
        Format::Csv => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "csv output covers event listings only",
        )),
    }
}

fn write_summary_human<W: Write>(writer: &mut W, summary: &Summary) -> io::Result<()> {
    writeln!(
        writer,
        "{BOLD}Seismic summary{RESET} {DIM}│{RESET} {} events",
        summary.total
    )?;
    writeln!(writer, "  Average magnitude  M{:.1}", summary.avg_magnitude)?;
    writeln!(writer, "  Average depth      {:.1} km", summary.avg_depth)?;
    writeln!(writer, "  Strongest          {}", event_brief(&summary.strongest))?;
    writeln!(writer, "  Most recent        {}", event_brief(&summary.most_recent))?;
    writeln!(writer)?;

    let max = summary
        .bands
        .rows()
        .iter()
        .map(|(_, count)| *count)
        .max()
        .unwrap_or(0);
    for (band, count) in summary.bands.rows() {
        let color = visual::marker_color(band_midpoint(band)).ansi_fg();
        let bar = histogram_bar(count, max);
        writeln!(
            writer,
            "  {:18} {count:>6} {color}{bar}{RESET}",
            band.label()
        )?;
    }
    Ok(())
}

fn event_brief(event: &Quake) -> String {
    format!("M{:.1}  {}  ({})", event.mag, event.title, event.date_time)
}

/// Representative magnitude used to tint a band's histogram bar.
fn band_midpoint(band: MagnitudeBand) -> f64 {
    match band {
        MagnitudeBand::Minor => 2.0,
        MagnitudeBand::Light => 3.5,
        MagnitudeBand::Moderate => 4.5,
        MagnitudeBand::Strong => 5.5,
        MagnitudeBand::Major => 6.5,
    }
}

fn histogram_bar(count: usize, max: usize) -> String {
    if count == 0 || max == 0 {
        return String::new();
    }
    let len = (count * HISTOGRAM_WIDTH).div_ceil(max);
    "█".repeat(len)
}
