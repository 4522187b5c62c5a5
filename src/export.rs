//! CSV encoding for event listings.
//!
//! Produces the comma-delimited download format: one header row, one
//! row per event, UTF-8.

use std::io::{self, Write};

use chrono::NaiveDate;

use crate::models::Quake;

/// Column headers, in the order row fields are written.
const CSV_HEADERS: [&str; 9] = [
    "ID",
    "Title",
    "Date",
    "Magnitude",
    "Depth",
    "Latitude",
    "Longitude",
    "Closest City",
    "Distance (km)",
];

/// Download filename for an export generated on `date`.
#[must_use]
pub fn csv_filename(date: NaiveDate) -> String {
    format!("turkish_earthquakes_{}.csv", date.format("%Y-%m-%d"))
}

/// Encode events as comma-delimited text.
///
/// Returns an empty string for an empty slice; callers use that to skip
/// the download entirely rather than serving a header-only file.
#[must_use]
pub fn to_csv(events: &[Quake]) -> String {
    if events.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(&CSV_HEADERS.join(","));
    out.push('\n');
    for event in events {
        out.push_str(&encode_row(event));
        out.push('\n');
    }
    out
}

/// Write events as comma-delimited text.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_csv<W: Write>(writer: &mut W, events: &[Quake]) -> io::Result<()> {
    writer.write_all(to_csv(events).as_bytes())
}

fn encode_row(event: &Quake) -> String {
    let fields = [
        escape_field(&event.earthquake_id),
        escape_field(&event.title),
        escape_field(&event.date_time),
        format!("{:.1}", event.mag),
        format!("{:.1}", event.depth),
        format!("{:.4}", event.latitude()),
        format!("{:.4}", event.longitude()),
        escape_field(&event.location_properties.closest_city.name),
        format!("{:.2}", event.closest_city_km()),
    ];
    fields.join(",")
}

/// Quote a text field when it contains a delimiter, quote, or newline.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}
