//! Client-side statistics over a set of events.
//!
//! All reductions are single-pass and side-effect-free; the provider's own
//! aggregation endpoints are never consulted.

use serde::Serialize;

use crate::models::Quake;

/// Magnitude classes, left-inclusive and jointly exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagnitudeBand {
    Minor,
    Light,
    Moderate,
    Strong,
    Major,
}

impl MagnitudeBand {
    /// Classify a magnitude. Every value lands in exactly one band.
    #[must_use]
    pub fn classify(mag: f64) -> Self {
        if mag < 3.0 {
            Self::Minor
        } else if mag < 4.0 {
            Self::Light
        } else if mag < 5.0 {
            Self::Moderate
        } else if mag < 6.0 {
            Self::Strong
        } else {
            Self::Major
        }
    }

    /// Display label, matching the dashboard legend.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Minor => "Minor (<3.0)",
            Self::Light => "Light (3.0-3.9)",
            Self::Moderate => "Moderate (4.0-4.9)",
            Self::Strong => "Strong (5.0-5.9)",
            Self::Major => "Major (≥6.0)",
        }
    }

    /// Bare band name, without the magnitude range.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Minor => "Minor",
            Self::Light => "Light",
            Self::Moderate => "Moderate",
            Self::Strong => "Strong",
            Self::Major => "Major",
        }
    }
}

/// Event counts per magnitude band.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandCounts {
    pub minor: usize,
    pub light: usize,
    pub moderate: usize,
    pub strong: usize,
    pub major: usize,
}

impl BandCounts {
    fn record(&mut self, mag: f64) {
        match MagnitudeBand::classify(mag) {
            MagnitudeBand::Minor => self.minor += 1,
            MagnitudeBand::Light => self.light += 1,
            MagnitudeBand::Moderate => self.moderate += 1,
            MagnitudeBand::Strong => self.strong += 1,
            MagnitudeBand::Major => self.major += 1,
        }
    }

    /// Sum over all bands.
    #[must_use]
    pub fn total(&self) -> usize {
        self.minor + self.light + self.moderate + self.strong + self.major
    }

    /// Band rows in display order.
    #[must_use]
    pub fn rows(&self) -> [(MagnitudeBand, usize); 5] {
        [
            (MagnitudeBand::Minor, self.minor),
            (MagnitudeBand::Light, self.light),
            (MagnitudeBand::Moderate, self.moderate),
            (MagnitudeBand::Strong, self.strong),
            (MagnitudeBand::Major, self.major),
        ]
    }
}

/// Aggregate statistics for a snapshot.
#[derive(Debug, Clone)]
pub struct Summary {
    pub total: usize,
    pub avg_magnitude: f64,
    pub avg_depth: f64,
    pub bands: BandCounts,
    pub strongest: Quake,
    pub most_recent: Quake,
}

/// Reduce a slice of events to a [`Summary`] in one pass.
///
/// Returns `None` for an empty slice; "no data" is distinct from zeroed
/// statistics. Ties for strongest and most recent keep the event
/// encountered first.
#[must_use]
pub fn summarize(events: &[Quake]) -> Option<Summary> {
    let first = events.first()?;

    let mut sum_mag = 0.0;
    let mut sum_depth = 0.0;
    let mut bands = BandCounts::default();
    let mut strongest = first;
    let mut most_recent = first;
    for quake in events {
        sum_mag += quake.mag;
        sum_depth += quake.depth;
        bands.record(quake.mag);
        if quake.mag > strongest.mag {
            strongest = quake;
        }
        // None orders before any parseable timestamp
        if quake.occurred_at() > most_recent.occurred_at() {
            most_recent = quake;
        }
    }

    let count = events.len() as f64;
    Some(Summary {
        total: events.len(),
        avg_magnitude: sum_mag / count,
        avg_depth: sum_depth / count,
        bands,
        strongest: strongest.clone(),
        most_recent: most_recent.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_quake;

    #[test]
    fn test_empty_input_yields_none() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_three_event_summary() {
        let events = vec![
            test_quake("a", 2.1, 5.0, "2025-03-12 08:00:00"),
            test_quake("b", 4.4, 10.0, "2025-03-12 09:30:00"),
            test_quake("c", 6.0, 15.0, "2025-03-12 09:00:00"),
        ];
        let summary = summarize(&events).expect("summary");

        assert_eq!(summary.total, 3);
        assert!((summary.avg_magnitude - 4.166_666_666_666_667).abs() < 1e-9);
        assert!((summary.avg_depth - 10.0).abs() < 1e-9);
        assert_eq!(
            summary.bands,
            BandCounts {
                minor: 1,
                moderate: 1,
                major: 1,
                ..BandCounts::default()
            }
        );
        assert_eq!(summary.strongest.id, "c");
        assert_eq!(summary.most_recent.id, "b");
    }

    #[test]
    fn test_band_edges_are_left_inclusive() {
        assert_eq!(MagnitudeBand::classify(-2.0), MagnitudeBand::Minor);
        assert_eq!(MagnitudeBand::classify(2.999), MagnitudeBand::Minor);
        assert_eq!(MagnitudeBand::classify(3.0), MagnitudeBand::Light);
        assert_eq!(MagnitudeBand::classify(3.999), MagnitudeBand::Light);
        assert_eq!(MagnitudeBand::classify(4.0), MagnitudeBand::Moderate);
        assert_eq!(MagnitudeBand::classify(4.999), MagnitudeBand::Moderate);
        assert_eq!(MagnitudeBand::classify(5.0), MagnitudeBand::Strong);
        assert_eq!(MagnitudeBand::classify(5.999), MagnitudeBand::Strong);
        assert_eq!(MagnitudeBand::classify(6.0), MagnitudeBand::Major);
        assert_eq!(MagnitudeBand::classify(9.9), MagnitudeBand::Major);
    }

    #[test]
    fn test_bands_partition_generated_magnitudes() {
        // xorshift keeps this deterministic without a rand dependency
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut events = Vec::with_capacity(1000);
        for i in 0..1000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let mag = (state % 1000) as f64 / 100.0 - 2.0;
            events.push(test_quake(&format!("q{i}"), mag, 10.0, "2025-03-12 08:00:00"));
        }

        let summary = summarize(&events).expect("summary");
        assert_eq!(summary.bands.total(), 1000);

        let recount: usize = summary
            .bands
            .rows()
            .iter()
            .map(|(band, count)| {
                let direct = events
                    .iter()
                    .filter(|q| MagnitudeBand::classify(q.mag) == *band)
                    .count();
                assert_eq!(direct, *count);
                *count
            })
            .sum();
        assert_eq!(recount, 1000);
    }

    #[test]
    fn test_strongest_tie_keeps_first() {
        let events = vec![
            test_quake("first", 5.5, 8.0, "2025-03-12 08:00:00"),
            test_quake("second", 5.5, 9.0, "2025-03-12 09:00:00"),
        ];
        let summary = summarize(&events).expect("summary");
        assert_eq!(summary.strongest.id, "first");
    }

    #[test]
    fn test_unparseable_timestamp_never_wins_recency() {
        let mut broken = test_quake("broken", 3.0, 5.0, "2025-03-12 09:00:00");
        broken.date_time = "not a timestamp".to_owned();
        let events = vec![
            test_quake("ok", 2.0, 5.0, "2025-03-12 08:00:00"),
            broken,
        ];
        let summary = summarize(&events).expect("summary");
        assert_eq!(summary.most_recent.id, "ok");
    }
}
