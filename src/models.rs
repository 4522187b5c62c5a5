//! Data models for the Kandilli earthquake API.
//!
//! These structures match the JSON envelope served by
//! `api.orhanaydogdu.com.tr/deprem`. Responses are sanitized at the
//! acceptance boundary: records missing required numeric fields and
//! duplicate ids are dropped, never surfaced downstream.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::QuakewatchError;

/// Wire format of `date_time` fields ("2025-03-12 14:23:11", provider-local).
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Raw top-level envelope as served by the API.
///
/// Error responses omit `metadata` and `result`, so both are lenient here;
/// [`RawEnvelope::accept`] enforces what a usable response must carry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    /// In-band success flag; `false` means the provider rejected the request
    pub status: bool,

    /// Provider message, mostly interesting when `status` is false
    #[serde(default)]
    pub desc: String,

    /// Window/count metadata, absent on provider errors
    #[serde(default)]
    pub metadata: Option<FeedMetadata>,

    /// Event records, decoded individually so one bad record cannot
    /// poison the batch
    #[serde(default)]
    pub result: Vec<serde_json::Value>,
}

impl RawEnvelope {
    /// Turn a raw response into an accepted [`Envelope`].
    ///
    /// Provider-flagged failures and missing metadata are errors. Individual
    /// records that fail to decode, fail validation, or repeat an already
    /// seen id are dropped and counted instead.
    pub fn accept(self) -> Result<Envelope, QuakewatchError> {
        if !self.status {
            let desc = if self.desc.is_empty() {
                "unspecified failure".to_owned()
            } else {
                self.desc
            };
            return Err(QuakewatchError::Provider { desc });
        }
        let metadata = self
            .metadata
            .ok_or_else(|| QuakewatchError::InvalidResponse("missing metadata block".into()))?;

        let mut events = Vec::with_capacity(self.result.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(self.result.len());
        let mut dropped = 0_usize;
        for value in self.result {
            let quake: Quake = match serde_json::from_value(value) {
                Ok(q) => q,
                Err(err) => {
                    dropped += 1;
                    tracing::warn!(error = %err, "dropping undecodable event record");
                    continue;
                }
            };
            if let Err(err) = quake.validate() {
                dropped += 1;
                tracing::warn!(error = %err, "dropping invalid event record");
                continue;
            }
            if !seen.insert(quake.id.clone()) {
                dropped += 1;
                tracing::warn!(id = %quake.id, "dropping duplicate event id");
                continue;
            }
            events.push(quake);
        }
        Ok(Envelope {
            events,
            metadata,
            dropped,
        })
    }
}

/// A sanitized feed response.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Accepted events, ids unique, numeric fields present
    pub events: Vec<Quake>,

    /// Provider metadata for the response window
    pub metadata: FeedMetadata,

    /// Records rejected during acceptance
    pub dropped: usize,
}

/// Metadata about the feed response window.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedMetadata {
    /// Window start ("YYYY-MM-DD HH:mm:ss")
    pub date_starts: String,

    /// Window end ("YYYY-MM-DD HH:mm:ss")
    pub date_ends: String,

    /// Total matching events server-side; may exceed the returned count
    pub total: u64,
}

impl FeedMetadata {
    /// Events the server matched but did not include in this response.
    #[must_use]
    pub fn truncated(&self, returned: usize) -> u64 {
        self.total.saturating_sub(returned as u64)
    }
}

/// A single earthquake event.
#[derive(Debug, Clone, Deserialize)]
pub struct Quake {
    /// Unique record id (selection identity; unique within a snapshot)
    #[serde(rename = "_id")]
    pub id: String,

    /// Provider-assigned event id (incremental-update identity)
    pub earthquake_id: String,

    /// Originating network, "kandilli"
    pub provider: String,

    /// Human-readable headline, usually "PLACE-DISTRICT (PROVINCE)"
    pub title: String,

    /// Provider display date string
    pub date: String,

    /// Magnitude; fractional, unbounded
    pub mag: f64,

    /// Depth in kilometers, positive down
    pub depth: f64,

    /// Epicenter location
    pub geojson: GeoPoint,

    /// Nearby-place context
    pub location_properties: LocationContext,

    /// Revision marker, null unless the record was amended
    #[serde(default)]
    pub rev: Option<String>,

    /// Occurrence time, provider-local ("YYYY-MM-DD HH:mm:ss")
    pub date_time: String,

    /// Record creation time (seconds since epoch)
    pub created_at: i64,

    /// IANA timezone the provider timestamps are expressed in
    pub location_tz: String,
}

impl Quake {
    /// Validate the event structure.
    pub fn validate(&self) -> Result<(), QuakewatchError> {
        if self.id.is_empty() {
            return Err(QuakewatchError::Validation("empty event id".into()));
        }
        if self.geojson.coordinates.len() != 2 {
            return Err(QuakewatchError::Validation(format!(
                "expected 2 coordinates, got {}",
                self.geojson.coordinates.len()
            )));
        }
        Ok(())
    }

    /// Occurrence time parsed from `date_time` (provider-local naive time).
    #[must_use]
    pub fn occurred_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.date_time, DATE_TIME_FORMAT).ok()
    }

    /// Get longitude (degrees).
    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.geojson.coordinates.first().copied().unwrap_or(0.0)
    }

    /// Get latitude (degrees).
    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.geojson.coordinates.get(1).copied().unwrap_or(0.0)
    }

    /// Distance to the closest city in kilometers (wire value is meters).
    #[must_use]
    pub fn closest_city_km(&self) -> f64 {
        self.location_properties.closest_city.distance / 1000.0
    }
}

/// GeoJSON point, `[longitude, latitude]`.
#[derive(Debug, Clone, Deserialize)]
pub struct GeoPoint {
    /// Always "Point"
    #[serde(rename = "type")]
    pub type_: String,

    /// Coordinates: [longitude, latitude]
    pub coordinates: Vec<f64>,
}

/// Nearby-place context attached to every event.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationContext {
    /// Nearest populated place
    #[serde(rename = "closestCity")]
    pub closest_city: CityRef,

    /// Administrative epicenter descriptor
    #[serde(rename = "epiCenter")]
    pub epi_center: EpicRef,

    /// Nearby cities ranked by distance
    #[serde(rename = "closestCities", default)]
    pub closest_cities: Vec<CityRef>,

    /// Nearby airports ranked by distance
    #[serde(default)]
    pub airports: Vec<AirportRef>,
}

/// A city reference with distance from the epicenter.
#[derive(Debug, Clone, Deserialize)]
pub struct CityRef {
    /// City name
    pub name: String,

    /// Provider city code
    #[serde(rename = "cityCode")]
    pub city_code: u32,

    /// Distance from the epicenter in meters
    pub distance: f64,

    /// City population
    pub population: u64,
}

/// Epicenter administrative descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct EpicRef {
    /// Place name
    pub name: String,

    /// Provider city code
    #[serde(rename = "cityCode")]
    pub city_code: u32,

    /// Population, null for unpopulated descriptors
    #[serde(default)]
    pub population: Option<u64>,
}

/// An airport reference with distance from the epicenter.
#[derive(Debug, Clone, Deserialize)]
pub struct AirportRef {
    /// Distance from the epicenter in meters
    pub distance: f64,

    /// Airport name
    pub name: String,

    /// IATA code
    pub code: String,

    /// Airport location
    pub coordinates: GeoPoint,
}

/// Simplified event for output.
///
/// This is the normalized structure we emit in JSON/NDJSON output and the
/// dashboard API.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub id: String,
    pub earthquake_id: String,
    pub title: String,
    pub time: String,
    pub timezone: String,
    pub magnitude: f64,
    pub depth_km: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub closest_city: String,
    pub closest_city_distance_km: f64,
    pub epicenter: String,
}

impl From<&Quake> for EventRecord {
    fn from(q: &Quake) -> Self {
        Self {
            id: q.id.clone(),
            earthquake_id: q.earthquake_id.clone(),
            title: q.title.clone(),
            time: q.date_time.clone(),
            timezone: q.location_tz.clone(),
            magnitude: q.mag,
            depth_km: q.depth,
            latitude: q.latitude(),
            longitude: q.longitude(),
            closest_city: q.location_properties.closest_city.name.clone(),
            closest_city_distance_km: q.closest_city_km(),
            epicenter: q.location_properties.epi_center.name.clone(),
        }
    }
}

/// Build a complete event for tests without hand-writing JSON.
#[cfg(test)]
pub(crate) fn test_quake(id: &str, mag: f64, depth: f64, date_time: &str) -> Quake {
    Quake {
        id: id.to_owned(),
        earthquake_id: format!("eq-{id}"),
        provider: "kandilli".to_owned(),
        title: format!("TEST FIELD ({id})"),
        date: date_time.to_owned(),
        mag,
        depth,
        geojson: GeoPoint {
            type_: "Point".to_owned(),
            coordinates: vec![35.0, 39.0],
        },
        location_properties: LocationContext {
            closest_city: CityRef {
                name: "Ankara".to_owned(),
                city_code: 6,
                distance: 12_345.0,
                population: 5_747_325,
            },
            epi_center: EpicRef {
                name: "Ankara".to_owned(),
                city_code: 6,
                population: Some(5_747_325),
            },
            closest_cities: Vec::new(),
            airports: Vec::new(),
        },
        rev: None,
        date_time: date_time.to_owned(),
        created_at: 1_741_800_000,
        location_tz: "Europe/Istanbul".to_owned(),
    }
}
