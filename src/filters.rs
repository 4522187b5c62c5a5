//! Filter state and query routing.
//!
//! Filtering is server-side: active criteria are serialized into query
//! parameters for the provider's filtered endpoint. An inactive filter set
//! routes to the rolling live feed instead.

use chrono::{NaiveDate, NaiveDateTime};

use crate::models::{DATE_TIME_FORMAT, Quake};

/// UI-level filter state, as set from CLI flags.
///
/// A magnitude threshold of 0 means "no threshold". Date bounds are
/// independently optional, but a window only exists when both are set.
#[derive(Debug, Default, Clone)]
pub struct FilterState {
    pub min_magnitude: f64,
    pub max_magnitude: Option<f64>,
    pub min_depth: Option<f64>,
    pub max_depth: Option<f64>,
    pub starts: Option<NaiveDateTime>,
    pub ends: Option<NaiveDateTime>,
}

impl FilterState {
    /// The date window, present only when both bounds are set.
    #[must_use]
    pub fn date_window(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        self.starts.zip(self.ends)
    }

    /// Whether any criterion is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.min_magnitude > 0.0
            || self.max_magnitude.is_some()
            || self.min_depth.is_some()
            || self.max_depth.is_some()
            || self.date_window().is_some()
    }

    /// Route to the live feed or the filtered endpoint.
    #[must_use]
    pub fn plan(&self) -> QueryPlan {
        if self.is_active() {
            QueryPlan::Filtered(self.criteria())
        } else {
            QueryPlan::Live
        }
    }

    /// Materialize the active criteria.
    ///
    /// A zero magnitude threshold is omitted entirely, never sent as a
    /// literal 0. Date bounds only appear as a complete window.
    #[must_use]
    pub fn criteria(&self) -> FilterCriteria {
        let window = self.date_window();
        FilterCriteria {
            min_mag: (self.min_magnitude > 0.0).then_some(self.min_magnitude),
            max_mag: self.max_magnitude,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
            start_date: window.map(|(s, _)| format_bound(s)),
            end_date: window.map(|(_, e)| format_bound(e)),
        }
    }

    /// Local event predicate mirroring the server-side query.
    ///
    /// Used to narrow feeds fetched from endpoints that take no criteria,
    /// such as the latest-N and monthly archive feeds. An event with an
    /// unparseable timestamp fails an active date window.
    #[must_use]
    pub fn matches(&self, event: &Quake) -> bool {
        if self.min_magnitude > 0.0 && event.mag < self.min_magnitude {
            return false;
        }
        if self.max_magnitude.is_some_and(|max| event.mag > max) {
            return false;
        }
        if self.min_depth.is_some_and(|min| event.depth < min) {
            return false;
        }
        if self.max_depth.is_some_and(|max| event.depth > max) {
            return false;
        }
        if let Some((starts, ends)) = self.date_window() {
            match event.occurred_at() {
                Some(at) if at >= starts && at <= ends => {}
                _ => return false,
            }
        }
        true
    }
}

/// Which feed a fetch should hit.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    /// Rolling recent window, no parameters
    Live,
    /// Filtered endpoint with the given criteria
    Filtered(FilterCriteria),
}

/// Query criteria for the filtered and by-city endpoints.
///
/// Every field is optional; unset fields are absent from the query string.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FilterCriteria {
    pub min_mag: Option<f64>,
    pub max_mag: Option<f64>,
    pub min_depth: Option<f64>,
    pub max_depth: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl FilterCriteria {
    /// Active criteria as query pairs, in a stable order.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(v) = self.min_mag {
            pairs.push(("min_mag", v.to_string()));
        }
        if let Some(v) = self.max_mag {
            pairs.push(("max_mag", v.to_string()));
        }
        if let Some(v) = self.min_depth {
            pairs.push(("min_depth", v.to_string()));
        }
        if let Some(v) = self.max_depth {
            pairs.push(("max_depth", v.to_string()));
        }
        if let Some(s) = &self.start_date {
            pairs.push(("start_date", s.clone()));
        }
        if let Some(e) = &self.end_date {
            pairs.push(("end_date", e.clone()));
        }
        pairs
    }
}

/// Serialize a date bound the way the provider expects it.
#[must_use]
pub fn format_bound(at: NaiveDateTime) -> String {
    at.format(DATE_TIME_FORMAT).to_string()
}

/// Parse a CLI datetime bound.
///
/// Accepts `YYYY-MM-DD HH:MM:SS` or a bare `YYYY-MM-DD`; a bare date maps
/// to midnight, or to 23:59:59 when `end_of_day` is set, so date-only
/// windows stay inclusive.
///
/// # Errors
///
/// Returns a message suitable for clap when the input matches neither form.
pub fn parse_bound(s: &str, end_of_day: bool) -> Result<NaiveDateTime, String> {
    if let Ok(at) = NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT) {
        return Ok(at);
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        format!("invalid datetime '{s}', expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS")
    })?;
    let at = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    at.ok_or_else(|| format!("invalid datetime '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_quake;

    fn bound(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT).unwrap()
    }

    #[test]
    fn test_default_state_routes_live() {
        let state = FilterState::default();
        assert!(!state.is_active());
        assert_eq!(state.plan(), QueryPlan::Live);
        assert!(state.criteria().query_pairs().is_empty());
    }

    #[test]
    fn test_zero_magnitude_is_omitted() {
        let state = FilterState {
            min_magnitude: 0.0,
            ..FilterState::default()
        };
        assert_eq!(state.criteria().min_mag, None);
    }

    #[test]
    fn test_magnitude_threshold_routes_filtered() {
        let state = FilterState {
            min_magnitude: 2.5,
            ..FilterState::default()
        };
        assert!(state.is_active());
        match state.plan() {
            QueryPlan::Filtered(criteria) => {
                assert_eq!(criteria.query_pairs(), vec![("min_mag", "2.5".to_owned())]);
            }
            QueryPlan::Live => panic!("expected filtered plan"),
        }
    }

    #[test]
    fn test_whole_magnitude_has_no_trailing_zero() {
        let criteria = FilterCriteria {
            min_mag: Some(3.0),
            ..FilterCriteria::default()
        };
        assert_eq!(criteria.query_pairs(), vec![("min_mag", "3".to_owned())]);
    }

    #[test]
    fn test_single_date_bound_is_not_a_window() {
        let state = FilterState {
            starts: Some(bound("2025-03-01 00:00:00")),
            ..FilterState::default()
        };
        assert!(state.date_window().is_none());
        assert!(!state.is_active());
        assert_eq!(state.plan(), QueryPlan::Live);
    }

    #[test]
    fn test_complete_window_serializes_both_bounds() {
        let state = FilterState {
            starts: Some(bound("2025-03-01 00:00:00")),
            ends: Some(bound("2025-03-08 23:59:59")),
            ..FilterState::default()
        };
        let criteria = state.criteria();
        assert_eq!(
            criteria.query_pairs(),
            vec![
                ("start_date", "2025-03-01 00:00:00".to_owned()),
                ("end_date", "2025-03-08 23:59:59".to_owned()),
            ]
        );
    }

    #[test]
    fn test_parse_bound_full_datetime() {
        let at = parse_bound("2025-03-12 14:23:11", false).unwrap();
        assert_eq!(format_bound(at), "2025-03-12 14:23:11");
    }

    #[test]
    fn test_parse_bound_date_only() {
        let start = parse_bound("2025-03-12", false).unwrap();
        assert_eq!(format_bound(start), "2025-03-12 00:00:00");

        let end = parse_bound("2025-03-12", true).unwrap();
        assert_eq!(format_bound(end), "2025-03-12 23:59:59");
    }

    #[test]
    fn test_parse_bound_rejects_garbage() {
        assert!(parse_bound("last tuesday", false).is_err());
        assert!(parse_bound("2025-13-40", false).is_err());
    }

    #[test]
    fn test_depth_bounds_activate_filtering() {
        let state = FilterState {
            max_depth: Some(40.0),
            ..FilterState::default()
        };
        assert!(state.is_active());
        assert_eq!(
            state.criteria().query_pairs(),
            vec![("max_depth", "40".to_owned())]
        );
    }

    #[test]
    fn test_matches_applies_magnitude_and_depth_bounds() {
        let state = FilterState {
            min_magnitude: 3.0,
            max_depth: Some(50.0),
            ..FilterState::default()
        };

        assert!(state.matches(&test_quake("a", 4.0, 10.0, "2025-03-12 06:00:00")));
        assert!(!state.matches(&test_quake("b", 2.9, 10.0, "2025-03-12 06:00:00")));
        assert!(!state.matches(&test_quake("c", 4.0, 80.0, "2025-03-12 06:00:00")));
    }

    #[test]
    fn test_matches_date_window_is_inclusive() {
        let state = FilterState {
            starts: Some(bound("2025-03-10 00:00:00")),
            ends: Some(bound("2025-03-12 23:59:59")),
            ..FilterState::default()
        };

        assert!(state.matches(&test_quake("a", 1.0, 5.0, "2025-03-10 00:00:00")));
        assert!(state.matches(&test_quake("b", 1.0, 5.0, "2025-03-12 23:59:59")));
        assert!(!state.matches(&test_quake("c", 1.0, 5.0, "2025-03-13 00:00:00")));

        let mut garbled = test_quake("d", 1.0, 5.0, "2025-03-11 12:00:00");
        garbled.date_time = "not a timestamp".to_owned();
        assert!(!state.matches(&garbled));
    }

    #[test]
    fn test_inactive_state_matches_everything() {
        let state = FilterState::default();
        assert!(state.matches(&test_quake("a", 0.1, 700.0, "2025-03-12 06:00:00")));
    }
}
