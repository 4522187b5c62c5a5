//! Magnitude and depth visual encoding.
//!
//! Deterministic mappings from event measurements to presentation
//! parameters. The same functions drive the map markers, the legend, and
//! the terminal magnitude tags, so every surface renders an event the same
//! way.

use std::fmt;

use serde::{Serialize, Serializer};

/// Radius multiplier applied to the selected event by presentation layers.
///
/// Selection is emphasis only; none of the encodings below depend on it.
pub const SELECTED_RADIUS_SCALE: f64 = 1.2;

/// An RGB color, rendered as a CSS `rgb(r, g, b)` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// ANSI 24-bit foreground escape for terminal output.
    #[must_use]
    pub fn ansi_fg(&self) -> String {
        format!("\x1b[38;2;{};{};{}m", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

fn channel(v: f64) -> u8 {
    v.floor().clamp(0.0, 255.0) as u8
}

/// Marker fill color for a magnitude.
///
/// Blue stays at full intensity; green brightens above magnitude 3 and red
/// ramps in above magnitude 4, so the scale runs cyan-blue for small events
/// toward white-hot for large ones.
#[must_use]
pub fn marker_color(mag: f64) -> Rgb {
    let r = if mag > 4.0 { mag * 30.0 } else { 0.0 };
    let g = if mag > 3.0 { 150.0 + mag * 15.0 } else { 150.0 };
    Rgb {
        r: channel(r),
        g: channel(g),
        b: 255,
    }
}

/// Marker radius in pixels: quadratic in magnitude, floor of 15 so small
/// events stay clickable.
#[must_use]
pub fn marker_radius(mag: f64) -> f64 {
    (mag.powi(2) * 2.0).max(15.0)
}

/// Marker opacity in `[0.3, 0.8]`.
///
/// Deeper events fade (linearly down to a floor at 400 km) and stronger
/// events solidify; the product is clamped to keep every marker visible
/// without hiding the basemap.
#[must_use]
pub fn marker_opacity(mag: f64, depth: f64) -> f64 {
    let depth_factor = (1.0 - depth / 400.0).max(0.3);
    let magnitude_factor = (0.4 + mag / 10.0).min(0.9);
    (depth_factor * magnitude_factor).clamp(0.3, 0.8)
}

/// Marker border width, stepped at whole magnitudes.
#[must_use]
pub fn border_width(mag: f64) -> f64 {
    if mag >= 6.0 {
        1.5
    } else if mag >= 5.0 {
        1.0
    } else if mag >= 4.0 {
        0.5
    } else {
        0.25
    }
}

/// Glow (blur) radius in pixels.
#[must_use]
pub fn glow_radius(mag: f64) -> f64 {
    (mag * 3.0).max(5.0)
}

/// All encodings for one event, as the dashboard API ships them.
#[derive(Debug, Clone, Serialize)]
pub struct MarkerStyle {
    pub color: Rgb,
    pub radius: f64,
    pub opacity: f64,
    pub border_width: f64,
    pub glow_radius: f64,
}

impl MarkerStyle {
    #[must_use]
    pub fn new(mag: f64, depth: f64) -> Self {
        Self {
            color: marker_color(mag),
            radius: marker_radius(mag),
            opacity: marker_opacity(mag, depth),
            border_width: border_width(mag),
            glow_radius: glow_radius(mag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_channel_thresholds() {
        // red off through magnitude 4, green baseline through magnitude 3
        assert_eq!(marker_color(2.0), Rgb { r: 0, g: 150, b: 255 });
        assert_eq!(marker_color(3.0), Rgb { r: 0, g: 150, b: 255 });
        assert_eq!(marker_color(3.5), Rgb { r: 0, g: 202, b: 255 });
        assert_eq!(marker_color(4.0), Rgb { r: 0, g: 210, b: 255 });
        assert_eq!(marker_color(4.5), Rgb { r: 135, g: 217, b: 255 });
        // channels cap at 255 for extreme magnitudes
        assert_eq!(marker_color(9.0), Rgb { r: 255, g: 255, b: 255 });
        assert_eq!(marker_color(-1.0), Rgb { r: 0, g: 150, b: 255 });
    }

    #[test]
    fn test_color_renders_as_css_rgb() {
        let css = marker_color(5.0).to_string();
        assert_eq!(css, "rgb(150, 225, 255)");

        // channel values stay machine-extractable from the rendered form
        let inner = css
            .strip_prefix("rgb(")
            .and_then(|s| s.strip_suffix(')'))
            .unwrap();
        let channels: Vec<u8> = inner.split(", ").map(|c| c.parse().unwrap()).collect();
        assert_eq!(channels, vec![150, 225, 255]);
    }

    #[test]
    fn test_radius_fixed_points() {
        assert!((marker_radius(2.0) - 15.0).abs() < f64::EPSILON);
        assert!((marker_radius(5.0) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_radius_monotonic_over_positive_magnitudes() {
        let mut prev = marker_radius(0.0);
        for step in 1..=1000 {
            let mag = f64::from(step) * 0.01;
            let radius = marker_radius(mag);
            assert!(radius >= prev, "radius decreased at magnitude {mag}");
            prev = radius;
        }
    }

    #[test]
    fn test_opacity_documented_examples() {
        // shallow major event saturates the upper clamp
        assert!((marker_opacity(7.0, 0.0) - 0.8).abs() < f64::EPSILON);
        // deep minor event sits on the lower clamp
        assert!((marker_opacity(1.0, 400.0) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_opacity_always_within_bounds() {
        for m in 0..=100 {
            for d in 0..=70 {
                let mag = f64::from(m) * 0.1;
                let depth = f64::from(d) * 10.0;
                let opacity = marker_opacity(mag, depth);
                assert!(
                    (0.3..=0.8).contains(&opacity),
                    "opacity {opacity} out of range for mag {mag} depth {depth}"
                );
            }
        }
    }

    #[test]
    fn test_border_width_steps() {
        assert!((border_width(3.9) - 0.25).abs() < f64::EPSILON);
        assert!((border_width(4.0) - 0.5).abs() < f64::EPSILON);
        assert!((border_width(4.9) - 0.5).abs() < f64::EPSILON);
        assert!((border_width(5.0) - 1.0).abs() < f64::EPSILON);
        assert!((border_width(6.0) - 1.5).abs() < f64::EPSILON);
        assert!((border_width(8.2) - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_glow_radius_floor() {
        assert!((glow_radius(0.5) - 5.0).abs() < f64::EPSILON);
        assert!((glow_radius(2.0) - 6.0).abs() < f64::EPSILON);
        assert!((glow_radius(6.0) - 18.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_marker_style_bundles_all_encodings() {
        let style = MarkerStyle::new(5.0, 10.0);
        assert_eq!(style.color, marker_color(5.0));
        assert!((style.radius - 50.0).abs() < f64::EPSILON);
        assert!((style.border_width - 1.0).abs() < f64::EPSILON);
        assert!((style.glow_radius - 15.0).abs() < f64::EPSILON);

        let json = serde_json::to_value(&style).unwrap();
        assert_eq!(json["color"], "rgb(150, 225, 255)");
    }
}
