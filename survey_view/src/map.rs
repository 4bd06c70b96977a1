use log::{debug, warn};
use serde::Serialize;

use crate::config::*;
use crate::{format_timestamp, FilteredView};

pub const VERIFIED_COLOR: &str = "red";
pub const UNVERIFIED_COLOR: &str = "green";

/// The marker colour for a verification flag.
pub fn marker_color(external_verification: i64) -> &'static str {
    if external_verification == 1 {
        VERIFIED_COLOR
    } else {
        UNVERIFIED_COLOR
    }
}

/// The duration shown to the user, in whole minutes.
///
/// Halves are rounded to the nearest even number of minutes.
pub fn duration_minutes(duration_secs: Option<f64>) -> Option<i64> {
    duration_secs.map(|secs| (secs / 60.0).round_ties_even() as i64)
}

/// The map presentation that is actually used for a requested one.
pub fn resolve_mode(requested: MapMode, surveyor: &Selection) -> MapMode {
    if MapMode::available(surveyor).contains(&requested) {
        requested
    } else {
        warn!(
            "resolve_mode: {:?} is not available without a single surveyor, using {:?}",
            requested,
            MapMode::Cluster
        );
        MapMode::Cluster
    }
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Popup {
    pub key: String,
    pub submitted_at: String,
    pub surveyor: String,
    pub province: String,
    pub district: String,
    pub village: String,
    /// Whole minutes, or the missing value marker.
    pub duration_min: String,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Marker {
    /// The position in the sequence, starting at 1.
    pub order: usize,
    pub key: String,
    pub position: GeoPoint,
    pub color: &'static str,
    pub verified: bool,
    pub popup: Popup,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct MapLayer {
    pub mode: MapMode,
    pub center: GeoPoint,
    pub zoom: u8,
    pub markers: Vec<Marker>,
    /// The path through the markers, in order. Only filled in route mode.
    pub route: Vec<GeoPoint>,
}

fn popup(s: &Submission) -> Popup {
    Popup {
        key: s.key.clone(),
        submitted_at: s
            .submitted_at
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_else(|| NOT_PROVIDED.to_string()),
        surveyor: s.surveyor_name.clone(),
        province: s.province.clone(),
        district: s.district.clone(),
        village: s.village.clone(),
        duration_min: duration_minutes(s.duration_secs)
            .map(|m| m.to_string())
            .unwrap_or_else(|| NOT_PROVIDED.to_string()),
    }
}

/// Builds the map for the filtered submissions.
///
/// Only the submissions with resolved coordinates are placed. When a single
/// surveyor is selected, the markers follow the submission time (undated ones
/// last); otherwise they keep the order of the table.
pub fn build_layer(view: &FilteredView, mode: MapMode) -> Result<MapLayer, ViewError> {
    if !view.dataset.has_coordinates {
        return Err(ViewError::NoCoordinates);
    }
    let mode = resolve_mode(mode, &view.filters.surveyor);

    let mut located: Vec<(&Submission, GeoPoint)> = view
        .rows
        .iter()
        .filter_map(|s| s.location.map(|p| (*s, p)))
        .collect();
    if !view.filters.surveyor.is_all() {
        // Stable sort, None sorts last.
        located.sort_by_key(|(s, _)| (s.submitted_at.is_none(), s.submitted_at));
    }

    let markers: Vec<Marker> = located
        .iter()
        .enumerate()
        .map(|(idx, (s, p))| Marker {
            order: idx + 1,
            key: s.key.clone(),
            position: *p,
            color: marker_color(s.external_verification),
            verified: s.is_verified(),
            popup: popup(s),
        })
        .collect();

    let n = markers.len().max(1) as f64;
    let center = GeoPoint {
        lat: markers.iter().map(|m| m.position.lat).sum::<f64>() / n,
        lon: markers.iter().map(|m| m.position.lon).sum::<f64>() / n,
    };

    let route = if mode == MapMode::Route && markers.len() > 1 {
        markers.iter().map(|m| m.position).collect()
    } else {
        Vec::new()
    };
    debug!(
        "build_layer: mode {:?}, {} markers, {} route points",
        mode,
        markers.len(),
        route.len()
    );

    Ok(MapLayer {
        mode,
        center,
        zoom: 9,
        markers,
        route,
    })
}
