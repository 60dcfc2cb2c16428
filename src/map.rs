use ratatui::layout::{Position, Rect};
use std::collections::BTreeMap;
use tracing::debug;

use crate::workout::Location;

pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 18.0;

/// The map the activities are drawn on.
pub trait MapSurface {
    type Marker;

    fn create_marker(&mut self, location: Location, popup: &str, style_class: &str)
        -> Self::Marker;
    fn remove_marker(&mut self, marker: Self::Marker);
    fn recenter(&mut self, location: Location, zoom: f64);
    fn current_zoom(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct MapMarker {
    pub location: Location,
    pub popup: String,
    pub style_class: String,
}

/// Map state behind the terminal canvas: a viewport (center and zoom) and
/// the markers placed on it.
///
/// Zoom 1 shows the whole world; every further level halves the visible
/// span in both directions.
#[derive(Debug, Clone)]
pub struct CanvasMap {
    center: Location,
    zoom: f64,
    markers: BTreeMap<MarkerId, MapMarker>,
    next_id: u64,
}

impl Default for CanvasMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasMap {
    pub fn new() -> Self {
        Self {
            center: Location::new(0.0, 0.0),
            zoom: MIN_ZOOM,
            markers: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn center(&self) -> Location {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn markers(&self) -> impl Iterator<Item = (MarkerId, &MapMarker)> + '_ {
        self.markers.iter().map(|(id, m)| (*id, m))
    }

    pub fn marker(&self, id: MarkerId) -> Option<&MapMarker> {
        self.markers.get(&id)
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    /// Visible (longitude, latitude) spans in degrees.
    pub fn span(&self) -> (f64, f64) {
        let scale = 2f64.powf(self.zoom - 1.0);
        (360.0 / scale, 180.0 / scale)
    }

    /// Canvas x (longitude) and y (latitude) bounds of the viewport.
    pub fn bounds(&self) -> ([f64; 2], [f64; 2]) {
        let (lng_span, lat_span) = self.span();
        (
            [
                self.center.lng - lng_span / 2.0,
                self.center.lng + lng_span / 2.0,
            ],
            [
                self.center.lat - lat_span / 2.0,
                self.center.lat + lat_span / 2.0,
            ],
        )
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom + 1.0);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom - 1.0);
    }

    /// Moves the viewport by a fraction of its span.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        let (lng_span, lat_span) = self.span();
        self.center = normalize(Location::new(
            self.center.lat + dy * lat_span,
            self.center.lng + dx * lng_span,
        ));
    }

    /// The location under terminal cell (`column`, `row`) when the map is
    /// drawn in `area`, or `None` if the cell is outside it.
    pub fn location_at(&self, area: Rect, column: u16, row: u16) -> Option<Location> {
        if !area.contains(Position::new(column, row)) {
            return None;
        }
        let ([west, east], [south, north]) = self.bounds();
        let fx = (f64::from(column - area.x) + 0.5) / f64::from(area.width);
        let fy = (f64::from(row - area.y) + 0.5) / f64::from(area.height);
        Some(normalize(Location::new(
            north - fy * (north - south),
            west + fx * (east - west),
        )))
    }

    /// Whether `location` falls inside the current viewport.
    pub fn is_visible(&self, location: Location) -> bool {
        let ([west, east], [south, north]) = self.bounds();
        (west..=east).contains(&location.lng) && (south..=north).contains(&location.lat)
    }
}

/// Clamps latitude and wraps longitude back into -180..=180.
fn normalize(location: Location) -> Location {
    let lng = if (-180.0..=180.0).contains(&location.lng) {
        location.lng
    } else {
        (location.lng + 180.0).rem_euclid(360.0) - 180.0
    };
    Location::new(location.lat.clamp(-90.0, 90.0), lng)
}

impl MapSurface for CanvasMap {
    type Marker = MarkerId;

    fn create_marker(&mut self, location: Location, popup: &str, style_class: &str) -> MarkerId {
        let id = MarkerId(self.next_id);
        self.next_id += 1;
        self.markers.insert(
            id,
            MapMarker {
                location,
                popup: popup.to_string(),
                style_class: style_class.to_string(),
            },
        );
        debug!(marker = id.0, %location, "marker created");
        id
    }

    fn remove_marker(&mut self, marker: MarkerId) {
        if self.markers.remove(&marker).is_some() {
            debug!(marker = marker.0, "marker removed");
        }
    }

    fn recenter(&mut self, location: Location, zoom: f64) {
        self.center = normalize(location);
        self.set_zoom(zoom);
    }

    fn current_zoom(&self) -> f64 {
        self.zoom
    }
}
