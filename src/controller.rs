use tracing::{debug, info, warn};

use crate::codec::Persistence;
use crate::form::{validate, ValidationError};
use crate::geolocation::GeoError;
use crate::map::MapSurface;
use crate::storage::BlobStore;
use crate::store::{ActivityStore, StoreError};
use crate::workout::{Activity, ActivityId, ActivityKind, Location};

pub const DEFAULT_ZOOM: f64 = 13.0;

/// Glyph shown in front of an activity in popups and the list.
pub fn glyph(kind: ActivityKind) -> &'static str {
    match kind {
        ActivityKind::Running => "🏃",
        ActivityKind::Cycling => "🚴",
    }
}

pub fn popup_text(activity: &Activity) -> String {
    format!("{} {}", glyph(activity.kind()), activity.description())
}

/// Drives the store, the map and persistence from user intents.
///
/// Every mutation of the activity list is followed by a save. Save
/// failures never abort the operation; they are logged and kept as a
/// warning for the UI to show.
pub struct Controller<M: MapSurface, S: BlobStore> {
    store: ActivityStore<M::Marker>,
    map: M,
    persistence: Persistence<S>,
    zoom: f64,
    map_ready: bool,
    last_warning: Option<String>,
}

impl<M: MapSurface, S: BlobStore> Controller<M, S> {
    pub fn new(map: M, persistence: Persistence<S>, zoom: f64) -> Self {
        Self {
            store: ActivityStore::new(),
            map,
            persistence,
            zoom,
            map_ready: false,
            last_warning: None,
        }
    }

    /// Loads stored activities into the store. Markers follow once the
    /// map is available. Returns how many activities were loaded.
    pub fn startup(&mut self) -> usize {
        let activities = self.persistence.load();
        let count = activities.len();
        for marker in self.store.hydrate(activities) {
            self.map.remove_marker(marker);
        }
        info!(count, "activities hydrated");
        if self.map_ready {
            self.attach_pending_markers();
        }
        count
    }

    /// The user's position is known: center the map on it and render a
    /// marker for every activity that does not have one yet.
    pub fn map_loaded(&mut self, location: Location) {
        self.map.recenter(location, self.zoom);
        self.map_ready = true;
        self.last_warning = None;
        self.attach_pending_markers();
        info!(%location, markers = self.store.marker_count(), "map ready");
    }

    /// Geolocation failed; the list keeps working without a map.
    pub fn location_unavailable(&mut self, err: &GeoError) {
        warn!(%err, "map unavailable");
        self.last_warning = Some(err.to_string());
    }

    pub fn is_map_ready(&self) -> bool {
        self.map_ready
    }

    /// Validates the raw form input and, when it passes, records the new
    /// activity, puts it on the map and saves. On a validation error
    /// nothing changes.
    pub fn submit_new_activity(
        &mut self,
        kind: ActivityKind,
        raw_distance: &str,
        raw_duration: &str,
        raw_extra: &str,
        location: Location,
    ) -> Result<Activity, ValidationError> {
        let valid = validate(kind, raw_distance, raw_duration, raw_extra)?;

        let mut activity = Activity::create(
            location,
            valid.distance_km,
            valid.duration_min,
            valid.variant,
        );
        while let Err(StoreError::DuplicateId(_)) = self.store.add(activity.clone()) {
            activity = activity.reissue();
        }
        info!(id = %activity.id(), description = activity.description(), "activity logged");

        if self.map_ready {
            self.attach_pending_markers();
        }
        self.persist();
        Ok(activity)
    }

    /// Deletes an activity and its marker. Unknown ids are ignored.
    pub fn delete_activity(&mut self, id: &ActivityId) -> bool {
        match self.store.remove_by_id(id) {
            Some((activity, marker)) => {
                if let Some(marker) = marker {
                    self.map.remove_marker(marker);
                }
                info!(id = %activity.id(), "activity deleted");
                self.persist();
                true
            }
            None => {
                debug!(%id, "delete of unknown activity ignored");
                false
            }
        }
    }

    /// Centers the map on an activity and counts the visit.
    pub fn focus_activity(&mut self, id: &ActivityId) -> bool {
        let Some(location) = self.store.find_by_id(id).map(Activity::location) else {
            debug!(%id, "focus of unknown activity ignored");
            return false;
        };
        let zoom = self.map.current_zoom();
        self.map.recenter(location, zoom);
        if let Some(clicks) = self.store.record_click(id) {
            debug!(%id, clicks, "activity focused");
        }
        self.persist();
        true
    }

    /// Deletes every activity, its marker and the stored data.
    pub fn clear_all(&mut self) {
        for marker in self.store.clear() {
            self.map.remove_marker(marker);
        }
        if let Err(err) = self.persistence.clear() {
            warn!(%err, "could not remove stored activities");
            self.last_warning = Some(format!("could not remove stored activities: {err}"));
        }
        info!("all activities cleared");
    }

    pub fn store(&self) -> &ActivityStore<M::Marker> {
        &self.store
    }

    pub fn activities(
        &self,
    ) -> impl ExactSizeIterator<Item = &Activity> + DoubleEndedIterator + '_ {
        self.store.all()
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    pub fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn last_warning(&self) -> Option<&str> {
        self.last_warning.as_deref()
    }

    fn attach_pending_markers(&mut self) {
        let pending: Vec<(Location, String, &'static str)> = self
            .store
            .pending()
            .map(|a| (a.location(), popup_text(a), a.kind().style_class()))
            .collect();

        for (location, popup, style_class) in pending {
            let marker = self.map.create_marker(location, &popup, style_class);
            if let Err(err) = self.store.attach_marker(marker) {
                warn!(%err, "marker could not be attached");
                break;
            }
        }
    }

    fn persist(&mut self) {
        match self.persistence.save(self.store.all()) {
            Ok(()) => debug!(count = self.store.len(), "activities saved"),
            Err(err) => {
                warn!(%err, "could not save activities");
                self.last_warning = Some(format!("could not save activities: {err}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::STORAGE_KEY;
    use crate::map::CanvasMap;
    use crate::storage::{MemoryBlobStore, StorageError};
    use assert_matches::assert_matches;
    use std::io;

    fn here() -> Location {
        Location::new(39.74, -104.99)
    }

    fn controller(store: MemoryBlobStore) -> Controller<CanvasMap, MemoryBlobStore> {
        Controller::new(CanvasMap::new(), Persistence::new(store), DEFAULT_ZOOM)
    }

    fn ready(store: MemoryBlobStore) -> Controller<CanvasMap, MemoryBlobStore> {
        let mut c = controller(store);
        c.startup();
        c.map_loaded(here());
        c
    }

    #[test]
    fn test_submit_run() {
        let mut c = ready(MemoryBlobStore::new());
        let run = c
            .submit_new_activity(ActivityKind::Running, "5.2", "30", "170", here())
            .unwrap();
        assert!((run.pace_min_per_km().unwrap() - 30.0 / 5.2).abs() < 1e-12);
        assert_eq!(c.store().len(), 1);
        assert_eq!(c.store().marker_count(), 1);
        assert_eq!(c.map().marker_count(), 1);

        let marker = *c.store().marker_for(run.id()).unwrap();
        let placed = c.map().marker(marker).unwrap();
        assert_eq!(placed.popup, format!("🏃 {}", run.description()));
        assert_eq!(placed.style_class, "running-popup");
    }

    #[test]
    fn test_submit_persists() {
        let blobs = MemoryBlobStore::new();
        let mut c = ready(blobs.clone());
        c.submit_new_activity(ActivityKind::Cycling, "10", "30", "-20", here())
            .unwrap();
        let saved = blobs.read_blob(STORAGE_KEY).unwrap().unwrap();
        assert!(saved.contains("\"cycling\""));
    }

    #[test]
    fn test_invalid_submission_leaves_everything_untouched() {
        let blobs = MemoryBlobStore::new();
        let mut c = ready(blobs.clone());
        for bad in ["0", "-5", "abc"] {
            let err = c
                .submit_new_activity(ActivityKind::Running, bad, "30", "170", here())
                .unwrap_err();
            assert_eq!(err.field(), crate::form::Field::Distance);
        }
        assert!(c.store().is_empty());
        assert_eq!(c.map().marker_count(), 0);
        assert!(blobs.read_blob(STORAGE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_submit_before_map_defers_marker() {
        let mut c = controller(MemoryBlobStore::new());
        c.startup();
        c.submit_new_activity(ActivityKind::Running, "3", "20", "165", here())
            .unwrap();
        assert_eq!(c.store().len(), 1);
        assert_eq!(c.store().marker_count(), 0);

        c.map_loaded(here());
        assert_eq!(c.store().marker_count(), 1);
        assert_eq!(c.map().marker_count(), 1);
        assert_eq!(c.map().current_zoom(), DEFAULT_ZOOM);
    }

    #[test]
    fn test_delete_removes_marker_and_saves() {
        let blobs = MemoryBlobStore::new();
        let mut c = ready(blobs.clone());
        let a = c
            .submit_new_activity(ActivityKind::Running, "5", "25", "170", here())
            .unwrap();
        let b = c
            .submit_new_activity(ActivityKind::Cycling, "20", "60", "100", here())
            .unwrap();

        assert!(c.delete_activity(a.id()));
        assert_eq!(c.store().len(), 1);
        assert_eq!(c.map().marker_count(), 1);
        let remaining_marker = *c.store().marker_for(b.id()).unwrap();
        assert_eq!(c.map().marker(remaining_marker).unwrap().style_class, "cycling-popup");

        let saved = blobs.read_blob(STORAGE_KEY).unwrap().unwrap();
        assert!(!saved.contains(a.id().as_str()));
        assert!(saved.contains(b.id().as_str()));
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let mut c = ready(MemoryBlobStore::new());
        c.submit_new_activity(ActivityKind::Running, "5", "25", "170", here())
            .unwrap();
        assert!(!c.delete_activity(&ActivityId::from("ghost")));
        assert_eq!(c.store().len(), 1);
        assert_eq!(c.map().marker_count(), 1);
    }

    #[test]
    fn test_focus_recenters_and_counts() {
        let mut c = ready(MemoryBlobStore::new());
        let far = Location::new(-33.86, 151.21);
        let a = c
            .submit_new_activity(ActivityKind::Running, "5", "25", "170", far)
            .unwrap();
        c.map_mut().zoom_out();
        let zoom = c.map().current_zoom();

        assert!(c.focus_activity(a.id()));
        assert_eq!(c.map().center(), far);
        assert_eq!(c.map().current_zoom(), zoom);
        assert_eq!(c.store().find_by_id(a.id()).unwrap().click_count(), 1);

        assert!(!c.focus_activity(&ActivityId::from("ghost")));
    }

    #[test]
    fn test_reload_rebuilds_markers() {
        let blobs = MemoryBlobStore::new();
        let mut c = ready(blobs.clone());
        c.submit_new_activity(ActivityKind::Running, "5", "25", "170", here())
            .unwrap();
        c.submit_new_activity(ActivityKind::Cycling, "20", "60", "100", here())
            .unwrap();
        let descriptions: Vec<String> = c
            .activities()
            .map(|a| a.description().to_string())
            .collect();

        let mut again = controller(blobs);
        assert_eq!(again.startup(), 2);
        assert_eq!(again.store().marker_count(), 0);
        again.map_loaded(here());
        assert_eq!(again.store().marker_count(), 2);
        let reloaded: Vec<String> = again
            .activities()
            .map(|a| a.description().to_string())
            .collect();
        assert_eq!(descriptions, reloaded);
    }

    #[test]
    fn test_clear_all() {
        let blobs = MemoryBlobStore::new();
        let mut c = ready(blobs.clone());
        c.submit_new_activity(ActivityKind::Running, "5", "25", "170", here())
            .unwrap();
        c.clear_all();
        assert!(c.store().is_empty());
        assert_eq!(c.map().marker_count(), 0);
        assert!(blobs.read_blob(STORAGE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_location_unavailable_sets_warning() {
        let mut c = controller(MemoryBlobStore::new());
        c.location_unavailable(&GeoError::Unavailable);
        assert!(!c.is_map_ready());
        assert!(c.last_warning().unwrap().contains("could not get your position"));
        c.map_loaded(here());
        assert!(c.last_warning().is_none());
    }

    struct BrokenStore;

    impl BlobStore for BrokenStore {
        fn read_blob(&self, _key: &str) -> crate::storage::Result<Option<String>> {
            Err(StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk gone")))
        }

        fn write_blob(&self, _key: &str, _value: &str) -> crate::storage::Result<()> {
            Err(StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk gone")))
        }

        fn remove_blob(&self, _key: &str) -> crate::storage::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_save_failure_is_a_warning() {
        let mut c = Controller::new(
            CanvasMap::new(),
            Persistence::new(BrokenStore),
            DEFAULT_ZOOM,
        );
        assert_eq!(c.startup(), 0);
        c.map_loaded(here());
        let run = c.submit_new_activity(ActivityKind::Running, "5", "25", "170", here());
        assert_matches!(run, Ok(_));
        assert_eq!(c.store().len(), 1);
        assert!(c.last_warning().unwrap().contains("disk gone"));
    }
}
