use thiserror::Error;
use tracing::debug;

use crate::workout::{Activity, ActivityId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("activity {0} is already in the store")]
    DuplicateId(ActivityId),
    #[error("marker attached without a matching activity ({activities} activities, {markers} markers)")]
    MarkerWithoutActivity { activities: usize, markers: usize },
}

/// One activity and, once the caller has rendered it, its map marker.
#[derive(Debug, Clone)]
pub struct Entry<M> {
    activity: Activity,
    marker: Option<M>,
}

impl<M> Entry<M> {
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn marker(&self) -> Option<&M> {
        self.marker.as_ref()
    }
}

/// Ordered activities with their marker handles.
///
/// Activities and markers live in a single sequence of entries, so the
/// n-th marker always belongs to the n-th activity. Markers are attached in
/// insertion order: the first `marker_count()` entries carry a marker and
/// the rest are waiting for the caller to render them.
#[derive(Debug, Clone)]
pub struct ActivityStore<M> {
    entries: Vec<Entry<M>>,
    attached: usize,
}

impl<M> Default for ActivityStore<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> ActivityStore<M> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            attached: 0,
        }
    }

    /// Appends an activity. The caller follows up with [`attach_marker`]
    /// once the marker exists.
    ///
    /// [`attach_marker`]: ActivityStore::attach_marker
    pub fn add(&mut self, activity: Activity) -> Result<(), StoreError> {
        if self.position(activity.id()).is_some() {
            return Err(StoreError::DuplicateId(activity.id().clone()));
        }
        debug!(id = %activity.id(), kind = %activity.kind(), "activity added");
        self.entries.push(Entry {
            activity,
            marker: None,
        });
        Ok(())
    }

    /// Appends a marker handle for the oldest activity still without one.
    ///
    /// Calling this more often than [`add`](ActivityStore::add) breaks the
    /// add-then-attach contract and trips an assertion in debug builds.
    pub fn attach_marker(&mut self, handle: M) -> Result<(), StoreError> {
        debug_assert!(
            self.attached < self.entries.len(),
            "marker attached without a matching activity"
        );
        match self.entries.get_mut(self.attached) {
            Some(entry) => {
                entry.marker = Some(handle);
                self.attached += 1;
                Ok(())
            }
            None => Err(StoreError::MarkerWithoutActivity {
                activities: self.entries.len(),
                markers: self.attached,
            }),
        }
    }

    pub fn find_by_id(&self, id: &ActivityId) -> Option<&Activity> {
        self.entries
            .iter()
            .map(|e| &e.activity)
            .find(|a| a.id() == id)
    }

    pub fn position(&self, id: &ActivityId) -> Option<usize> {
        self.entries.iter().position(|e| e.activity.id() == id)
    }

    /// Removes the activity and its marker together. The marker is `None`
    /// when the activity was hydrated and never re-rendered.
    pub fn remove_by_id(&mut self, id: &ActivityId) -> Option<(Activity, Option<M>)> {
        let idx = self.position(id)?;
        let entry = self.entries.remove(idx);
        if idx < self.attached {
            self.attached -= 1;
        }
        debug!(id = %id, index = idx, "activity removed");
        Some((entry.activity, entry.marker))
    }

    /// Replaces every activity, dropping all markers. The previous marker
    /// handles are returned so the caller can dispose of them; new markers
    /// must be attached again in the order of `activities`.
    ///
    /// Duplicate ids keep their first occurrence.
    pub fn hydrate(&mut self, activities: Vec<Activity>) -> Vec<M> {
        let old = self.clear();
        for activity in activities {
            if let Err(err) = self.add(activity) {
                debug!(%err, "skipping hydrated activity");
            }
        }
        old
    }

    /// Removes everything, returning the markers that were attached.
    pub fn clear(&mut self) -> Vec<M> {
        self.attached = 0;
        self.entries.drain(..).filter_map(|e| e.marker).collect()
    }

    /// Increments the click counter of an activity, returning the new count.
    pub fn record_click(&mut self, id: &ActivityId) -> Option<u32> {
        self.entries
            .iter_mut()
            .find(|e| e.activity.id() == id)
            .map(|e| e.activity.record_click())
    }

    /// Activities in insertion order, which is also display order.
    pub fn all(&self) -> impl ExactSizeIterator<Item = &Activity> + DoubleEndedIterator + '_ {
        self.entries.iter().map(|e| &e.activity)
    }

    pub fn entries(&self) -> &[Entry<M>] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Entry<M>> {
        self.entries.get(index)
    }

    pub fn markers(&self) -> impl Iterator<Item = &M> + '_ {
        self.entries[..self.attached]
            .iter()
            .filter_map(|e| e.marker.as_ref())
    }

    pub fn marker_for(&self, id: &ActivityId) -> Option<&M> {
        self.entries
            .iter()
            .find(|e| e.activity.id() == id)
            .and_then(|e| e.marker.as_ref())
    }

    /// Activities still waiting for a marker, in the order markers must be
    /// attached.
    pub fn pending(&self) -> impl Iterator<Item = &Activity> + '_ {
        self.entries[self.attached..].iter().map(|e| &e.activity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn marker_count(&self) -> usize {
        self.attached
    }
}
