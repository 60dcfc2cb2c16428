//! Encoding of the activity list into a durable text blob and back.
//!
//! Only raw inputs are written: pace, speed and description are derived
//! again on load. Map markers are never encoded; the caller renders them
//! anew after hydration.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::storage::{BlobStore, StorageError};
use crate::workout::{Activity, ActivityId, Location, Variant};

/// Key under which the activity list is stored.
pub const STORAGE_KEY: &str = "workouts";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed activity data: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Serialize, Deserialize)]
struct Common {
    id: ActivityId,
    date: DateTime<FixedOffset>,
    coords: Location,
    distance: f64,
    duration: f64,
    #[serde(default)]
    clicks: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Record {
    Running {
        #[serde(flatten)]
        common: Common,
        cadence: f64,
    },
    Cycling {
        #[serde(flatten)]
        common: Common,
        #[serde(rename = "elevationGain")]
        elevation_gain: f64,
    },
}

impl From<&Activity> for Record {
    fn from(a: &Activity) -> Self {
        let common = Common {
            id: a.id().clone(),
            date: a.created_at(),
            coords: a.location(),
            distance: a.distance_km(),
            duration: a.duration_min(),
            clicks: a.click_count(),
        };
        match a.variant() {
            Variant::Run { cadence_spm } => Record::Running {
                common,
                cadence: cadence_spm,
            },
            Variant::Ride { elevation_gain_m } => Record::Cycling {
                common,
                elevation_gain: elevation_gain_m,
            },
        }
    }
}

impl Record {
    fn into_activity(self) -> Option<Activity> {
        let (common, variant) = match self {
            Record::Running { common, cadence } => (
                common,
                Variant::Run {
                    cadence_spm: cadence,
                },
            ),
            Record::Cycling {
                common,
                elevation_gain,
            } => (
                common,
                Variant::Ride {
                    elevation_gain_m: elevation_gain,
                },
            ),
        };

        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(common.distance) || !positive(common.duration) {
            return None;
        }

        Some(Activity::restore(
            common.id,
            common.date,
            common.coords,
            common.distance,
            common.duration,
            variant,
            common.clicks,
        ))
    }
}

pub fn encode<'a>(
    activities: impl IntoIterator<Item = &'a Activity>,
) -> Result<String, CodecError> {
    let records: Vec<Record> = activities.into_iter().map(Record::from).collect();
    Ok(serde_json::to_string(&records)?)
}

/// Decodes a blob written by [`encode`].
///
/// A blob that is not a JSON array is an error. Individual records that
/// cannot be decoded (unknown type, missing fields, non-positive distance
/// or duration) are skipped with a warning.
pub fn decode(blob: &str) -> Result<Vec<Activity>, CodecError> {
    let values: Vec<serde_json::Value> = serde_json::from_str(blob)?;
    let total = values.len();

    let activities: Vec<Activity> = values
        .into_iter()
        .enumerate()
        .filter_map(|(idx, value)| {
            match serde_json::from_value::<Record>(value) {
                Ok(record) => {
                    let activity = record.into_activity();
                    if activity.is_none() {
                        warn!(index = idx, "skipping stored activity with bad measurements");
                    }
                    activity
                }
                Err(err) => {
                    warn!(index = idx, %err, "skipping undecodable stored activity");
                    None
                }
            }
        })
        .collect();

    if activities.len() != total {
        warn!(kept = activities.len(), total, "some stored activities were dropped");
    }
    Ok(activities)
}

/// Saves and loads the activity list through a [`BlobStore`].
#[derive(Debug)]
pub struct Persistence<S> {
    store: S,
    key: String,
}

impl<S: BlobStore> Persistence<S> {
    pub fn new(store: S) -> Self {
        Self::with_key(store, STORAGE_KEY)
    }

    pub fn with_key(store: S, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
        }
    }

    pub fn save<'a>(
        &self,
        activities: impl IntoIterator<Item = &'a Activity>,
    ) -> Result<(), CodecError> {
        let blob = encode(activities)?;
        self.store.write_blob(&self.key, &blob)?;
        Ok(())
    }

    /// Stored activities in their saved order.
    ///
    /// Never fails: a missing blob is a first run, and an unreadable or
    /// malformed one is logged and treated as no prior data.
    pub fn load(&self) -> Vec<Activity> {
        let blob = match self.store.read_blob(&self.key) {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                info!(key = %self.key, "no stored activities");
                return Vec::new();
            }
            Err(err) => {
                warn!(key = %self.key, %err, "could not read stored activities");
                return Vec::new();
            }
        };

        match decode(&blob) {
            Ok(activities) => {
                info!(count = activities.len(), "loaded stored activities");
                activities
            }
            Err(err) => {
                warn!(key = %self.key, %err, "ignoring malformed stored activities");
                Vec::new()
            }
        }
    }

    pub fn clear(&self) -> Result<(), CodecError> {
        self.store.remove_blob(&self.key)?;
        Ok(())
    }

    pub fn backend(&self) -> &S {
        &self.store
    }
}
