use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A point on the map, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<[f64; 2]> for Location {
    fn from(v: [f64; 2]) -> Self {
        Location { lat: v[0], lng: v[1] }
    }
}

impl From<Location> for [f64; 2] {
    fn from(l: Location) -> Self {
        [l.lat, l.lng]
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseLocationError {
    #[error("expected \"lat,lng\"")]
    Format,
    #[error("{0:?} is not a number")]
    Number(String),
    #[error("latitude {0} is outside -90..=90")]
    Latitude(String),
    #[error("longitude {0} is outside -180..=180")]
    Longitude(String),
}

impl FromStr for Location {
    type Err = ParseLocationError;

    /// Parses `"lat,lng"`, e.g. `"51.5072,-0.1276"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s.split_once(',').ok_or(ParseLocationError::Format)?;
        let parse = |raw: &str| {
            let raw = raw.trim();
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ParseLocationError::Number(raw.to_string()))
        };
        let (lat, lng) = (parse(lat)?, parse(lng)?);

        if !(-90.0..=90.0).contains(&lat) {
            return Err(ParseLocationError::Latitude(lat.to_string()));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(ParseLocationError::Longitude(lng.to_string()));
        }
        Ok(Location { lat, lng })
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActivityKind {
    Running,
    Cycling,
}

impl ActivityKind {
    /// Human readable label, the first word of every description.
    pub fn label(&self) -> &'static str {
        match self {
            ActivityKind::Running => "Running",
            ActivityKind::Cycling => "Cycling",
        }
    }

    /// Style class handed to the map when creating a marker.
    pub fn style_class(&self) -> &'static str {
        match self {
            ActivityKind::Running => "running-popup",
            ActivityKind::Cycling => "cycling-popup",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            ActivityKind::Running => ActivityKind::Cycling,
            ActivityKind::Cycling => ActivityKind::Running,
        }
    }
}

/// Identifier assigned at creation; the only key shared by the list, the
/// markers and the stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(String);

impl ActivityId {
    const SUFFIX_LEN: usize = 4;

    /// Last ten digits of the creation time in milliseconds plus a short
    /// random base-36 suffix.
    pub fn generate<Tz: TimeZone>(at: DateTime<Tz>) -> Self {
        let millis = at.timestamp_millis().to_string();
        let tail = &millis[millis.len().saturating_sub(10)..];

        let mut rng = rand::thread_rng();
        let suffix: String = (0..Self::SUFFIX_LEN)
            .filter_map(|_| std::char::from_digit(rng.gen_range(0..36), 36))
            .collect();

        Self(format!("{tail}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActivityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ActivityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind-specific raw input of an activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Variant {
    Run { cadence_spm: f64 },
    Ride { elevation_gain_m: f64 },
}

impl Variant {
    pub fn kind(&self) -> ActivityKind {
        match self {
            Variant::Run { .. } => ActivityKind::Running,
            Variant::Ride { .. } => ActivityKind::Cycling,
        }
    }
}

/// Kind-specific payload, raw input plus the metric derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Details {
    Run {
        cadence_spm: f64,
        pace_min_per_km: f64,
    },
    Ride {
        elevation_gain_m: f64,
        speed_km_per_h: f64,
    },
}

impl Details {
    fn derive(variant: Variant, distance_km: f64, duration_min: f64) -> Self {
        match variant {
            Variant::Run { cadence_spm } => Details::Run {
                cadence_spm,
                pace_min_per_km: duration_min / distance_km,
            },
            Variant::Ride { elevation_gain_m } => Details::Ride {
                elevation_gain_m,
                speed_km_per_h: distance_km / (duration_min / 60.0),
            },
        }
    }
}

/// A single logged run or ride.
///
/// Every field is fixed at construction. Derived values (pace, speed and
/// the description) are computed once by the constructor and there is no
/// way to change the inputs they were derived from; only the click counter
/// moves afterwards.
///
/// Construction does not validate: callers are expected to pass finite,
/// strictly positive distance and duration (see [`crate::form::validate`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    id: ActivityId,
    created_at: DateTime<FixedOffset>,
    location: Location,
    distance_km: f64,
    duration_min: f64,
    click_count: u32,
    description: String,
    details: Details,
}

pub fn create_run(
    location: Location,
    distance_km: f64,
    duration_min: f64,
    cadence_spm: f64,
) -> Activity {
    Activity::create(location, distance_km, duration_min, Variant::Run { cadence_spm })
}

pub fn create_ride(
    location: Location,
    distance_km: f64,
    duration_min: f64,
    elevation_gain_m: f64,
) -> Activity {
    Activity::create(
        location,
        distance_km,
        duration_min,
        Variant::Ride { elevation_gain_m },
    )
}

impl Activity {
    /// Creates a new activity stamped with the current local time.
    pub fn create(
        location: Location,
        distance_km: f64,
        duration_min: f64,
        variant: Variant,
    ) -> Self {
        Self::create_at(Local::now(), location, distance_km, duration_min, variant)
    }

    pub fn create_at<Tz: TimeZone>(
        created_at: DateTime<Tz>,
        location: Location,
        distance_km: f64,
        duration_min: f64,
        variant: Variant,
    ) -> Self {
        Self::restore(
            ActivityId::generate(created_at.clone()),
            created_at,
            location,
            distance_km,
            duration_min,
            variant,
            0,
        )
    }

    /// Rebuilds a previously created activity, re-deriving pace, speed and
    /// description from the raw inputs.
    ///
    /// The creation time keeps the offset it was recorded in, so the
    /// description names the same day whatever zone the machine is in now.
    pub fn restore<Tz: TimeZone>(
        id: ActivityId,
        created_at: DateTime<Tz>,
        location: Location,
        distance_km: f64,
        duration_min: f64,
        variant: Variant,
        click_count: u32,
    ) -> Self {
        let created_at = created_at.with_timezone(&created_at.offset().fix());
        let description = describe(variant.kind(), &created_at);
        Self {
            id,
            created_at,
            location,
            distance_km,
            duration_min,
            click_count,
            description,
            details: Details::derive(variant, distance_km, duration_min),
        }
    }

    /// Same activity under a freshly generated id.
    pub(crate) fn reissue(self) -> Self {
        Self {
            id: ActivityId::generate(self.created_at),
            ..self
        }
    }

    pub(crate) fn record_click(&mut self) -> u32 {
        self.click_count = self.click_count.saturating_add(1);
        self.click_count
    }

    pub fn id(&self) -> &ActivityId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<FixedOffset> {
        self.created_at
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn duration_min(&self) -> f64 {
        self.duration_min
    }

    pub fn click_count(&self) -> u32 {
        self.click_count
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn details(&self) -> Details {
        self.details
    }

    pub fn kind(&self) -> ActivityKind {
        match self.details {
            Details::Run { .. } => ActivityKind::Running,
            Details::Ride { .. } => ActivityKind::Cycling,
        }
    }

    /// The raw kind-specific input, without derived metrics.
    pub fn variant(&self) -> Variant {
        match self.details {
            Details::Run { cadence_spm, .. } => Variant::Run { cadence_spm },
            Details::Ride {
                elevation_gain_m, ..
            } => Variant::Ride { elevation_gain_m },
        }
    }

    pub fn cadence_spm(&self) -> Option<f64> {
        match self.details {
            Details::Run { cadence_spm, .. } => Some(cadence_spm),
            Details::Ride { .. } => None,
        }
    }

    pub fn pace_min_per_km(&self) -> Option<f64> {
        match self.details {
            Details::Run {
                pace_min_per_km, ..
            } => Some(pace_min_per_km),
            Details::Ride { .. } => None,
        }
    }

    pub fn elevation_gain_m(&self) -> Option<f64> {
        match self.details {
            Details::Ride {
                elevation_gain_m, ..
            } => Some(elevation_gain_m),
            Details::Run { .. } => None,
        }
    }

    pub fn speed_km_per_h(&self) -> Option<f64> {
        match self.details {
            Details::Ride { speed_km_per_h, .. } => Some(speed_km_per_h),
            Details::Run { .. } => None,
        }
    }
}

/// `"{Label} on {Month} {DD}"`
fn describe(kind: ActivityKind, created_at: &DateTime<FixedOffset>) -> String {
    format!("{} on {}", kind.label(), created_at.format("%B %d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn april_fourth() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 4, 4, 9, 30, 0).unwrap()
    }

    fn here() -> Location {
        Location::new(39.7, -105.0)
    }

    #[test]
    fn test_run_pace() {
        let run = create_run(here(), 5.2, 30.0, 170.0);
        assert_eq!(run.kind(), ActivityKind::Running);
        assert!((run.pace_min_per_km().unwrap() - 30.0 / 5.2).abs() < 1e-12);
        assert_eq!(run.speed_km_per_h(), None);
        assert_eq!(run.cadence_spm(), Some(170.0));
        assert_eq!(run.click_count(), 0);
    }

    #[test]
    fn test_ride_speed() {
        let ride = create_ride(here(), 10.0, 30.0, -20.0);
        assert_eq!(ride.kind(), ActivityKind::Cycling);
        assert!((ride.speed_km_per_h().unwrap() - 20.0).abs() < 1e-12);
        assert_eq!(ride.elevation_gain_m(), Some(-20.0));
        assert_eq!(ride.pace_min_per_km(), None);
    }

    #[test]
    fn test_description_format() {
        let run = Activity::create_at(
            april_fourth(),
            here(),
            3.0,
            18.0,
            Variant::Run { cadence_spm: 160.0 },
        );
        assert_eq!(run.description(), "Running on April 04");

        let ride = Activity::create_at(
            Local.with_ymd_and_hms(2023, 11, 21, 18, 0, 0).unwrap(),
            here(),
            20.0,
            45.0,
            Variant::Ride {
                elevation_gain_m: 120.0,
            },
        );
        assert_eq!(ride.description(), "Cycling on November 21");
    }

    #[test]
    fn test_restore_rederives_everything() {
        let original = create_run(here(), 8.0, 40.0, 175.0);
        let restored = Activity::restore(
            original.id().clone(),
            original.created_at(),
            original.location(),
            original.distance_km(),
            original.duration_min(),
            original.variant(),
            3,
        );
        assert_eq!(restored.description(), original.description());
        assert_eq!(restored.pace_min_per_km(), Some(5.0));
        assert_eq!(restored.click_count(), 3);
    }

    #[test]
    fn test_record_click_only_changes_counter() {
        let mut ride = create_ride(here(), 12.0, 36.0, 50.0);
        let before = ride.clone();
        assert_eq!(ride.record_click(), 1);
        assert_eq!(ride.record_click(), 2);
        assert_eq!(ride.description(), before.description());
        assert_eq!(ride.details(), before.details());
        assert_eq!(ride.id(), before.id());
    }

    #[test]
    fn test_reissue_keeps_inputs() {
        let run = create_run(here(), 5.0, 25.0, 168.0);
        let again = run.clone().reissue();
        assert_eq!(again.created_at(), run.created_at());
        assert_eq!(again.details(), run.details());
        assert_eq!(again.description(), run.description());
    }

    #[test]
    fn test_generated_id_shape() {
        let id = ActivityId::generate(april_fourth());
        assert_eq!(id.as_str().len(), 14);
        let millis = april_fourth().timestamp_millis().to_string();
        assert!(id.as_str().starts_with(&millis[millis.len() - 10..]));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ActivityKind::Running.to_string(), "running");
        assert_eq!(ActivityKind::Cycling.label(), "Cycling");
        assert_eq!(ActivityKind::Running.toggled(), ActivityKind::Cycling);
        assert_eq!(ActivityKind::Cycling.style_class(), "cycling-popup");
    }

    #[test]
    fn test_parse_location() {
        let loc: Location = "51.5072, -0.1276".parse().unwrap();
        assert_eq!(loc, Location::new(51.5072, -0.1276));

        assert_eq!("51.5".parse::<Location>(), Err(ParseLocationError::Format));
        assert!(matches!(
            "abc,1".parse::<Location>(),
            Err(ParseLocationError::Number(_))
        ));
        assert!(matches!(
            "91,0".parse::<Location>(),
            Err(ParseLocationError::Latitude(_))
        ));
        assert!(matches!(
            "0,181".parse::<Location>(),
            Err(ParseLocationError::Longitude(_))
        ));
    }

    #[test]
    fn test_location_serializes_as_pair() {
        let json = serde_json::to_string(&Location::new(1.5, -2.25)).unwrap();
        assert_eq!(json, "[1.5,-2.25]");
        let back: Location = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Location::new(1.5, -2.25));
    }
}
