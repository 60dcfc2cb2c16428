use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::Path;

use crate::workout::{Activity, ActivityKind};

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    kind: ActivityKind,
    date: String,
    lat: f64,
    lng: f64,
    distance_km: f64,
    duration_min: f64,
    cadence_spm: Option<f64>,
    elevation_gain_m: Option<f64>,
    pace_min_per_km: Option<f64>,
    speed_km_per_h: Option<f64>,
    clicks: u32,
}

impl<'a> From<&'a Activity> for CsvRow<'a> {
    fn from(a: &'a Activity) -> Self {
        CsvRow {
            id: a.id().as_str(),
            kind: a.kind(),
            date: a.created_at().to_rfc3339(),
            lat: a.location().lat,
            lng: a.location().lng,
            distance_km: a.distance_km(),
            duration_min: a.duration_min(),
            cadence_spm: a.cadence_spm(),
            elevation_gain_m: a.elevation_gain_m(),
            pace_min_per_km: a.pace_min_per_km(),
            speed_km_per_h: a.speed_km_per_h(),
            clicks: a.click_count(),
        }
    }
}

/// Writes one CSV row per activity, with a header. Columns that do not
/// apply to an activity's kind are left empty.
pub fn write_csv<'a, W: io::Write>(
    activities: impl IntoIterator<Item = &'a Activity>,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for activity in activities {
        wtr.serialize(CsvRow::from(activity))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_to_path<'a, P: AsRef<Path>>(
    activities: impl IntoIterator<Item = &'a Activity>,
    path: P,
) -> Result<(), csv::Error> {
    let file = File::create(path)?;
    write_csv(activities, file)
}
