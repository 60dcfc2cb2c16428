use itertools::Itertools;

use crate::workout::{Activity, ActivityKind};

/// Totals for one kind of activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindTotals {
    pub kind: ActivityKind,
    pub count: usize,
    pub distance_km: f64,
    pub duration_min: f64,
}

impl KindTotals {
    /// Minutes per kilometre over every activity, for runs.
    pub fn average_pace(&self) -> Option<f64> {
        match self.kind {
            ActivityKind::Running if self.distance_km > 0.0 => {
                Some(self.duration_min / self.distance_km)
            }
            _ => None,
        }
    }

    /// Kilometres per hour over every activity, for rides.
    pub fn average_speed(&self) -> Option<f64> {
        match self.kind {
            ActivityKind::Cycling if self.duration_min > 0.0 => {
                Some(self.distance_km / (self.duration_min / 60.0))
            }
            _ => None,
        }
    }
}

/// Per-kind totals, running first. Kinds without activities are omitted.
pub fn totals<'a>(activities: impl IntoIterator<Item = &'a Activity>) -> Vec<KindTotals> {
    activities
        .into_iter()
        .into_group_map_by(|a| a.kind())
        .into_iter()
        .map(|(kind, group)| KindTotals {
            kind,
            count: group.len(),
            distance_km: group.iter().map(|a| a.distance_km()).sum(),
            duration_min: group.iter().map(|a| a.duration_min()).sum(),
        })
        .sorted_by_key(|t| t.kind)
        .collect()
}
