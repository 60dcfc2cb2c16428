use std::thread;
use thiserror::Error;
use tracing::{debug, info};

use crate::workout::{Location, ParseLocationError};

/// Environment variable consulted for the current location (`"lat,lng"`).
pub const LOCATION_ENV: &str = "TREAD_LOCATION";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeoError {
    #[error("could not get your position (pass --location lat,lng or set TREAD_LOCATION)")]
    Unavailable,
    #[error("invalid location {input:?} from {source_name}: {reason}")]
    Invalid {
        input: String,
        source_name: &'static str,
        reason: ParseLocationError,
    },
}

pub type OnLocated = Box<dyn FnOnce(Location) + Send>;
pub type OnLocationFailed = Box<dyn FnOnce(GeoError) + Send>;

/// Source of the user's current position. Fire-and-forget: exactly one of
/// the callbacks runs, possibly on another thread.
pub trait Geolocator {
    fn current_location(&self, on_success: OnLocated, on_failure: OnLocationFailed);
}

/// Resolves the position from, in order: an explicit value (the command
/// line), the `TREAD_LOCATION` environment variable, then the configured
/// home location.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredGeolocator {
    explicit: Option<String>,
    env: Option<String>,
    home: Option<Location>,
}

impl ConfiguredGeolocator {
    pub fn new(explicit: Option<String>, home: Option<Location>) -> Self {
        Self::with_sources(explicit, std::env::var(LOCATION_ENV).ok(), home)
    }

    pub fn with_sources(
        explicit: Option<String>,
        env: Option<String>,
        home: Option<Location>,
    ) -> Self {
        Self {
            explicit,
            env,
            home,
        }
    }

    pub fn resolve(&self) -> Result<Location, GeoError> {
        let parse = |input: &str, source_name: &'static str| {
            input.parse::<Location>().map_err(|reason| GeoError::Invalid {
                input: input.to_string(),
                source_name,
                reason,
            })
        };

        if let Some(raw) = self.explicit.as_deref() {
            debug!("using location from the command line");
            return parse(raw, "--location");
        }
        if let Some(raw) = self.env.as_deref().filter(|v| !v.trim().is_empty()) {
            debug!("using location from {}", LOCATION_ENV);
            return parse(raw, LOCATION_ENV);
        }
        self.home.ok_or(GeoError::Unavailable)
    }
}

impl Geolocator for ConfiguredGeolocator {
    fn current_location(&self, on_success: OnLocated, on_failure: OnLocationFailed) {
        let outcome = self.resolve();
        thread::spawn(move || match outcome {
            Ok(location) => {
                info!(%location, "location acquired");
                on_success(location)
            }
            Err(err) => on_failure(err),
        });
    }
}
