use thiserror::Error;

use crate::workout::{ActivityKind, Location, Variant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Field {
    Distance,
    Duration,
    Cadence,
    Elevation,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must be a number")]
    NotANumber(Field),
    #[error("{0} must be a positive number")]
    NotPositive(Field),
}

impl ValidationError {
    pub fn field(&self) -> Field {
        match self {
            ValidationError::NotANumber(f) | ValidationError::NotPositive(f) => *f,
        }
    }
}

/// Form values that passed validation, ready for the workout constructors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validated {
    pub distance_km: f64,
    pub duration_min: f64,
    pub variant: Variant,
}

fn parse_finite(field: Field, raw: &str) -> Result<f64, ValidationError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(ValidationError::NotANumber(field))
}

/// Checks raw form input. Every field must be a finite number first; then
/// distance, duration and (for runs) cadence must be strictly positive.
/// Elevation gain may be zero or negative.
pub fn validate(
    kind: ActivityKind,
    raw_distance: &str,
    raw_duration: &str,
    raw_extra: &str,
) -> Result<Validated, ValidationError> {
    let extra_field = match kind {
        ActivityKind::Running => Field::Cadence,
        ActivityKind::Cycling => Field::Elevation,
    };

    let distance_km = parse_finite(Field::Distance, raw_distance)?;
    let duration_min = parse_finite(Field::Duration, raw_duration)?;
    let extra = parse_finite(extra_field, raw_extra)?;

    let mut must_be_positive = vec![
        (Field::Distance, distance_km),
        (Field::Duration, duration_min),
    ];
    if kind == ActivityKind::Running {
        must_be_positive.push((Field::Cadence, extra));
    }
    if let Some((field, _)) = must_be_positive.into_iter().find(|(_, v)| *v <= 0.0) {
        return Err(ValidationError::NotPositive(field));
    }

    let variant = match kind {
        ActivityKind::Running => Variant::Run { cadence_spm: extra },
        ActivityKind::Cycling => Variant::Ride {
            elevation_gain_m: extra,
        },
    };

    Ok(Validated {
        distance_km,
        duration_min,
        variant,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Kind,
    Distance,
    Duration,
    Extra,
}

impl FormField {
    const ORDER: [FormField; 4] = [
        FormField::Kind,
        FormField::Distance,
        FormField::Duration,
        FormField::Extra,
    ];

    fn index(self) -> usize {
        Self::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ORDER[(self.index() + 1) % Self::ORDER.len()]
    }

    pub fn prev(self) -> Self {
        Self::ORDER[(self.index() + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }
}

/// Raw text of the new-activity form, opened at a map location.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityForm {
    pub location: Location,
    pub kind: ActivityKind,
    pub distance: String,
    pub duration: String,
    pub cadence: String,
    pub elevation: String,
    pub focus: FormField,
    pub error: Option<ValidationError>,
}

impl ActivityForm {
    pub fn new(location: Location, kind: ActivityKind) -> Self {
        Self {
            location,
            kind,
            distance: String::new(),
            duration: String::new(),
            cadence: String::new(),
            elevation: String::new(),
            focus: FormField::Distance,
            error: None,
        }
    }

    /// Label of the kind-specific row.
    pub fn extra_label(&self) -> &'static str {
        match self.kind {
            ActivityKind::Running => "Cadence",
            ActivityKind::Cycling => "Elev Gain",
        }
    }

    pub fn extra_unit(&self) -> &'static str {
        match self.kind {
            ActivityKind::Running => "step/min",
            ActivityKind::Cycling => "meters",
        }
    }

    pub fn extra(&self) -> &str {
        match self.kind {
            ActivityKind::Running => &self.cadence,
            ActivityKind::Cycling => &self.elevation,
        }
    }

    fn focused_text(&mut self) -> Option<&mut String> {
        match self.focus {
            FormField::Kind => None,
            FormField::Distance => Some(&mut self.distance),
            FormField::Duration => Some(&mut self.duration),
            FormField::Extra => Some(match self.kind {
                ActivityKind::Running => &mut self.cadence,
                ActivityKind::Cycling => &mut self.elevation,
            }),
        }
    }

    pub fn focus_next(&mut self) {
        self.focus = self.focus.next();
    }

    pub fn focus_prev(&mut self) {
        self.focus = self.focus.prev();
    }

    pub fn toggle_kind(&mut self) {
        self.kind = self.kind.toggled();
        self.error = None;
    }

    /// Types a character into the focused field. Only characters that can
    /// appear in a decimal number are accepted; returns whether it was.
    pub fn push_char(&mut self, c: char) -> bool {
        if !(c.is_ascii_digit() || c == '.' || c == '-') {
            return false;
        }
        match self.focused_text() {
            Some(text) => {
                text.push(c);
                self.error = None;
                true
            }
            None => false,
        }
    }

    pub fn backspace(&mut self) {
        if let Some(text) = self.focused_text() {
            text.pop();
        }
    }

    pub fn validate(&self) -> Result<Validated, ValidationError> {
        validate(self.kind, &self.distance, &self.duration, self.extra())
    }

    /// Records a failed submission and moves focus to the offending field.
    pub fn reject(&mut self, err: ValidationError) {
        self.focus = match err.field() {
            Field::Distance => FormField::Distance,
            Field::Duration => FormField::Duration,
            Field::Cadence | Field::Elevation => FormField::Extra,
        };
        self.error = Some(err);
    }
}
