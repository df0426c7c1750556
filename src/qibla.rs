//! Direction and distance to the Kaaba.

use std::fmt;

use serde::Serialize;

use crate::compass::{Direction, heading_to_direction_16point};
use crate::config::KAABA;
use crate::position::Position;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QiblaReading {
    /// Degrees clockwise from true north, [0, 360).
    pub bearing: f64,
    /// Whole kilometres along the great circle.
    pub distance_km: f64,
}

impl QiblaReading {
    pub fn direction(&self) -> Direction {
        heading_to_direction_16point(self.bearing).0
    }
}

impl fmt::Display for QiblaReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}° {} ({:.0} km)",
            self.bearing,
            self.direction(),
            self.distance_km
        )
    }
}

/// Bearing and distance from `observer` to `target`.
///
/// Total over the valid coordinate domain. When both points coincide the
/// bearing is 0 and the distance 0.
pub fn compute_qibla(observer: &Position, target: &Position) -> QiblaReading {
    QiblaReading {
        bearing: observer.bearing_to(target),
        distance_km: observer.distance_to(target).round(),
    }
}

pub fn qibla_from(observer: &Position) -> QiblaReading {
    compute_qibla(observer, &KAABA)
}
