//! Jump-free compass heading for rotating the dial and the Qibla needle.
//!
//! Raw sensor headings wrap at 360°, so feeding them straight into a
//! rotation makes the dial spin the long way round when the device crosses
//! north. The filter instead accumulates the shortest signed step between
//! consecutive samples into an unbounded angle. The accumulator is never
//! wrapped back into [0, 360): it may go negative or past several full turns.

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadingFilter {
    previous_raw: f64,
    accumulated: f64,
    raw: Option<f64>,
}

/// Shortest signed angular step from `from` to `to`, in [-180, 180].
pub fn shortest_delta(from: f64, to: f64) -> f64 {
    let mut delta = to - from;
    if delta < -180.0 {
        delta += 360.0;
    } else if delta > 180.0 {
        delta -= 360.0;
    }
    delta
}

impl HeadingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous session. Both the last raw sample and the
    /// accumulator return to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Consume one raw heading in [0, 360) and return the new accumulated heading.
    pub fn update(&mut self, raw: f64) -> f64 {
        self.accumulated += shortest_delta(self.previous_raw, raw);
        self.previous_raw = raw;
        self.raw = Some(raw);
        self.accumulated
    }

    /// Last raw sample, unchanged, for the numeric readout. `None` until the
    /// first sample after a reset.
    pub fn raw_heading(&self) -> Option<f64> {
        self.raw
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    /// Rotation for the compass face so north stays put as the device turns.
    pub fn dial_rotation(&self) -> f64 {
        -self.accumulated
    }

    /// Rotation for the Qibla needle so it keeps pointing at `qibla_bearing`.
    pub fn needle_rotation(&self, qibla_bearing: f64) -> f64 {
        qibla_bearing - self.accumulated
    }
}
