//! Orientation events, sensor permission and the live compass session.

use std::fmt;

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::Result;
use crate::heading_filter::HeadingFilter;

/// Which field of an orientation event the heading was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HeadingSource {
    /// Platform-reported heading relative to true north.
    TrueNorth,
    /// Alpha angle flagged as absolute (earth frame).
    Absolute,
    /// Bare alpha angle, magnetic north with no absolute guarantee.
    Magnetic,
}

/// One sample from a device orientation source.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OrientationEvent {
    pub compass_heading: Option<f64>,
    pub absolute: bool,
    /// Counter-clockwise rotation around the z axis, degrees.
    pub alpha: Option<f64>,
}

fn alpha_to_heading(alpha: f64) -> f64 {
    // alpha = 0 maps to 360, which the readout expects as 0
    (alpha - 360.0).abs() % 360.0
}

impl OrientationEvent {
    pub fn true_north(heading: f64) -> Self {
        Self {
            compass_heading: Some(heading),
            ..Self::default()
        }
    }

    pub fn alpha(alpha: f64, absolute: bool) -> Self {
        Self {
            compass_heading: None,
            absolute,
            alpha: Some(alpha),
        }
    }

    /// Pick the heading by priority: true-north field, absolute alpha, plain alpha.
    pub fn heading(&self) -> Option<(f64, HeadingSource)> {
        if let Some(heading) = self.compass_heading {
            return Some((heading, HeadingSource::TrueNorth));
        }
        let alpha = self.alpha?;
        let source = if self.absolute {
            HeadingSource::Absolute
        } else {
            HeadingSource::Magnetic
        };
        Some((alpha_to_heading(alpha), source))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PermissionState {
    Unknown,
    NeedsPermission,
    Granted,
    /// Terminal. The user refused; no automatic retry.
    Denied,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionEvent {
    /// The platform wants an explicit grant before emitting events.
    GrantRequired,
    /// No grant needed, the listener is attached straight away.
    ListenerAttached,
    Granted,
    Refused,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PermissionState::Unknown => "unknown",
            PermissionState::NeedsPermission => "needs permission",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        };
        write!(f, "{}", text)
    }
}

impl PermissionState {
    /// Apply an event. Transitions not in the table leave the state unchanged.
    pub fn on(self, event: PermissionEvent) -> Self {
        use PermissionEvent as E;
        use PermissionState as S;

        let next = match (self, event) {
            (S::Unknown, E::GrantRequired) => S::NeedsPermission,
            (S::Unknown, E::ListenerAttached) => S::Granted,
            (S::NeedsPermission, E::Granted) => S::Granted,
            (S::NeedsPermission, E::Refused) => S::Denied,
            (state, _) => state,
        };
        if next == self {
            debug!("Permission event {:?} ignored in state {}", event, self);
        }
        next
    }

    pub fn is_granted(self) -> bool {
        self == PermissionState::Granted
    }
}

/// A source of orientation events: a magnetometer, a replay file, a test double.
pub trait OrientationSensor {
    /// Whether events only flow after `request_grant` succeeds.
    fn requires_grant(&self) -> bool;

    /// Ask for access. `Ok(false)` is a refusal.
    fn request_grant(&mut self) -> Result<bool>;

    /// Next pending event, `None` when nothing has arrived.
    fn poll(&mut self) -> Result<Option<OrientationEvent>>;
}

/// Snapshot of everything the compass view draws.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CompassReadout {
    pub raw_heading: Option<f64>,
    pub accumulated: f64,
    pub dial_rotation: f64,
    pub needle_rotation: f64,
    pub source: Option<HeadingSource>,
    pub permission: PermissionState,
}

/// Live compass: owns the sensor, the smoothing filter and the permission state.
///
/// The filter is reset on every `open`, so a previous session's accumulator
/// never leaks into the next one.
pub struct CompassSession<S: OrientationSensor> {
    sensor: S,
    filter: HeadingFilter,
    permission: PermissionState,
    source: Option<HeadingSource>,
    qibla_bearing: f64,
    active: bool,
}

impl<S: OrientationSensor> CompassSession<S> {
    pub fn new(sensor: S, qibla_bearing: f64) -> Self {
        Self {
            sensor,
            filter: HeadingFilter::new(),
            permission: PermissionState::Unknown,
            source: None,
            qibla_bearing,
            active: false,
        }
    }

    /// Activate the compass view. Returns the permission state after negotiation.
    /// A failed grant request leaves the session inactive.
    pub fn open(&mut self) -> Result<PermissionState> {
        if self.permission == PermissionState::Unknown {
            let event = if self.sensor.requires_grant() {
                PermissionEvent::GrantRequired
            } else {
                PermissionEvent::ListenerAttached
            };
            self.permission = self.permission.on(event);
        }

        if self.permission == PermissionState::NeedsPermission {
            let event = if self.sensor.request_grant()? {
                PermissionEvent::Granted
            } else {
                PermissionEvent::Refused
            };
            self.permission = self.permission.on(event);
        }

        if !self.active {
            self.filter.reset();
            self.source = None;
            self.active = true;
        }

        match self.permission {
            PermissionState::Granted => info!("Compass opened, listening for orientation"),
            PermissionState::Denied => warn!("Compass access denied, heading stays at 0°"),
            state => debug!("Compass opened in state {}", state),
        }
        Ok(self.permission)
    }

    /// Deactivate the view; the sensor is no longer polled.
    pub fn close(&mut self) {
        if self.active {
            debug!("Compass closed at accumulated {:.1}°", self.filter.accumulated());
        }
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    pub fn set_qibla(&mut self, bearing: f64) {
        self.qibla_bearing = bearing;
    }

    /// Feed one event directly, bypassing the sensor.
    pub fn handle(&mut self, event: &OrientationEvent) -> bool {
        if !self.active || !self.permission.is_granted() {
            return false;
        }
        match event.heading() {
            Some((heading, source)) => {
                if self.source != Some(source) {
                    debug!("Heading source is now {:?}", source);
                }
                self.source = Some(source);
                self.filter.update(heading);
                true
            }
            None => false,
        }
    }

    /// Poll the sensor once. Returns whether the heading moved.
    pub fn pump(&mut self) -> Result<bool> {
        if !self.active || !self.permission.is_granted() {
            return Ok(false);
        }
        match self.sensor.poll()? {
            Some(event) => Ok(self.handle(&event)),
            None => Ok(false),
        }
    }

    pub fn readout(&self) -> CompassReadout {
        CompassReadout {
            raw_heading: self.filter.raw_heading(),
            accumulated: self.filter.accumulated(),
            dial_rotation: self.filter.dial_rotation(),
            needle_rotation: self.filter.needle_rotation(self.qibla_bearing),
            source: self.source,
            permission: self.permission,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FakeSensor {
        requires_grant: bool,
        grant: bool,
        grant_requests: u32,
        events: VecDeque<OrientationEvent>,
        polls: u32,
    }

    impl FakeSensor {
        fn new(requires_grant: bool, grant: bool, headings: &[f64]) -> Self {
            Self {
                requires_grant,
                grant,
                grant_requests: 0,
                events: headings
                    .iter()
                    .map(|&h| OrientationEvent::true_north(h))
                    .collect(),
                polls: 0,
            }
        }
    }

    impl OrientationSensor for FakeSensor {
        fn requires_grant(&self) -> bool {
            self.requires_grant
        }

        fn request_grant(&mut self) -> Result<bool> {
            self.grant_requests += 1;
            Ok(self.grant)
        }

        fn poll(&mut self) -> Result<Option<OrientationEvent>> {
            self.polls += 1;
            Ok(self.events.pop_front())
        }
    }

    #[test]
    fn test_heading_source_priority() {
        let event = OrientationEvent {
            compass_heading: Some(42.0),
            absolute: true,
            alpha: Some(10.0),
        };
        assert_eq!(event.heading(), Some((42.0, HeadingSource::TrueNorth)));

        let event = OrientationEvent::alpha(90.0, true);
        assert_eq!(event.heading(), Some((270.0, HeadingSource::Absolute)));

        let event = OrientationEvent::alpha(90.0, false);
        assert_eq!(event.heading(), Some((270.0, HeadingSource::Magnetic)));

        let event = OrientationEvent::alpha(0.0, false);
        assert_eq!(event.heading(), Some((0.0, HeadingSource::Magnetic)));

        assert_eq!(OrientationEvent::default().heading(), None);
    }

    #[test]
    fn test_permission_transitions() {
        use PermissionEvent as E;
        use PermissionState as S;

        assert_eq!(S::Unknown.on(E::GrantRequired), S::NeedsPermission);
        assert_eq!(S::Unknown.on(E::ListenerAttached), S::Granted);
        assert_eq!(S::NeedsPermission.on(E::Granted), S::Granted);
        assert_eq!(S::NeedsPermission.on(E::Refused), S::Denied);

        // denied is terminal
        assert_eq!(S::Denied.on(E::Granted), S::Denied);
        assert_eq!(S::Denied.on(E::ListenerAttached), S::Denied);
        // nothing skips the request step
        assert_eq!(S::Unknown.on(E::Granted), S::Unknown);
        assert_eq!(S::Granted.on(E::Refused), S::Granted);
    }

    #[test]
    fn test_session_without_grant() -> Result<()> {
        let mut session = CompassSession::new(FakeSensor::new(false, false, &[10.0, 350.0]), 295.0);
        assert_eq!(session.open()?, PermissionState::Granted);
        assert_eq!(session.sensor.grant_requests, 0);

        while session.pump()? {}
        let readout = session.readout();
        assert_eq!(readout.raw_heading, Some(350.0));
        assert_eq!(readout.accumulated, -10.0);
        assert_eq!(readout.dial_rotation, 10.0);
        assert_eq!(readout.needle_rotation, 305.0);
        assert_eq!(readout.source, Some(HeadingSource::TrueNorth));
        Ok(())
    }

    #[test]
    fn test_session_grant_and_refusal() -> Result<()> {
        let mut granted = CompassSession::new(FakeSensor::new(true, true, &[45.0]), 0.0);
        assert_eq!(granted.open()?, PermissionState::Granted);
        assert_eq!(granted.sensor.grant_requests, 1);
        assert!(granted.pump()?);

        let mut refused = CompassSession::new(FakeSensor::new(true, false, &[45.0]), 0.0);
        assert_eq!(refused.open()?, PermissionState::Denied);
        assert!(!refused.pump()?);
        assert_eq!(refused.sensor.polls, 0);
        assert_eq!(refused.readout().accumulated, 0.0);

        // reopening never asks again
        refused.close();
        assert_eq!(refused.open()?, PermissionState::Denied);
        assert_eq!(refused.sensor.grant_requests, 1);
        Ok(())
    }

    /// Grant requests fail outright, as when the bus driver errors.
    struct BrokenGrant;

    impl OrientationSensor for BrokenGrant {
        fn requires_grant(&self) -> bool {
            true
        }

        fn request_grant(&mut self) -> Result<bool> {
            Err(crate::error::Error::Sensor("no driver".to_string()))
        }

        fn poll(&mut self) -> Result<Option<OrientationEvent>> {
            Ok(Some(OrientationEvent::true_north(90.0)))
        }
    }

    #[test]
    fn test_failed_grant_leaves_session_closed() {
        let mut session = CompassSession::new(BrokenGrant, 295.0);
        assert!(session.open().is_err());
        assert!(!session.is_active());
        assert_eq!(session.permission(), PermissionState::NeedsPermission);
        assert!(!session.handle(&OrientationEvent::true_north(90.0)));
        assert_eq!(session.readout().raw_heading, None);
    }

    #[test]
    fn test_reopen_resets_filter() -> Result<()> {
        let mut session = CompassSession::new(FakeSensor::new(false, false, &[]), 100.0);
        session.open()?;
        for heading in [90.0, 180.0, 270.0, 0.0] {
            session.handle(&OrientationEvent::true_north(heading));
        }
        assert_eq!(session.readout().accumulated, 360.0);

        // opening an already open session keeps the accumulator
        session.open()?;
        assert_eq!(session.readout().accumulated, 360.0);

        session.close();
        assert!(!session.handle(&OrientationEvent::true_north(10.0)));
        assert!(!session.pump()?);

        session.open()?;
        let readout = session.readout();
        assert_eq!(readout.accumulated, 0.0);
        assert_eq!(readout.raw_heading, None);
        assert_eq!(readout.source, None);
        Ok(())
    }

    #[test]
    fn test_no_events_stays_at_reset_value() -> Result<()> {
        let mut session = CompassSession::new(FakeSensor::new(false, false, &[]), 295.0);
        session.open()?;
        for _ in 0..10 {
            assert!(!session.pump()?);
        }
        let readout = session.readout();
        assert_eq!(readout.raw_heading, None);
        assert_eq!(readout.needle_rotation, 295.0);
        assert!(!session.handle(&OrientationEvent::default()));
        Ok(())
    }

    #[test]
    fn test_set_qibla_keeps_filter() -> Result<()> {
        let mut session = CompassSession::new(FakeSensor::new(false, false, &[]), 10.0);
        session.open()?;
        session.handle(&OrientationEvent::true_north(20.0));
        session.set_qibla(119.0);
        let readout = session.readout();
        assert_eq!(readout.accumulated, 20.0);
        assert_eq!(readout.needle_rotation, 99.0);
        Ok(())
    }
}
