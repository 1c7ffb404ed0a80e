//! Region enter/exit state machine over the nearest beacon.
//!
//! Evaluated once per tick (session end or explicit stop) against the
//! registry's nearest record. Identity comparison is per physical device, so
//! moving to another device that shares the region triple counts as roaming.

use tracing::info;

use crate::types::{BeaconEvent, BeaconIdentity, BeaconRecord};

/// Where the tracker currently believes the user is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionState {
    NoRegion,
    InRegion(BeaconIdentity),
}

/// Derives region events from successive nearest-beacon observations.
#[derive(Debug, Clone, Default)]
pub struct RegionTracker {
    previous: Option<BeaconRecord>,
}

impl RegionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The nearest beacon last notified to the listener.
    pub fn previous(&self) -> Option<&BeaconRecord> {
        self.previous.as_ref()
    }

    pub fn state(&self) -> RegionState {
        match &self.previous {
            Some(record) => RegionState::InRegion(record.identity()),
            None => RegionState::NoRegion,
        }
    }

    /// Advance the machine. Returns the events to deliver, in order.
    pub fn tick(&mut self, current: Option<&BeaconRecord>) -> Vec<BeaconEvent> {
        let mut events = Vec::new();

        match (self.previous.take(), current) {
            (None, None) => {}
            (None, Some(entered)) => {
                info!(beacon = %entered, "entering region");
                events.push(BeaconEvent::EnterRegion(entered.clone()));
                self.previous = Some(entered.clone());
            }
            (Some(prev), Some(now)) if prev.is_identical(now) => {
                // Same device, refresh silently
                self.previous = Some(now.clone());
            }
            (Some(prev), Some(now)) => {
                info!(from = %prev, to = %now, "roaming");
                events.push(BeaconEvent::ExitRegion(prev));
                events.push(BeaconEvent::EnterRegion(now.clone()));
                self.previous = Some(now.clone());
            }
            (Some(prev), None) => {
                info!(beacon = %prev, "leaving region");
                events.push(BeaconEvent::ExitRegion(prev));
            }
        }

        events
    }

    /// Forget the current region without telling anyone, so the next tick
    /// re-detects it.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: u8, mac: &str, distance: f64) -> BeaconRecord {
        let mut uuid = [0u8; 16];
        uuid[15] = id;
        let mut r = BeaconRecord::new(uuid, u16::from(id), u16::from(id), -59);
        r.mac_address = mac.into();
        r.estimated_distance = distance;
        r
    }

    fn region_a() -> BeaconRecord {
        region(1, "AA:AA:AA:AA:AA:01", 1.0)
    }

    fn region_b() -> BeaconRecord {
        region(2, "BB:BB:BB:BB:BB:02", 2.0)
    }

    #[test]
    fn test_none_to_none() {
        let mut tracker = RegionTracker::new();
        assert!(tracker.tick(None).is_empty());
        assert_eq!(tracker.state(), RegionState::NoRegion);
    }

    #[test]
    fn test_enter_from_nowhere() {
        let mut tracker = RegionTracker::new();
        let b = region_b();

        let events = tracker.tick(Some(&b));
        assert_eq!(events, vec![BeaconEvent::EnterRegion(b.clone())]);
        assert_eq!(tracker.previous(), Some(&b));
        assert_eq!(tracker.state(), RegionState::InRegion(b.identity()));
    }

    #[test]
    fn test_same_identity_silent_refresh() {
        let mut tracker = RegionTracker::new();
        tracker.tick(Some(&region_a()));

        let mut closer = region_a();
        closer.estimated_distance = 0.4;
        assert!(tracker.tick(Some(&closer)).is_empty());
        assert_eq!(tracker.previous().unwrap().estimated_distance, 0.4);
    }

    #[test]
    fn test_roaming_exit_then_enter() {
        let mut tracker = RegionTracker::new();
        let a = region_a();
        let b = region_b();
        tracker.tick(Some(&a));

        let events = tracker.tick(Some(&b));
        assert_eq!(
            events,
            vec![BeaconEvent::ExitRegion(a), BeaconEvent::EnterRegion(b.clone())]
        );
        assert_eq!(tracker.previous(), Some(&b));
    }

    #[test]
    fn test_leave_region() {
        let mut tracker = RegionTracker::new();
        let a = region_a();
        tracker.tick(Some(&a));

        assert_eq!(tracker.tick(None), vec![BeaconEvent::ExitRegion(a)]);
        assert!(tracker.previous().is_none());
    }

    #[test]
    fn test_same_region_other_device_is_roaming() {
        let mut tracker = RegionTracker::new();
        let a = region_a();
        let mut twin = region_a();
        twin.mac_address = "AA:AA:AA:AA:AA:99".into();
        tracker.tick(Some(&a));

        let events = tracker.tick(Some(&twin));
        assert_eq!(
            events,
            vec![BeaconEvent::ExitRegion(a), BeaconEvent::EnterRegion(twin)]
        );
    }

    #[test]
    fn test_reset_forces_reentry() {
        let mut tracker = RegionTracker::new();
        let a = region_a();
        tracker.tick(Some(&a));

        tracker.reset();
        assert!(tracker.previous().is_none());
        assert_eq!(tracker.tick(Some(&a)), vec![BeaconEvent::EnterRegion(a)]);
    }
}
