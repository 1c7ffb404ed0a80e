//! Scan session lifecycle: `Idle -> Scanning -> Idle`.
//!
//! Sans-I/O. The session talks to the outside through three capabilities
//! (radio, inactivity timer, listener) and is driven by whoever owns it
//! calling `handle_advertisement()` and `handle_timer_expired()`. All calls
//! must come from one logical owner; the async receiver funnels radio frames
//! and timer firings through a single queue for that reason.
//!
//! The inactivity timer is re-armed on every newly discovered beacon. Each
//! arming gets a fresh [`TimerToken`] and expiries carrying an older token are
//! ignored, so a firing that raced a cancel can never end the session.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::frame::FrameParser;
use crate::region::{RegionState, RegionTracker};
use crate::registry::{BeaconRegistry, UpsertOutcome};
use crate::types::{Advertisement, BeaconEvent, BeaconRecord, BeaconUuid, Result, SearchState};
use crate::vendor::VendorDecoder;

/// Default quiet period after which a session ends.
pub const DEFAULT_SCANNING_PERIOD: Duration = Duration::from_millis(10_000);

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// The scanning facility. Both calls are fire-and-forget requests.
pub trait Radio {
    /// Begin delivering advertisements. A failure is reported to the
    /// listener and the session stays idle.
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self);
}

/// Identifies one arming of the inactivity timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(pub u64);

/// One-shot timer that reports back through `ScanSession::handle_timer_expired`.
pub trait InactivityTimer {
    /// Arm (replacing any pending arming) to fire `token` after `period`.
    fn arm(&mut self, token: TimerToken, period: Duration);

    fn cancel(&mut self);
}

/// Receives everything the engine reports.
pub trait BeaconListener {
    fn notify(&mut self, event: BeaconEvent);
}

impl<F: FnMut(BeaconEvent)> BeaconListener for F {
    fn notify(&mut self, event: BeaconEvent) {
        self(event);
    }
}

/// Listener that keeps every event in order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    pub events: Vec<BeaconEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&mut self) -> Vec<BeaconEvent> {
        std::mem::take(&mut self.events)
    }
}

impl BeaconListener for EventLog {
    fn notify(&mut self, event: BeaconEvent) {
        self.events.push(event);
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Session tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub scanning_period: Duration,
    pub uuid_filter: Option<BeaconUuid>,
    pub vendor_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            scanning_period: DEFAULT_SCANNING_PERIOD,
            uuid_filter: None,
            vendor_prefix: crate::vendor::DEFAULT_VENDOR_PREFIX.into(),
        }
    }
}

/// Bounded scanning window with an inactivity timeout.
///
/// Owns the registry and the region tracker. The registry is cleared at every
/// start; the region tracker survives sessions until `reset()`.
pub struct ScanSession<R, T, L> {
    radio: R,
    timer: T,
    listener: L,
    parser: FrameParser,
    vendor: VendorDecoder,
    registry: BeaconRegistry,
    region: RegionTracker,
    scanning_period: Duration,
    scanning: bool,
    next_token: u64,
    armed: Option<TimerToken>,
}

impl<R: Radio, T: InactivityTimer, L: BeaconListener> ScanSession<R, T, L> {
    pub fn new(config: SessionConfig, radio: R, timer: T, listener: L) -> Self {
        ScanSession {
            radio,
            timer,
            listener,
            parser: FrameParser::new(config.uuid_filter),
            vendor: VendorDecoder::new(config.vendor_prefix),
            registry: BeaconRegistry::new(),
            region: RegionTracker::new(),
            scanning_period: config.scanning_period,
            scanning: false,
            next_token: 0,
            armed: None,
        }
    }

    /// Begin a session. No-op while one is running.
    pub fn start(&mut self) {
        if self.scanning {
            debug!("start ignored, already scanning");
            return;
        }

        if let Err(e) = self.radio.start() {
            warn!(error = %e, "radio refused to start");
            self.listener
                .notify(BeaconEvent::OperationError(e.status_code()));
            return;
        }

        self.registry.clear();
        self.scanning = true;
        info!(period_ms = self.scanning_period.as_millis() as u64, "scan started");
        self.listener
            .notify(BeaconEvent::SearchState(SearchState::Started));
        self.rearm_timer();
    }

    /// End the session early. Always reported as a successful end, even with
    /// nothing found.
    pub fn stop(&mut self) {
        if !self.scanning {
            debug!("stop ignored, not scanning");
            return;
        }

        self.timer.cancel();
        self.armed = None;
        self.scanning = false;
        self.radio.stop();
        info!(beacons = self.registry.len(), "scan stopped");
        self.listener
            .notify(BeaconEvent::SearchState(SearchState::EndSuccess));
        self.region_tick();
    }

    /// Feed one received advertisement.
    pub fn handle_advertisement(&mut self, advert: &Advertisement) {
        if !self.scanning {
            return;
        }

        let Some(mut record) = self.parser.parse(&advert.data) else {
            return;
        };
        record.mac_address.clone_from(&advert.mac_address);
        if let Some(info) = self
            .vendor
            .decode(advert.device_name.as_deref(), &advert.data)
        {
            info.apply(&mut record);
        }

        match self.registry.upsert(record, advert.rssi) {
            UpsertOutcome::Discovered(found) => {
                info!(
                    beacon = %found,
                    mac = %found.mac_address,
                    name = advert.device_name.as_deref().unwrap_or("-"),
                    rssi = advert.rssi,
                    connectable = found.connectable,
                    "beacon found"
                );
                self.listener.notify(BeaconEvent::BeaconFound(found));
                self.rearm_timer();
            }
            UpsertOutcome::Improved { distance } => {
                debug!(mac = %advert.mac_address, distance, "beacon closer");
            }
            UpsertOutcome::Unchanged => {}
        }
    }

    /// Timer callback. Stale tokens are ignored.
    pub fn handle_timer_expired(&mut self, token: TimerToken) {
        if !self.scanning || self.armed != Some(token) {
            debug!(token = token.0, "ignoring stale timer");
            return;
        }

        self.armed = None;
        self.scanning = false;
        self.radio.stop();

        let state = if self.registry.is_empty() {
            SearchState::EndEmpty
        } else {
            SearchState::EndSuccess
        };
        info!(beacons = self.registry.len(), %state, "scan timed out");
        self.listener.notify(BeaconEvent::SearchState(state));
        self.region_tick();
    }

    /// Forget the notified region so the next tick re-detects it.
    pub fn reset(&mut self) {
        self.region.reset();
    }

    /// Filter applies to frames received after this call.
    pub fn set_uuid_filter(&mut self, uuid: Option<BeaconUuid>) {
        self.parser.set_uuid_filter(uuid);
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Beacons found in the current (or last) session, nearest first.
    pub fn discovered(&self) -> Vec<BeaconRecord> {
        self.registry.sorted_by_proximity()
    }

    pub fn registry(&self) -> &BeaconRegistry {
        &self.registry
    }

    pub fn region_state(&self) -> RegionState {
        self.region.state()
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    fn rearm_timer(&mut self) {
        self.timer.cancel();
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        self.armed = Some(token);
        self.timer.arm(token, self.scanning_period);
    }

    fn region_tick(&mut self) {
        for event in self.region.tick(self.registry.nearest()) {
            self.listener.notify(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
