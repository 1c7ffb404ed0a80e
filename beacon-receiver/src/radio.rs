//! Radio capability and the capture-replay implementation.
//!
//! The engine never talks to an adapter directly. A [`RadioScanner`] is
//! handed a [`FrameSink`] on start and pushes every received advertisement
//! into it; the sink feeds the engine's single event queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use beacon_core::session::Radio;
use beacon_core::types::{Advertisement, BeaconError, Result};
use beacon_feeder::capture::CaptureRecord;

use crate::engine::Command;

/// Entry point for received advertisements.
///
/// Holds a weak sender: a running scanner does not keep the engine alive.
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: mpsc::WeakUnboundedSender<Command>,
}

impl FrameSink {
    pub(crate) fn new(tx: &mpsc::UnboundedSender<Command>) -> Self {
        FrameSink { tx: tx.downgrade() }
    }

    /// Queue an advertisement. Returns false once the engine is gone.
    pub fn deliver(&self, advertisement: Advertisement) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.send(Command::Frame(advertisement)).is_ok(),
            None => false,
        }
    }
}

/// A scanning facility the engine can start and stop.
///
/// `start` must not block; frames arrive later through the sink. Failures
/// carry the platform status in [`BeaconError::Radio`].
pub trait RadioScanner: Send + 'static {
    fn start(&mut self, sink: FrameSink) -> Result<()>;

    fn stop(&mut self);
}

/// Adapts a [`RadioScanner`] to the session's [`Radio`] capability.
pub(crate) struct ScannerRadio<S> {
    scanner: S,
    sink: FrameSink,
}

impl<S: RadioScanner> ScannerRadio<S> {
    pub(crate) fn new(scanner: S, sink: FrameSink) -> Self {
        ScannerRadio { scanner, sink }
    }
}

impl<S: RadioScanner> Radio for ScannerRadio<S> {
    fn start(&mut self) -> Result<()> {
        self.scanner.start(self.sink.clone())
    }

    fn stop(&mut self) {
        self.scanner.stop();
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// Replays a recorded capture with its original timing.
///
/// Every start replays from the beginning of the capture, measured from the
/// moment of the start request.
pub struct ReplayScanner {
    records: Arc<Vec<CaptureRecord>>,
    task: Option<JoinHandle<()>>,
    unavailable: Option<i32>,
}

impl ReplayScanner {
    pub fn new(records: Vec<CaptureRecord>) -> Self {
        ReplayScanner {
            records: Arc::new(records),
            task: None,
            unavailable: None,
        }
    }

    /// A scanner whose adapter refuses to start with `code`.
    pub fn unavailable(code: i32) -> Self {
        ReplayScanner {
            records: Arc::new(Vec::new()),
            task: None,
            unavailable: Some(code),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl RadioScanner for ReplayScanner {
    fn start(&mut self, sink: FrameSink) -> Result<()> {
        if let Some(code) = self.unavailable {
            return Err(BeaconError::Radio { code });
        }
        self.stop();

        let records = Arc::clone(&self.records);
        info!(records = records.len(), "replaying capture");
        self.task = Some(tokio::spawn(async move {
            let t0 = Instant::now();
            for record in records.iter() {
                tokio::time::sleep_until(t0 + Duration::from_millis(record.offset_ms)).await;
                if !sink.deliver(record.advertisement.clone()) {
                    debug!("engine gone, ending replay");
                    break;
                }
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ReplayScanner {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
