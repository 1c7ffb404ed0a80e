//! Async beacon engine: one actor task owning the scan session.
//!
//! Caller commands, radio frames and timer firings all go through the same
//! unbounded queue and are processed one at a time, so the registry, the
//! region tracker and the session state are only ever touched from the actor.
//! Timer re-arming is cancel-then-spawn inside the actor; a firing that was
//! already queued when it got cancelled carries an old token and the session
//! drops it.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use beacon_core::session::{BeaconListener, InactivityTimer, ScanSession, SessionConfig, TimerToken};
use beacon_core::types::{Advertisement, BeaconError, BeaconRecord, BeaconUuid, Result};

use crate::radio::{FrameSink, RadioScanner, ScannerRadio};

/// Everything the actor can be asked to do.
#[derive(Debug)]
pub(crate) enum Command {
    Start,
    Stop,
    Reset,
    SetUuidFilter(Option<BeaconUuid>),
    Discovered(oneshot::Sender<Vec<BeaconRecord>>),
    IsScanning(oneshot::Sender<bool>),
    Frame(Advertisement),
    TimerExpired(TimerToken),
    Shutdown,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Inactivity timer on the tokio clock. Expiry is posted back to the actor
/// through a weak sender, so a pending timer does not keep the actor alive.
pub(crate) struct TokioTimer {
    tx: mpsc::WeakUnboundedSender<Command>,
    pending: Option<JoinHandle<()>>,
}

impl TokioTimer {
    pub(crate) fn new(tx: &mpsc::UnboundedSender<Command>) -> Self {
        TokioTimer {
            tx: tx.downgrade(),
            pending: None,
        }
    }
}

impl InactivityTimer for TokioTimer {
    fn arm(&mut self, token: TimerToken, period: Duration) {
        self.cancel();
        let tx = self.tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(period).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::TimerExpired(token));
            }
        }));
    }

    fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ---------------------------------------------------------------------------
// Engine handle
// ---------------------------------------------------------------------------

/// Handle to a running engine.
///
/// `start`, `stop`, `reset` and `set_uuid_filter` are fire-and-forget; the
/// queries wait for the actor to reach them, which also means every event
/// caused by earlier commands has been delivered by the time they return.
///
/// Dropping the handle ends the actor the same way as [`shutdown`](Self::shutdown),
/// without waiting for it.
pub struct BeaconEngine {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl BeaconEngine {
    /// Spawn the actor on the current tokio runtime.
    pub fn spawn<S, L>(config: SessionConfig, scanner: S, listener: L) -> Self
    where
        S: RadioScanner,
        L: BeaconListener + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let radio = ScannerRadio::new(scanner, FrameSink::new(&tx));
        let timer = TokioTimer::new(&tx);
        let session = ScanSession::new(config, radio, timer, listener);
        let task = tokio::spawn(run(session, rx));
        BeaconEngine { tx, task }
    }

    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Forget the current region so it is re-detected at the next session end.
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    pub fn set_uuid_filter(&self, uuid: Option<BeaconUuid>) -> Result<()> {
        self.send(Command::SetUuidFilter(uuid))
    }

    pub async fn is_scanning(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::IsScanning(reply))?;
        rx.await.map_err(|_| BeaconError::EngineClosed)
    }

    /// Beacons of the current (or last) session, nearest first.
    pub async fn discovered(&self) -> Result<Vec<BeaconRecord>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Discovered(reply))?;
        rx.await.map_err(|_| BeaconError::EngineClosed)
    }

    /// Stop any running session and wait for the actor to exit.
    pub async fn shutdown(self) {
        let _ = self.tx.send(Command::Shutdown);
        let _ = self.task.await;
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| BeaconError::EngineClosed)
    }
}

async fn run<S, L>(
    mut session: ScanSession<ScannerRadio<S>, TokioTimer, L>,
    mut rx: mpsc::UnboundedReceiver<Command>,
) where
    S: RadioScanner,
    L: BeaconListener,
{
    while let Some(command) = rx.recv().await {
        match command {
            Command::Start => session.start(),
            Command::Stop => session.stop(),
            Command::Reset => session.reset(),
            Command::SetUuidFilter(uuid) => session.set_uuid_filter(uuid),
            Command::Discovered(reply) => {
                let _ = reply.send(session.discovered());
            }
            Command::IsScanning(reply) => {
                let _ = reply.send(session.is_scanning());
            }
            Command::Frame(advertisement) => session.handle_advertisement(&advertisement),
            Command::TimerExpired(token) => session.handle_timer_expired(token),
            Command::Shutdown => break,
        }
    }
    // Shutdown requested or every handle dropped
    session.stop();
    info!("beacon engine stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use beacon_core::frame::encode_frame;
    use beacon_core::types::{BeaconEvent, SearchState};
    use beacon_feeder::capture::parse_capture;
    use tokio::time::Instant;

    use crate::listener::ChannelListener;
    use crate::radio::ReplayScanner;

    const PERIOD: Duration = Duration::from_secs(10);

    /// Scanner whose frames are pushed by the test.
    #[derive(Clone, Default)]
    struct ManualScanner {
        sink: Arc<Mutex<Option<FrameSink>>>,
        fail_with: Option<i32>,
    }

    impl ManualScanner {
        fn deliver(&self, advertisement: Advertisement) {
            let sink = self.sink.lock().unwrap();
            assert!(sink.as_ref().expect("scanner started").deliver(advertisement));
        }

        fn is_running(&self) -> bool {
            self.sink.lock().unwrap().is_some()
        }
    }

    impl RadioScanner for ManualScanner {
        fn start(&mut self, sink: FrameSink) -> Result<()> {
            if let Some(code) = self.fail_with {
                return Err(BeaconError::Radio { code });
            }
            *self.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn stop(&mut self) {
            self.sink.lock().unwrap().take();
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            scanning_period: PERIOD,
            ..SessionConfig::default()
        }
    }

    fn advert(id: u8, mac: &str, rssi: i16) -> Advertisement {
        let mut uuid = [0u8; 16];
        uuid[15] = id;
        Advertisement {
            data: encode_frame(&uuid, u16::from(id), u16::from(id), -59),
            rssi,
            device_name: None,
            mac_address: mac.into(),
        }
    }

    fn spawn(scanner: ManualScanner) -> (BeaconEngine, mpsc::UnboundedReceiver<BeaconEvent>) {
        let (listener, events) = ChannelListener::new();
        (BeaconEngine::spawn(config(), scanner, listener), events)
    }

    async fn next(events: &mut mpsc::UnboundedReceiver<BeaconEvent>) -> BeaconEvent {
        events.recv().await.expect("engine alive")
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_session_ends_empty() {
        let scanner = ManualScanner::default();
        let (engine, mut events) = spawn(scanner.clone());

        engine.start().unwrap();
        assert_eq!(
            next(&mut events).await,
            BeaconEvent::SearchState(SearchState::Started)
        );
        assert!(scanner.is_running());

        let begun = Instant::now();
        assert_eq!(
            next(&mut events).await,
            BeaconEvent::SearchState(SearchState::EndEmpty)
        );
        assert!(begun.elapsed() >= PERIOD);

        assert!(!engine.is_scanning().await.unwrap());
        assert!(!scanner.is_running());
        assert!(events.try_recv().is_err(), "no region events expected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_beacon_session() {
        let scanner = ManualScanner::default();
        let (engine, mut events) = spawn(scanner.clone());

        engine.start().unwrap();
        next(&mut events).await;
        scanner.deliver(advert(1, "AA:01", -60));

        assert!(matches!(next(&mut events).await, BeaconEvent::BeaconFound(_)));
        assert_eq!(
            next(&mut events).await,
            BeaconEvent::SearchState(SearchState::EndSuccess)
        );
        let BeaconEvent::EnterRegion(entered) = next(&mut events).await else {
            panic!("expected enter region");
        };
        assert_eq!(entered.mac_address, "AA:01");
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_extends_session() {
        let scanner = ManualScanner::default();
        let (engine, mut events) = spawn(scanner.clone());
        let begun = Instant::now();

        engine.start().unwrap();
        next(&mut events).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        scanner.deliver(advert(1, "AA:01", -60));
        assert!(matches!(next(&mut events).await, BeaconEvent::BeaconFound(_)));

        // Past the original deadline, still scanning
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(engine.is_scanning().await.unwrap());

        // Repeated frames from a known beacon don't extend it further
        scanner.deliver(advert(1, "AA:01", -55));

        assert_eq!(
            next(&mut events).await,
            BeaconEvent::SearchState(SearchState::EndSuccess)
        );
        let elapsed = begun.elapsed();
        assert!(elapsed >= Duration::from_secs(16));
        assert!(elapsed < Duration::from_secs(17));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop_reports_success() {
        let scanner = ManualScanner::default();
        let (engine, mut events) = spawn(scanner.clone());

        engine.start().unwrap();
        next(&mut events).await;
        engine.stop().unwrap();

        // Known quirk: explicit stop is a successful end even with no beacons
        assert_eq!(
            next(&mut events).await,
            BeaconEvent::SearchState(SearchState::EndSuccess)
        );
        assert!(!engine.is_scanning().await.unwrap());
        assert!(!scanner.is_running());

        // The cancelled timer never fires
        tokio::time::sleep(PERIOD * 2).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_radio_failure_reported() {
        let scanner = ManualScanner {
            fail_with: Some(133),
            ..ManualScanner::default()
        };
        let (engine, mut events) = spawn(scanner);

        engine.start().unwrap();
        assert_eq!(next(&mut events).await, BeaconEvent::OperationError(133));
        assert!(!engine.is_scanning().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovered_ordered_by_proximity() {
        let scanner = ManualScanner::default();
        let (engine, mut events) = spawn(scanner.clone());

        engine.start().unwrap();
        next(&mut events).await;
        scanner.deliver(advert(3, "CC:03", -80));
        scanner.deliver(advert(1, "AA:01", -55));
        scanner.deliver(advert(2, "BB:02", -65));

        let majors: Vec<u16> = engine
            .discovered()
            .await
            .unwrap()
            .iter()
            .map(|r| r.major)
            .collect();
        assert_eq!(majors, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_and_filter_commands() {
        let scanner = ManualScanner::default();
        let (engine, mut events) = spawn(scanner.clone());

        engine.start().unwrap();
        next(&mut events).await;
        scanner.deliver(advert(1, "AA:01", -60));
        engine.stop().unwrap();
        while !matches!(next(&mut events).await, BeaconEvent::EnterRegion(_)) {}

        // Filter out beacon 1, reset the region: next session exits nothing
        // and enters nothing.
        engine.reset().unwrap();
        let mut only = [0u8; 16];
        only[15] = 2;
        engine.set_uuid_filter(Some(only)).unwrap();
        engine.start().unwrap();
        next(&mut events).await;
        scanner.deliver(advert(1, "AA:01", -60));
        engine.stop().unwrap();

        assert_eq!(
            next(&mut events).await,
            BeaconEvent::SearchState(SearchState::EndSuccess)
        );
        assert!(engine.discovered().await.unwrap().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_capture_end_to_end() {
        let capture = "\
0   AA:00:00:00:00:01 -75 - 0201061AFF4C000215000000000000000000000000000000010001000AC5
500 AA:00:00:00:00:02 -58 - 0201061AFF4C000215000000000000000000000000000000020002000AC5
900 AA:00:00:00:00:01 -74 - 0201061AFF4C000215000000000000000000000000000000010001000AC5
";
        let (listener, mut events) = ChannelListener::new();
        let engine = BeaconEngine::spawn(config(), ReplayScanner::new(parse_capture(capture)), listener);

        engine.start().unwrap();
        let mut received = Vec::new();
        loop {
            let event = next(&mut events).await;
            let done = matches!(event, BeaconEvent::EnterRegion(_));
            received.push(event);
            if done {
                break;
            }
        }

        let kinds: Vec<&str> = received.iter().map(BeaconEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "search_state",
                "beacon_found",
                "beacon_found",
                "search_state",
                "enter_region"
            ]
        );
        assert_eq!(received[4].beacon().unwrap().major, 2);
        assert_eq!(engine.discovered().await.unwrap().len(), 2);

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_handle() {
        let (engine, _events) = spawn(ManualScanner::default());
        let tx = engine.tx.clone();
        engine.shutdown().await;
        assert!(tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_ends_actor() {
        let scanner = ManualScanner::default();
        let (engine, mut events) = spawn(scanner.clone());

        engine.start().unwrap();
        next(&mut events).await;
        drop(engine);

        // Running session is closed out, then the listener goes away with the actor
        let ended = tokio::time::timeout(Duration::from_secs(1), events.recv()).await;
        assert_eq!(
            ended.unwrap(),
            Some(BeaconEvent::SearchState(SearchState::EndSuccess))
        );
        let closed = tokio::time::timeout(Duration::from_secs(1), events.recv()).await;
        assert_eq!(closed.unwrap(), None);
        assert!(!scanner.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_idle_handle_ends_actor() {
        let (engine, mut events) = spawn(ManualScanner::default());
        drop(engine);

        let closed = tokio::time::timeout(Duration::from_secs(3600), events.recv()).await;
        assert_eq!(closed.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_cancel_and_rearm() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TokioTimer::new(&tx);

        timer.arm(TimerToken(0), Duration::from_secs(1));
        timer.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());

        timer.arm(TimerToken(1), Duration::from_secs(1));
        timer.arm(TimerToken(2), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(rx.try_recv(), Ok(Command::TimerExpired(TimerToken(2)))));
        assert!(rx.try_recv().is_err());
    }
}
