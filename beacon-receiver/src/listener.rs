//! Event listeners for the engine.
//!
//! Listeners run on the engine actor, so `notify` must return quickly;
//! anything slow is handed off to another task.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::{info, warn};

use beacon_core::session::BeaconListener;
use beacon_core::types::BeaconEvent;

/// Forwards every event into an unbounded channel.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<BeaconEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BeaconEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelListener { tx }, rx)
    }
}

impl BeaconListener for ChannelListener {
    fn notify(&mut self, event: BeaconEvent) {
        // Receiver dropped means nobody is interested any more.
        let _ = self.tx.send(event);
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct LogListener;

impl BeaconListener for LogListener {
    fn notify(&mut self, event: BeaconEvent) {
        match &event {
            BeaconEvent::EnterRegion(b) => info!(beacon = %b, mac = %b.mac_address, "enter region"),
            BeaconEvent::ExitRegion(b) => info!(beacon = %b, mac = %b.mac_address, "exit region"),
            BeaconEvent::BeaconFound(b) => info!(
                beacon = %b,
                mac = %b.mac_address,
                rssi = b.measured_signal,
                "beacon found"
            ),
            BeaconEvent::SearchState(state) => info!(state = %state, code = state.code(), "search state"),
            BeaconEvent::OperationError(code) => warn!(code, "radio operation failed"),
        }
    }
}

/// Posts region changes and discoveries to a webhook as JSON.
///
/// Search state and error events are not forwarded.
#[derive(Clone)]
pub struct WebhookListener {
    url: String,
    client: reqwest::Client,
}

impl WebhookListener {
    pub fn new(url: &str) -> Self {
        WebhookListener {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// JSON body for a webhook delivery, or None for events that aren't posted.
pub fn webhook_payload(event: &BeaconEvent, timestamp: f64) -> Option<serde_json::Value> {
    let beacon = match event {
        BeaconEvent::EnterRegion(b) | BeaconEvent::ExitRegion(b) | BeaconEvent::BeaconFound(b) => b,
        BeaconEvent::SearchState(_) | BeaconEvent::OperationError(_) => return None,
    };
    Some(serde_json::json!({
        "event_type": event.kind(),
        "uuid": beacon.uuid_dashed(),
        "major": beacon.major,
        "minor": beacon.minor,
        "mac_address": beacon.mac_address,
        "distance_m": beacon.estimated_distance,
        "rssi": beacon.measured_signal,
        "timestamp": timestamp,
    }))
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl BeaconListener for WebhookListener {
    /// Fire-and-forget POST; failures are only logged.
    fn notify(&mut self, event: BeaconEvent) {
        let Some(payload) = webhook_payload(&event, now()) else {
            return;
        };

        let client = self.client.clone();
        let url = self.url.clone();

        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&payload).send().await {
                warn!(url = %url, error = %e, "webhook POST failed");
            }
        });
    }
}

/// Delivers each event to several listeners in order.
#[derive(Default)]
pub struct Fanout {
    listeners: Vec<Box<dyn BeaconListener + Send>>,
}

impl Fanout {
    pub fn new() -> Self {
        Fanout::default()
    }

    pub fn with(mut self, listener: impl BeaconListener + Send + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl BeaconListener for Fanout {
    fn notify(&mut self, event: BeaconEvent) {
        if let Some((last, rest)) = self.listeners.split_last_mut() {
            for listener in rest {
                listener.notify(event.clone());
            }
            last.notify(event);
        }
    }
}
