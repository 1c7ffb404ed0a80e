//! beacon-receiver: run scan sessions over a radio source and report region
//! changes.
//!
//! The radio source is a recorded capture replayed with its original timing.

use std::path::PathBuf;

use clap::Parser;
use comfy_table::{Cell, Table};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use beacon_core::config::{load_config, save_config, Config};
use beacon_core::types::{uuid_from_hex, BeaconEvent, BeaconRecord, Result, SearchState};
use beacon_feeder::capture::CaptureReader;
use beacon_receiver::{BeaconEngine, ChannelListener, Fanout, LogListener, ReplayScanner, WebhookListener};

#[derive(Parser)]
#[command(
    name = "beacon-receiver",
    version,
    about = "Proximity beacon scanner with region tracking"
)]
struct Cli {
    /// Capture file to replay as the radio source
    #[arg(long, env = "BEACON_CAPTURE", required_unless_present = "save_config")]
    capture: Option<PathBuf>,

    /// Inactivity timeout in milliseconds (overrides config)
    #[arg(long)]
    period_ms: Option<u64>,

    /// Only accept beacons with this UUID (hex, dashes optional)
    #[arg(long)]
    uuid: Option<String>,

    /// POST region changes and discoveries to this URL (overrides config)
    #[arg(long, env = "BEACON_WEBHOOK")]
    webhook: Option<String>,

    /// Number of consecutive scan sessions
    #[arg(long, default_value = "1")]
    sessions: u32,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Write the effective settings to the config file and exit
    #[arg(long)]
    save_config: bool,
}

/// One line of `--json` output.
#[derive(Serialize)]
struct EventLine<'a> {
    session: u32,
    #[serde(flatten)]
    event: &'a BeaconEvent,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = match merge_config(load_config(), &cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if cli.save_config {
        match save_config(&config) {
            Ok(path) => println!("Saved config to {}", path.display()),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    // clap guarantees a capture unless --save-config was given
    let Some(capture) = cli.capture.as_ref() else {
        return;
    };
    let path_str = capture.display().to_string();
    let records = match CaptureReader::new(&path_str).read_all() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    info!(file = %path_str, records = records.len(), "capture loaded");

    let (channel, mut events) = ChannelListener::new();
    let mut listener = Fanout::new().with(LogListener).with(channel);
    if let Some(url) = config.webhook.as_deref() {
        info!(url = %url, "webhook enabled");
        listener = listener.with(WebhookListener::new(url));
    }

    let engine = BeaconEngine::spawn(config.session_config(), ReplayScanner::new(records), listener);

    let mut failed = false;
    for session in 1..=cli.sessions {
        match run_session(&engine, &mut events, session, cli.json).await {
            SessionEnd::Finished => {}
            SessionEnd::Interrupted => break,
            SessionEnd::Failed => {
                failed = true;
                break;
            }
        }
    }

    let discovered = engine.discovered().await.unwrap_or_default();
    engine.shutdown().await;

    if failed {
        std::process::exit(1);
    }
    if !cli.json {
        print_summary(&discovered);
    }
}

/// Config file values with command-line overrides applied.
fn merge_config(mut config: Config, cli: &Cli) -> Result<Config> {
    if let Some(ms) = cli.period_ms {
        config.scan.period_ms = ms;
    }
    if let Some(hex) = cli.uuid.as_deref() {
        config.scan.uuid = Some(uuid_from_hex(hex)?);
    }
    if let Some(url) = &cli.webhook {
        config.webhook = Some(url.clone());
    }
    Ok(config)
}

enum SessionEnd {
    Finished,
    Interrupted,
    Failed,
}

async fn run_session(
    engine: &BeaconEngine,
    events: &mut mpsc::UnboundedReceiver<BeaconEvent>,
    session: u32,
    json: bool,
) -> SessionEnd {
    if engine.start().is_err() {
        return SessionEnd::Failed;
    }

    let mut interrupted = false;
    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Some(event) => event,
                None => return SessionEnd::Failed,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                info!("interrupted, stopping scan");
                interrupted = true;
                let _ = engine.stop();
                continue;
            }
        };

        print_event(session, &event, json);

        match event {
            BeaconEvent::OperationError(code) => {
                warn!(code, "radio unavailable");
                return SessionEnd::Failed;
            }
            BeaconEvent::SearchState(SearchState::EndEmpty | SearchState::EndSuccess) => {
                // Region events are emitted in the same step as the end state;
                // the query returns once that step is complete.
                let _ = engine.is_scanning().await;
                while let Ok(event) = events.try_recv() {
                    print_event(session, &event, json);
                }
                break;
            }
            _ => {}
        }
    }

    if interrupted {
        SessionEnd::Interrupted
    } else {
        SessionEnd::Finished
    }
}

fn print_event(session: u32, event: &BeaconEvent, json: bool) {
    if json {
        match serde_json::to_string(&EventLine { session, event }) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "event not serializable"),
        }
        return;
    }

    match event {
        BeaconEvent::EnterRegion(b) => println!("[{session}] ENTER  {b} mac={}", b.mac_address),
        BeaconEvent::ExitRegion(b) => println!("[{session}] EXIT   {b} mac={}", b.mac_address),
        BeaconEvent::BeaconFound(b) => println!(
            "[{session}] FOUND  {b} mac={} rssi={}",
            b.mac_address, b.measured_signal
        ),
        BeaconEvent::SearchState(state) => println!("[{session}] STATE  {state} ({})", state.code()),
        BeaconEvent::OperationError(code) => println!("[{session}] ERROR  radio status {code}"),
    }
}

fn print_summary(discovered: &[BeaconRecord]) {
    println!();
    println!("Beacons in last session: {}", discovered.len());
    println!();

    if discovered.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "UUID", "Major", "Minor", "MAC", "RSSI", "Dist (m)"]);
    for (rank, b) in discovered.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(b.uuid_dashed()),
            Cell::new(b.major),
            Cell::new(b.minor),
            Cell::new(&b.mac_address),
            Cell::new(b.measured_signal),
            Cell::new(format!("{:.2}", b.estimated_distance)),
        ]);
    }
    println!("{table}");
}
