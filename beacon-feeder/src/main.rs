//! beacon-feeder: offline tooling for recorded beacon advertisements.
//!
//! Supports:
//! - Parsing a capture file and printing the proximity table
//! - Encoding a synthetic advertisement as a capture line

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing::info;
use tracing_subscriber::EnvFilter;

use beacon_core::config::load_config;
use beacon_core::frame::{encode_frame, FrameParser};
use beacon_core::registry::{BeaconRegistry, UpsertOutcome};
use beacon_core::types::{uuid_from_hex, Advertisement, BeaconRecord};
use beacon_core::vendor::VendorDecoder;
use beacon_feeder::capture::{format_capture_line, CaptureReader, CaptureRecord};

#[derive(Parser)]
#[command(
    name = "beacon-feeder",
    version,
    about = "Proximity beacon capture tooling"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a capture file and print discovered beacons by proximity
    Parse {
        /// Path to capture file (one advertisement per line)
        file: PathBuf,

        /// Only accept beacons with this UUID (hex, dashes optional)
        #[arg(long)]
        uuid: Option<String>,

        /// Device name prefix identifying vendor beacons
        #[arg(long)]
        vendor_prefix: Option<String>,

        /// Print every accepted frame instead of the summary table
        #[arg(short, long)]
        raw: bool,
    },

    /// Print a capture line for a synthetic beacon advertisement
    Encode {
        #[arg(long)]
        uuid: String,
        #[arg(long)]
        major: u16,
        #[arg(long)]
        minor: u16,
        /// Reference power (RSSI at 1 m)
        #[arg(long, default_value = "-59", allow_hyphen_values = true)]
        power: i8,
        #[arg(long, default_value = "00:00:00:00:00:01")]
        mac: String,
        #[arg(long, default_value = "-65", allow_hyphen_values = true)]
        rssi: i16,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "0")]
        offset_ms: u64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            file,
            uuid,
            vendor_prefix,
            raw,
        } => cmd_parse(file, uuid, vendor_prefix, raw),
        Commands::Encode {
            uuid,
            major,
            minor,
            power,
            mac,
            rssi,
            name,
            offset_ms,
        } => cmd_encode(&uuid, major, minor, power, mac, rssi, name, offset_ms),
    }
}

fn cmd_parse(file: PathBuf, uuid: Option<String>, vendor_prefix: Option<String>, raw: bool) {
    let config = load_config();

    let uuid_filter = match uuid.as_deref().map(uuid_from_hex) {
        Some(Ok(u)) => Some(u),
        Some(Err(e)) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        None => config.scan.uuid,
    };
    let parser = FrameParser::new(uuid_filter);
    let vendor = VendorDecoder::new(vendor_prefix.unwrap_or(config.vendor.prefix));

    let path_str = file.display().to_string();
    let records = match CaptureReader::new(&path_str).read_all() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    info!(file = %path_str, records = records.len(), "capture loaded");

    let mut registry = BeaconRegistry::new();
    let mut accepted = 0u64;

    for record in &records {
        let Some(beacon) = decode(&parser, &vendor, &record.advertisement) else {
            continue;
        };
        accepted += 1;

        if raw {
            println!(
                "{:>8} {} {} rssi={}",
                record.offset_ms, record.advertisement.mac_address, beacon, record.advertisement.rssi
            );
        }

        if let UpsertOutcome::Discovered(found) = registry.upsert(beacon, record.advertisement.rssi) {
            info!(beacon = %found, "beacon found");
        }
    }

    if !raw {
        print_summary(&registry, records.len(), accepted);
    }
}

/// Parse the payload and attach transport fields, as a scan session would.
fn decode(parser: &FrameParser, vendor: &VendorDecoder, adv: &Advertisement) -> Option<BeaconRecord> {
    let mut beacon = parser.parse(&adv.data)?;
    beacon.mac_address.clone_from(&adv.mac_address);
    if let Some(info) = vendor.decode(adv.device_name.as_deref(), &adv.data) {
        info.apply(&mut beacon);
    }
    Some(beacon)
}

fn print_summary(registry: &BeaconRegistry, total: usize, accepted: u64) {
    println!();
    println!(
        "Advertisements: {total} read, {accepted} beacon frames, {} beacons",
        registry.len()
    );
    println!();

    if registry.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "#", "UUID", "Major", "Minor", "MAC", "Tx", "RSSI", "Dist (m)", "Vendor", "Conn",
    ]);

    for (rank, b) in registry.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(b.uuid_dashed()),
            Cell::new(b.major),
            Cell::new(b.minor),
            Cell::new(&b.mac_address),
            Cell::new(b.reference_power),
            Cell::new(b.measured_signal),
            Cell::new(format!("{:.2}", b.estimated_distance)),
            Cell::new(match (b.vendor_flag, b.vendor_model, b.vendor_version) {
                (true, Some(m), Some(v)) => format!("m{m} v{v}"),
                _ => "-".into(),
            }),
            Cell::new(if b.connectable { "yes" } else { "no" }),
        ]);
    }

    println!("{table}");
}

#[allow(clippy::too_many_arguments)]
fn cmd_encode(
    uuid: &str,
    major: u16,
    minor: u16,
    power: i8,
    mac: String,
    rssi: i16,
    name: Option<String>,
    offset_ms: u64,
) {
    let uuid = match uuid_from_hex(uuid) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let record = CaptureRecord {
        offset_ms,
        advertisement: Advertisement {
            data: encode_frame(&uuid, major, minor, power),
            rssi,
            device_name: name,
            mac_address: mac.to_ascii_uppercase(),
        },
    };
    println!("{}", format_capture_line(&record));
}
