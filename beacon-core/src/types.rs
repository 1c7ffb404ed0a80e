//! Shared types, error enum, and beacon records for beacon-core.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// All errors produced by beacon-core and the crates built on it.
#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("invalid UUID: expected 16 bytes, got {0}")]
    InvalidUuid(usize),
    #[error("radio operation failed with status {code}")]
    Radio { code: i32 },
    #[error("beacon engine is no longer running")]
    EngineClosed,
    #[error("capture error: {0}")]
    Capture(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

impl BeaconError {
    /// Status code forwarded to listeners in `OperationError`.
    ///
    /// Radio failures carry the platform status untouched; anything else
    /// reaching the listener is reported as `-1`.
    pub fn status_code(&self) -> i32 {
        match self {
            BeaconError::Radio { code } => *code,
            _ => -1,
        }
    }
}

pub type Result<T> = std::result::Result<T, BeaconError>;

// ---------------------------------------------------------------------------
// UUID helpers
// ---------------------------------------------------------------------------

/// 16-byte region UUID as broadcast in the frame.
pub type BeaconUuid = [u8; 16];

/// Format a UUID as 32 uppercase hex characters.
pub fn uuid_to_string(uuid: &BeaconUuid) -> String {
    hex_encode(uuid)
}

/// Format a UUID in the dashed 8-4-4-4-12 form.
pub fn uuid_to_dashed(uuid: &BeaconUuid) -> String {
    let hex = hex_encode(uuid);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    )
}

/// Parse a UUID from hex, with or without dashes.
pub fn uuid_from_hex(hex: &str) -> Result<BeaconUuid> {
    let compact: String = hex.trim().chars().filter(|c| *c != '-').collect();
    let bytes = hex_decode(&compact).ok_or_else(|| BeaconError::InvalidHex(hex.to_string()))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| BeaconError::InvalidUuid(len))
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if !hex.len().is_multiple_of(2) {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let high = hex_digit(chunk[0])?;
        let low = hex_digit(chunk[1])?;
        bytes.push((high << 4) | low);
    }
    Some(bytes)
}

/// Encode bytes as uppercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for &b in data {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    }
    s
}

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Transport envelope
// ---------------------------------------------------------------------------

/// One received advertisement as handed over by the radio.
///
/// The payload bytes come from the frame; signal, name and address come from
/// the radio's own bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub data: Vec<u8>,
    pub rssi: i16,
    pub device_name: Option<String>,
    pub mac_address: String,
}

// ---------------------------------------------------------------------------
// Beacon records
// ---------------------------------------------------------------------------

/// Identity of one physical beacon: region triple plus link-layer address.
///
/// Two devices left at factory defaults share the region triple but never the
/// address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BeaconIdentity {
    pub uuid: BeaconUuid,
    pub major: u16,
    pub minor: u16,
    pub mac_address: String,
}

/// One observed beacon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeaconRecord {
    #[serde(serialize_with = "serialize_uuid")]
    pub uuid: BeaconUuid,
    pub major: u16,
    pub minor: u16,
    pub mac_address: String,
    /// Expected RSSI at 1 meter.
    pub reference_power: i8,
    /// Most recent RSSI sample.
    pub measured_signal: i16,
    /// Best distance seen this session, in meters.
    pub estimated_distance: f64,
    pub vendor_flag: bool,
    pub vendor_version: Option<u8>,
    pub vendor_model: Option<u8>,
    pub connectable: bool,
}

fn serialize_uuid<S: serde::Serializer>(uuid: &BeaconUuid, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&uuid_to_dashed(uuid))
}

impl BeaconRecord {
    /// A bare record as decoded from a frame payload.
    pub fn new(uuid: BeaconUuid, major: u16, minor: u16, reference_power: i8) -> Self {
        BeaconRecord {
            uuid,
            major,
            minor,
            mac_address: String::new(),
            reference_power,
            measured_signal: 0,
            estimated_distance: -1.0,
            vendor_flag: false,
            vendor_version: None,
            vendor_model: None,
            connectable: false,
        }
    }

    pub fn identity(&self) -> BeaconIdentity {
        BeaconIdentity {
            uuid: self.uuid,
            major: self.major,
            minor: self.minor,
            mac_address: self.mac_address.clone(),
        }
    }

    /// Same uuid, major and minor.
    pub fn same_region(&self, other: &BeaconRecord) -> bool {
        self.uuid == other.uuid && self.major == other.major && self.minor == other.minor
    }

    /// Same region and same transmitting device.
    pub fn is_identical(&self, other: &BeaconRecord) -> bool {
        self.same_region(other) && self.mac_address == other.mac_address
    }

    pub fn uuid_hex(&self) -> String {
        uuid_to_string(&self.uuid)
    }

    pub fn uuid_dashed(&self) -> String {
        uuid_to_dashed(&self.uuid)
    }
}

impl fmt::Display for BeaconRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UUID:{} M:{} m:{} p:{:.2}",
            self.uuid_hex(),
            self.major,
            self.minor,
            self.estimated_distance
        )
    }
}

// ---------------------------------------------------------------------------
// Listener events
// ---------------------------------------------------------------------------

/// Scan lifecycle states reported to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchState {
    Started,
    EndEmpty,
    EndSuccess,
}

impl SearchState {
    /// Numeric state code as used by existing listener integrations.
    pub fn code(self) -> i32 {
        match self {
            SearchState::Started => 1,
            SearchState::EndEmpty => 2,
            SearchState::EndSuccess => 3,
        }
    }
}

impl fmt::Display for SearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchState::Started => write!(f, "started"),
            SearchState::EndEmpty => write!(f, "end_empty"),
            SearchState::EndSuccess => write!(f, "end_success"),
        }
    }
}

/// Everything the engine tells its listener.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum BeaconEvent {
    EnterRegion(BeaconRecord),
    ExitRegion(BeaconRecord),
    BeaconFound(BeaconRecord),
    SearchState(SearchState),
    OperationError(i32),
}

impl BeaconEvent {
    /// Short machine-readable name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            BeaconEvent::EnterRegion(_) => "enter_region",
            BeaconEvent::ExitRegion(_) => "exit_region",
            BeaconEvent::BeaconFound(_) => "beacon_found",
            BeaconEvent::SearchState(_) => "search_state",
            BeaconEvent::OperationError(_) => "operation_error",
        }
    }

    /// The beacon carried by the event, if any.
    pub fn beacon(&self) -> Option<&BeaconRecord> {
        match self {
            BeaconEvent::EnterRegion(b) | BeaconEvent::ExitRegion(b) | BeaconEvent::BeaconFound(b) => {
                Some(b)
            }
            BeaconEvent::SearchState(_) | BeaconEvent::OperationError(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
