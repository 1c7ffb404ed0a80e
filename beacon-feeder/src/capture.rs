//! Recorded advertisement captures.
//!
//! One advertisement per line:
//!
//! ```text
//! # offset_ms  mac                rssi  name            payload
//! 0            C4:7C:8D:6A:01:02  -61   easiBeacon_21   0201061AFF4C000215...
//! 350          D0:39:72:11:22:33  -77   -               0201061AFF4C000215...
//! ```
//!
//! `offset_ms` is relative to the start of the recording; `-` means the device
//! advertised no name. Blank lines and `#` comments are skipped, as are lines
//! that don't parse.

use std::fs;

use beacon_core::types::{hex_decode, Advertisement, BeaconError, Result};

/// One recorded advertisement and when it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRecord {
    pub offset_ms: u64,
    pub advertisement: Advertisement,
}

/// Read advertisement captures from a file.
pub struct CaptureReader {
    path: String,
}

impl CaptureReader {
    pub fn new(path: &str) -> Self {
        CaptureReader {
            path: path.to_string(),
        }
    }

    /// Read all records, ordered by arrival offset.
    pub fn read_all(&self) -> Result<Vec<CaptureRecord>> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| BeaconError::Capture(format!("{}: {e}", self.path)))?;
        Ok(parse_capture(&content))
    }
}

/// Parse a whole capture text.
pub fn parse_capture(content: &str) -> Vec<CaptureRecord> {
    let mut records: Vec<CaptureRecord> = content.lines().filter_map(parse_capture_line).collect();
    // Stable, so equal offsets keep file order
    records.sort_by_key(|r| r.offset_ms);
    records
}

/// Parse a single capture line.
pub fn parse_capture_line(line: &str) -> Option<CaptureRecord> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut fields = line.split_whitespace();
    let offset_ms = fields.next()?.parse::<u64>().ok()?;
    let mac_address = fields.next()?.to_ascii_uppercase();
    let rssi = fields.next()?.parse::<i16>().ok()?;
    let device_name = match fields.next()? {
        "-" => None,
        name => Some(name.to_string()),
    };
    let data = hex_decode(fields.next()?)?;
    if fields.next().is_some() {
        return None;
    }

    Some(CaptureRecord {
        offset_ms,
        advertisement: Advertisement {
            data,
            rssi,
            device_name,
            mac_address,
        },
    })
}

/// Format a record back into a capture line.
pub fn format_capture_line(record: &CaptureRecord) -> String {
    let adv = &record.advertisement;
    format!(
        "{} {} {} {} {}",
        record.offset_ms,
        adv.mac_address,
        adv.rssi,
        adv.device_name.as_deref().unwrap_or("-"),
        beacon_core::types::hex_encode(&adv.data)
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
