//! beacon-feeder: recorded advertisement captures.
//!
//! Shared by the `beacon-feeder` CLI and `beacon-receiver`'s replay scanner.

pub mod capture;

pub use capture::{parse_capture, parse_capture_line, CaptureReader, CaptureRecord};
