//! beacon-core: Pure decode + tracking library for proximity beacons.
//!
//! No async and no radio I/O. Frame parsing, distance estimation, the
//! proximity-ordered registry, region transitions and the scan session state
//! machine; the only file access is the config file. `beacon-receiver`
//! drives the session from a tokio runtime, `beacon-feeder` uses the parser
//! and registry offline.

pub mod config;
pub mod distance;
pub mod frame;
pub mod region;
pub mod registry;
pub mod session;
pub mod types;
pub mod vendor;

// Re-export commonly used types at crate root
pub use distance::estimate;
pub use frame::FrameParser;
pub use region::{RegionState, RegionTracker};
pub use registry::{BeaconRegistry, UpsertOutcome};
pub use session::{
    BeaconListener, EventLog, InactivityTimer, Radio, ScanSession, SessionConfig, TimerToken,
};
pub use types::*;
pub use vendor::{VendorDecoder, VendorInfo};
