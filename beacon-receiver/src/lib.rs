//! beacon-receiver: async runtime around the beacon scan session.
//!
//! [`BeaconEngine`] runs a [`beacon_core::ScanSession`] on a single tokio
//! actor. Radios plug in through [`RadioScanner`]; events go out through any
//! [`beacon_core::BeaconListener`], including the ones in [`listener`].

pub mod engine;
pub mod listener;
pub mod radio;

pub use engine::BeaconEngine;
pub use listener::{ChannelListener, Fanout, LogListener, WebhookListener};
pub use radio::{FrameSink, RadioScanner, ReplayScanner};
