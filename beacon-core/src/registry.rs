//! Deduplicated, proximity-ordered beacon storage for one scan session.
//!
//! Pure state: call `upsert()` per decoded frame and act on the returned
//! `UpsertOutcome`. The caller decides what a discovery means (listener
//! event, timer re-arm, table row).
//!
//! A beacon's distance only ever improves within a session. Later, noisier
//! samples never push it back out, which keeps the ordering from thrashing.

use tracing::debug;

use crate::distance::estimate;
use crate::types::{BeaconIdentity, BeaconRecord};

/// What an upsert did to the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// First frame from this identity; carries the stored record.
    Discovered(BeaconRecord),
    /// Known identity moved closer.
    Improved { distance: f64 },
    /// Known identity, no better than before.
    Unchanged,
}

impl UpsertOutcome {
    pub fn is_discovery(&self) -> bool {
        matches!(self, UpsertOutcome::Discovered(_))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    record: BeaconRecord,
}

/// Beacons seen during the current session, nearest first.
#[derive(Debug, Clone, Default)]
pub struct BeaconRegistry {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl BeaconRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly observed beacon or refresh a known one.
    ///
    /// `observed` must already carry its address and any vendor fields; the
    /// vendor fields are only taken on first discovery.
    pub fn upsert(&mut self, mut observed: BeaconRecord, measured_signal: i16) -> UpsertOutcome {
        let distance = estimate(observed.reference_power, f64::from(measured_signal));

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.record.is_identical(&observed))
        {
            entry.record.measured_signal = measured_signal;
            if distance < entry.record.estimated_distance {
                debug!(
                    beacon = %entry.record,
                    distance,
                    "updating distance"
                );
                entry.record.estimated_distance = distance;
                self.sort();
                return UpsertOutcome::Improved { distance };
            }
            return UpsertOutcome::Unchanged;
        }

        observed.measured_signal = measured_signal;
        observed.estimated_distance = distance;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry {
            seq,
            record: observed.clone(),
        });
        self.sort();

        UpsertOutcome::Discovered(observed)
    }

    /// Ascending distance; equal distances keep insertion order.
    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.record
                .estimated_distance
                .total_cmp(&b.record.estimated_distance)
                .then(a.seq.cmp(&b.seq))
        });
    }

    /// Records nearest first.
    pub fn iter(&self) -> impl Iterator<Item = &BeaconRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    /// Snapshot of the records, nearest first.
    pub fn sorted_by_proximity(&self) -> Vec<BeaconRecord> {
        self.iter().cloned().collect()
    }

    pub fn nearest(&self) -> Option<&BeaconRecord> {
        self.entries.first().map(|e| &e.record)
    }

    pub fn get(&self, identity: &BeaconIdentity) -> Option<&BeaconRecord> {
        self.iter().find(|r| {
            r.uuid == identity.uuid
                && r.major == identity.major
                && r.minor == identity.minor
                && r.mac_address == identity.mac_address
        })
    }

    pub fn contains(&self, identity: &BeaconIdentity) -> bool {
        self.get(identity).is_some()
    }

    /// Forget everything. Done at session start only.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
