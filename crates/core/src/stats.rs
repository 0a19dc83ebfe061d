//! Receive-loop counters.
//!
//! Written only by the loop thread; any thread may read a snapshot while
//! the receiver runs.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::DropReason;

#[derive(Debug, Default)]
pub struct ReceiverStats {
    datagrams: AtomicU64,
    malformed: AtomicU64,
    filtered: AtomicU64,
    sequence_discontinuities: AtomicU64,
    timeouts: AtomicU64,
    unsupported: AtomicU64,
    access_units: AtomicU64,
    bytes_delivered: AtomicU64,
    sender_latency_us: AtomicU64,
}

/// Point-in-time copy of [`ReceiverStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub datagrams: u64,
    pub malformed: u64,
    /// Dropped because the payload type did not match.
    pub filtered: u64,
    pub sequence_discontinuities: u64,
    pub timeouts: u64,
    pub unsupported: u64,
    pub access_units: u64,
    pub bytes_delivered: u64,
    /// Receive time minus the sender timestamp extension of the most recent
    /// marked packet that carried one. Zero if none has been seen.
    pub sender_latency_us: u64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_datagram(&self) {
        self.datagrams.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self, reason: &DropReason) {
        let counter = match reason {
            DropReason::MalformedPacket(_) => &self.malformed,
            DropReason::SequenceDiscontinuity { .. } => &self.sequence_discontinuities,
            DropReason::AccessUnitTimeout => &self.timeouts,
            DropReason::UnsupportedNalType(_) => &self.unsupported,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_access_unit(&self, len: usize) {
        self.access_units.fetch_add(1, Ordering::Relaxed);
        self.bytes_delivered
            .fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_sender_latency(&self, latency_us: u64) {
        self.sender_latency_us.store(latency_us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            sequence_discontinuities: self.sequence_discontinuities.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            unsupported: self.unsupported.load(Ordering::Relaxed),
            access_units: self.access_units.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
            sender_latency_us: self.sender_latency_us.load(Ordering::Relaxed),
        }
    }
}
