//! Access-unit assembly on top of the RTP parser and H.264 depacketizer.
//!
//! One access unit (frame) spans every packet up to and including the one
//! with the RTP marker bit set (RFC 6184 §5.1). NAL units are appended to a
//! reusable buffer as they complete; on the marker the buffer is handed to
//! the [`DecodeSink`] as a single Annex B byte stream and cleared.
//!
//! A partial access unit older than the loss window is discarded together
//! with any in-progress FU-A series, so a lost marker packet costs one frame
//! rather than stalling delivery.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::DropReason;
use crate::media::START_CODE;
use crate::media::h264::H264Depacketizer;
use crate::media::rtp::RtpPacket;
use crate::receiver::ReceiverConfig;
use crate::sink::DecodeSink;
use crate::stats::ReceiverStats;

/// NAL units of one frame, concatenated in arrival order.
#[derive(Debug)]
pub struct AccessUnit {
    data: Vec<u8>,
    nal_units: usize,
    first_buffered: Option<Instant>,
    last_update: Option<Instant>,
}

impl Default for AccessUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessUnit {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(256 * 1024),
            nal_units: 0,
            first_buffered: None,
            last_update: None,
        }
    }

    /// Append a NAL unit (without start code), prefixing it with one.
    pub fn push_nal(&mut self, nal: &[u8], now: Instant) {
        self.data.extend_from_slice(&START_CODE);
        self.data.extend_from_slice(nal);
        self.nal_units += 1;
        self.first_buffered.get_or_insert(now);
        self.last_update = Some(now);
    }

    pub fn is_empty(&self) -> bool {
        self.nal_units == 0
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn nal_units(&self) -> usize {
        self.nal_units
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn first_buffered(&self) -> Option<Instant> {
        self.first_buffered
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Whether buffering started more than `window` before `now`.
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        self.first_buffered
            .is_some_and(|t| now.saturating_duration_since(t) > window)
    }

    /// Empty the unit, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
        self.nal_units = 0;
        self.first_buffered = None;
        self.last_update = None;
    }
}

/// What [`AccessUnitAssembler::push`] did with a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    /// Accepted; the access unit is still incomplete.
    Buffered,
    /// Completed an access unit of this many bytes, now delivered.
    Delivered(usize),
    /// Payload type did not match the configured one.
    Filtered,
    /// Discarded the datagram or the fragment it continued.
    Dropped(DropReason),
}

/// Drives parsing, depacketization and marker-bit framing for one stream.
///
/// Owns its depacketizer; all state lives here and is touched only by the
/// receive loop.
#[derive(Debug)]
pub struct AccessUnitAssembler {
    depacketizer: H264Depacketizer,
    current: AccessUnit,
    payload_type: u8,
    loss_timeout: Duration,
    min_access_unit_size: usize,
    stats: Arc<ReceiverStats>,
}

impl AccessUnitAssembler {
    pub fn new(config: &ReceiverConfig, stats: Arc<ReceiverStats>) -> Self {
        Self {
            depacketizer: H264Depacketizer::new(),
            current: AccessUnit::new(),
            payload_type: config.payload_type,
            loss_timeout: config.loss_timeout,
            min_access_unit_size: config.min_access_unit_size,
            stats,
        }
    }

    pub fn depacketizer(&self) -> &H264Depacketizer {
        &self.depacketizer
    }

    pub fn current(&self) -> &AccessUnit {
        &self.current
    }

    pub fn stats(&self) -> &Arc<ReceiverStats> {
        &self.stats
    }

    /// Drop the partial access unit and any in-progress fragment.
    pub fn reset(&mut self) {
        self.depacketizer.reset();
        self.current.clear();
    }

    /// Process one received datagram.
    ///
    /// Never fails: malformed packets, payload-type mismatches, sequence
    /// gaps and timeouts are logged, counted and absorbed. A completed
    /// access unit is passed to `sink` before this returns.
    pub fn push<S>(&mut self, datagram: &[u8], now: Instant, sink: &mut S) -> Pushed
    where
        S: DecodeSink + ?Sized,
    {
        self.stats.record_datagram();

        let packet = match RtpPacket::parse(datagram) {
            Ok(p) => p,
            Err(kind) => {
                let reason = DropReason::MalformedPacket(kind);
                tracing::debug!(len = datagram.len(), %reason, "dropping datagram");
                self.stats.record_drop(&reason);
                return Pushed::Dropped(reason);
            }
        };
        let header = &packet.header;

        if header.payload_type != self.payload_type {
            tracing::trace!(
                pt = header.payload_type,
                expected = self.payload_type,
                "payload type mismatch"
            );
            self.stats.record_filtered();
            return Pushed::Filtered;
        }

        self.poll_timeout(now);

        let current = &mut self.current;
        let dropped = self
            .depacketizer
            .depacketize(packet.payload, header.sequence_number, |nal| {
                current.push_nal(nal, now)
            });
        if let Some(reason) = &dropped {
            self.stats.record_drop(reason);
        }

        tracing::trace!(
            seq = header.sequence_number,
            ts = header.timestamp,
            marker = header.marker,
            payload = packet.payload.len(),
            buffered = self.current.len(),
            "rtp packet"
        );

        if header.marker {
            if let Some(sent_us) = header
                .extension
                .as_ref()
                .and_then(|ext| ext.sender_timestamp_us)
            {
                self.note_sender_latency(sent_us);
            }
            if !self.current.is_empty() {
                return Pushed::Delivered(self.deliver(header.timestamp, sink));
            }
        }

        match dropped {
            Some(reason) => Pushed::Dropped(reason),
            None => Pushed::Buffered,
        }
    }

    /// Discard the partial access unit if it has outlived the loss window.
    ///
    /// Called for every accepted datagram and also from the receive loop
    /// when a read times out, so a stream that stops mid-frame does not
    /// hold stale data until the next packet arrives.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        if !self.current.is_expired(now, self.loss_timeout) {
            return false;
        }
        let reason = DropReason::AccessUnitTimeout;
        tracing::debug!(
            nal_units = self.current.nal_units(),
            bytes = self.current.len(),
            window_ms = self.loss_timeout.as_millis() as u64,
            "no marker within loss window, discarding access unit"
        );
        self.stats.record_drop(&reason);
        self.reset();
        true
    }

    fn deliver<S>(&mut self, rtp_timestamp: u32, sink: &mut S) -> usize
    where
        S: DecodeSink + ?Sized,
    {
        let len = self.current.len();
        if len < self.min_access_unit_size {
            tracing::warn!(
                bytes = len,
                nal_units = self.current.nal_units(),
                "suspiciously small access unit"
            );
        }
        tracing::trace!(
            ts = rtp_timestamp,
            bytes = len,
            nal_units = self.current.nal_units(),
            "access unit complete"
        );
        sink.decode_frame(self.current.as_bytes());
        self.stats.record_access_unit(len);
        self.current.clear();
        len
    }

    fn note_sender_latency(&self, sent_us: u64) {
        let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) else {
            return;
        };
        let now_us = now.as_micros() as u64;
        let latency_us = now_us.saturating_sub(sent_us);
        tracing::trace!(latency_us, "sender-to-receiver latency");
        self.stats.record_sender_latency(latency_us);
    }
}
