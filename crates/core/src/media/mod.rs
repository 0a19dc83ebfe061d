//! RTP parsing and H.264 depacketization.
//!
//! ## RTP overview (RFC 3550)
//!
//! Each encoded video frame arrives as one or more RTP packets. Every packet
//! carries a 12-byte fixed header ([`rtp::RtpHeader`]) containing:
//!
//! - **Sequence number** (16-bit, wrapping): used here only to check FU-A
//!   continuity; there is no reordering.
//! - **Timestamp** (32-bit): media clock, 90 kHz for video.
//! - **SSRC** (32-bit): a single source is assumed.
//! - **Marker bit**: set on the last packet of an access unit (frame).
//!
//! ## H.264 payload format (RFC 6184)
//!
//! | Type | Name | Handling |
//! |------|------|----------|
//! | 1–23 | Single NAL unit (§5.6) | emitted as-is |
//! | 24 | STAP-A (§5.7.1) | split into its NAL units |
//! | 28 | FU-A (§5.8) | reassembled across packets |
//! | other | STAP-B, MTAP, FU-B, reserved | ignored |
//!
//! Every emitted NAL unit is prefixed with the Annex B start code so the
//! output can be fed to a decoder as a byte stream.

pub mod h264;
pub mod rtp;

/// Annex B start code prepended to every emitted NAL unit.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// A complete H.264 NAL unit in Annex B form.
///
/// ```text
/// [00 00 00 01][NAL header][payload ...]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit(Vec<u8>);

impl NalUnit {
    /// Wrap a raw NAL unit (header byte + payload) with the start code.
    pub fn from_raw(nal: &[u8]) -> Self {
        let mut data = Vec::with_capacity(START_CODE.len() + nal.len());
        data.extend_from_slice(&START_CODE);
        data.extend_from_slice(nal);
        NalUnit(data)
    }

    /// The full Annex B bytes, start code included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The NAL unit without its start code.
    pub fn raw(&self) -> &[u8] {
        &self.0[START_CODE.len()..]
    }

    /// `nal_unit_type` from the header byte (ITU-T H.264 §7.3.1).
    pub fn nal_type(&self) -> u8 {
        self.raw().first().map_or(0, |h| h & 0x1f)
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}
