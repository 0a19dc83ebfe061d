use super::{NalUnit, START_CODE};
use crate::error::DropReason;

const STAP_A: u8 = 24;
const FU_A: u8 = 28;

/// Fragmentation state of an [`H264Depacketizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentState {
    /// No FU-A series in flight.
    Idle,
    /// An FU-A start was seen; continuations must follow `last_sequence`.
    AssemblingFragment { last_sequence: u16 },
}

/// H.264 RTP depacketizer (RFC 6184).
///
/// Turns RTP payloads into complete NAL units, each prefixed with the
/// 4-byte Annex B start code. Three packetization forms are handled:
///
/// - **Single NAL Unit** (§5.6): types 1–23, emitted immediately.
///
/// - **STAP-A** (§5.7.1): type 24, several NAL units in one packet, each
///   preceded by a 16-bit big-endian size:
///
///   ```text
///   [STAP-A hdr][size][NAL 1][size][NAL 2]...
///   ```
///
///   Extraction stops at the first size that runs past the packet; the
///   units before it are still emitted.
///
/// - **FU-A** (§5.8): type 28, one NAL unit split across consecutive
///   packets:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]
///   ```
///
///   The original header is rebuilt as `(indicator & 0xE0) | NAL_Type`.
///   Only one series is tracked; a new start discards an unfinished one.
///   A continuation whose sequence number is not exactly the previous
///   one plus one (mod 2^16) discards the series without emitting it.
///
/// Everything else (STAP-B, MTAP, FU-B, reserved types) is ignored.
///
/// ## State machine
///
/// ```text
/// Idle --FU start--> AssemblingFragment
/// AssemblingFragment --continuation, seq ok--> AssemblingFragment
/// AssemblingFragment --continuation, seq ok, end--> Idle   (emits)
/// AssemblingFragment --continuation, seq gap--> Idle       (drops)
/// AssemblingFragment --FU start--> AssemblingFragment      (restarts)
/// ```
#[derive(Debug)]
pub struct H264Depacketizer {
    state: FragmentState,
    /// Start code + reconstructed header + fragments so far. Capacity is
    /// kept between NAL units.
    fragment: Vec<u8>,
}

impl Default for H264Depacketizer {
    fn default() -> Self {
        Self::new()
    }
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self {
            state: FragmentState::Idle,
            fragment: Vec::with_capacity(64 * 1024),
        }
    }

    pub fn state(&self) -> FragmentState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == FragmentState::Idle
    }

    /// Abandon any in-progress fragment and return to [`FragmentState::Idle`].
    pub fn reset(&mut self) {
        if !self.is_idle() {
            tracing::debug!(
                buffered = self.fragment.len(),
                "depacketizer reset, discarding fragment"
            );
        }
        self.state = FragmentState::Idle;
        self.fragment.clear();
    }

    /// Depacketize one RTP payload into zero or more Annex B NAL units.
    pub fn process(&mut self, payload: &[u8], sequence_number: u16) -> Vec<NalUnit> {
        let mut nal_units = Vec::new();
        self.depacketize(payload, sequence_number, |nal| {
            nal_units.push(NalUnit::from_raw(nal))
        });
        nal_units
    }

    /// Depacketize one RTP payload, calling `emit` with each complete NAL
    /// unit (header byte + payload, without start code) in order.
    ///
    /// Returns why the payload was discarded, if it was. Ignored orphan
    /// continuations and truncated STAP-A records are not reported.
    pub fn depacketize<F>(
        &mut self,
        payload: &[u8],
        sequence_number: u16,
        mut emit: F,
    ) -> Option<DropReason>
    where
        F: FnMut(&[u8]),
    {
        let first = *payload.first()?;
        match first & 0x1f {
            1..=23 => {
                emit(payload);
                None
            }
            STAP_A => {
                Self::split_stap_a(&payload[1..], sequence_number, &mut emit);
                None
            }
            FU_A => self.push_fu_a(payload, sequence_number, &mut emit),
            nal_type => {
                tracing::trace!(nal_type, seq = sequence_number, "unsupported NAL unit type");
                Some(DropReason::UnsupportedNalType(nal_type))
            }
        }
    }

    fn split_stap_a<F: FnMut(&[u8])>(mut data: &[u8], sequence_number: u16, emit: &mut F) {
        while data.len() >= 2 {
            let size = usize::from(u16::from_be_bytes([data[0], data[1]]));
            data = &data[2..];
            if size > data.len() {
                tracing::debug!(
                    size,
                    remaining = data.len(),
                    seq = sequence_number,
                    "STAP-A record overruns packet, stopping"
                );
                return;
            }
            let (nal, rest) = data.split_at(size);
            if !nal.is_empty() {
                emit(nal);
            }
            data = rest;
        }
    }

    fn push_fu_a<F: FnMut(&[u8])>(
        &mut self,
        payload: &[u8],
        sequence_number: u16,
        emit: &mut F,
    ) -> Option<DropReason> {
        if payload.len() < 2 {
            tracing::trace!(seq = sequence_number, "FU-A payload too short");
            return None;
        }
        let indicator = payload[0];
        let fu_header = payload[1];
        let start = fu_header & 0x80 != 0;
        let end = fu_header & 0x40 != 0;
        let nal_type = fu_header & 0x1f;
        let data = &payload[2..];

        if start {
            if let FragmentState::AssemblingFragment { last_sequence } = self.state {
                tracing::debug!(
                    last_sequence,
                    seq = sequence_number,
                    buffered = self.fragment.len(),
                    "FU-A start before previous end, discarding fragment"
                );
            }
            self.fragment.clear();
            self.fragment.extend_from_slice(&START_CODE);
            self.fragment.push((indicator & 0xe0) | nal_type);
            self.fragment.extend_from_slice(data);
            self.state = FragmentState::AssemblingFragment {
                last_sequence: sequence_number,
            };
        } else {
            let FragmentState::AssemblingFragment { last_sequence } = self.state else {
                tracing::trace!(seq = sequence_number, "FU-A continuation without start");
                return None;
            };
            let expected = last_sequence.wrapping_add(1);
            if sequence_number != expected {
                tracing::debug!(
                    expected,
                    got = sequence_number,
                    discarded = self.fragment.len(),
                    "FU-A sequence gap, discarding fragment"
                );
                self.state = FragmentState::Idle;
                self.fragment.clear();
                return Some(DropReason::SequenceDiscontinuity {
                    expected,
                    got: sequence_number,
                });
            }
            self.fragment.extend_from_slice(data);
            self.state = FragmentState::AssemblingFragment {
                last_sequence: sequence_number,
            };
        }

        if end {
            tracing::trace!(
                nal_type,
                nal_size = self.fragment.len() - START_CODE.len(),
                "FU-A reassembled NAL unit"
            );
            emit(&self.fragment[START_CODE.len()..]);
            self.fragment.clear();
            self.state = FragmentState::Idle;
        }
        None
    }
}

/// Split an Annex B byte stream into its NAL units.
///
/// Scans for start codes (both 4-byte `00 00 00 01` and 3-byte
/// `00 00 01`) and returns the NAL data between them, excluding the start
/// codes themselves. The start code length is tracked per NAL so that
/// boundaries are correct when 3-byte and 4-byte codes are mixed.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut nal_units = Vec::new();
    let mut i = 0usize;

    // (nal_data_start_index, start_code_length)
    let mut start_entries: Vec<(usize, usize)> = Vec::new();

    while i < data.len() {
        if i + 3 < data.len() && data[i..i + 4] == [0, 0, 0, 1] {
            start_entries.push((i + 4, 4));
            i += 4;
        } else if i + 2 < data.len() && data[i..i + 3] == [0, 0, 1] {
            start_entries.push((i + 3, 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    for (idx, &(start, _)) in start_entries.iter().enumerate() {
        let end = match start_entries.get(idx + 1) {
            Some(&(next_start, next_sc_len)) => next_start - next_sc_len,
            None => data.len(),
        };
        if start < end {
            nal_units.push(&data[start..end]);
        }
    }

    nal_units
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{annex_b, fu_a_payloads};
    use rand::Rng;

    fn random_nal(header: u8, len: usize) -> Vec<u8> {
        let mut rng = rand::rng();
        let mut nal = vec![header];
        nal.extend((0..len).map(|_| rng.random::<u8>()));
        nal
    }

    // --- Single NAL unit ---

    #[test]
    fn single_nal_wrapped_with_start_code() {
        let mut d = H264Depacketizer::new();
        for nal_type in 1..=23u8 {
            let payload = [0x60 | nal_type, 0xAA, 0xBB];
            let out = d.process(&payload, 1);
            assert_eq!(out.len(), 1, "type {nal_type}");
            assert_eq!(out[0].as_bytes(), annex_b(&payload).as_slice());
            assert_eq!(out[0].nal_type(), nal_type);
        }
        assert!(d.is_idle());
    }

    #[test]
    fn empty_payload_ignored() {
        let mut d = H264Depacketizer::new();
        assert!(d.process(&[], 1).is_empty());
    }

    #[test]
    fn unsupported_types_ignored() {
        let mut d = H264Depacketizer::new();
        for nal_type in [0u8, 25, 26, 27, 29, 30, 31] {
            let payload = [nal_type, 0x00, 0x01];
            let mut emitted = 0;
            let dropped = d.depacketize(&payload, 1, |_| emitted += 1);
            assert_eq!(emitted, 0);
            assert_eq!(dropped, Some(DropReason::UnsupportedNalType(nal_type)));
        }
    }

    // --- STAP-A ---

    #[test]
    fn stap_a_emits_each_unit_in_order() {
        let sps = [0x67, 0x42, 0x00, 0x1e];
        let pps = [0x68, 0xce];
        let idr = random_nal(0x65, 300);
        let mut payload = vec![0x78];
        for nal in [&sps[..], &pps[..], &idr[..]] {
            payload.extend_from_slice(&(nal.len() as u16).to_be_bytes());
            payload.extend_from_slice(nal);
        }

        let mut d = H264Depacketizer::new();
        let out = d.process(&payload, 9);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_bytes(), annex_b(&sps).as_slice());
        assert_eq!(out[1].as_bytes(), annex_b(&pps).as_slice());
        assert_eq!(out[2].as_bytes(), annex_b(&idr).as_slice());
    }

    #[test]
    fn stap_a_overrun_keeps_earlier_units() {
        let mut payload = vec![0x18, 0x00, 0x02, 0x67, 0x42];
        // Declares 10 bytes, only 3 follow.
        payload.extend_from_slice(&[0x00, 0x0a, 0x68, 0xce, 0x38]);
        let mut d = H264Depacketizer::new();
        let out = d.process(&payload, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw(), &[0x67, 0x42]);
    }

    #[test]
    fn stap_a_trailing_odd_byte_ignored() {
        let payload = [0x18, 0x00, 0x01, 0x09, 0x00];
        let mut d = H264Depacketizer::new();
        let out = d.process(&payload, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw(), &[0x09]);
    }

    // --- FU-A ---

    #[test]
    fn fu_a_round_trip() {
        let nal = random_nal(0x65, 5000);
        let fragments = fu_a_payloads(&nal, 1200);
        assert!(fragments.len() > 2);

        let mut d = H264Depacketizer::new();
        let mut out = Vec::new();
        for (i, frag) in fragments.iter().enumerate() {
            out.extend(d.process(frag, 1000 + i as u16));
        }
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_bytes(), annex_b(&nal).as_slice());
        assert!(d.is_idle());
    }

    #[test]
    fn fu_a_round_trip_across_sequence_wrap() {
        let nal = random_nal(0x41, 3000);
        let fragments = fu_a_payloads(&nal, 1000);
        let mut d = H264Depacketizer::new();
        let mut out = Vec::new();
        let mut seq = u16::MAX - 1;
        for frag in &fragments {
            out.extend(d.process(frag, seq));
            seq = seq.wrapping_add(1);
        }
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw(), nal.as_slice());
    }

    #[test]
    fn fu_a_header_rebuilt_from_indicator_nri() {
        // NRI=2 (0x40) in the indicator, original type 5.
        let start = [0x5c, 0x85, 0x01, 0x02];
        let end = [0x5c, 0x45, 0x03];
        let mut d = H264Depacketizer::new();
        assert!(d.process(&start, 10).is_empty());
        assert_eq!(
            d.state(),
            FragmentState::AssemblingFragment { last_sequence: 10 }
        );
        let out = d.process(&end, 11);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw(), &[0x45, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn fu_a_start_and_end_in_one_packet() {
        let mut d = H264Depacketizer::new();
        let out = d.process(&[0x7c, 0xc1, 0xAA], 5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw(), &[0x61, 0xAA]);
        assert!(d.is_idle());
    }

    #[test]
    fn fu_a_sequence_gap_drops_fragment() {
        let nal = random_nal(0x41, 3000);
        let fragments = fu_a_payloads(&nal, 1000);
        assert_eq!(fragments.len(), 3);

        let mut d = H264Depacketizer::new();
        assert!(d.process(&fragments[0], 20).is_empty());
        // Middle fragment lost: end arrives with seq 22.
        let mut emitted = 0;
        let dropped = d.depacketize(&fragments[2], 22, |_| emitted += 1);
        assert_eq!(emitted, 0);
        assert_eq!(
            dropped,
            Some(DropReason::SequenceDiscontinuity {
                expected: 21,
                got: 22
            })
        );
        assert!(d.is_idle());
    }

    #[test]
    fn fu_a_continuation_without_start_ignored() {
        let mut d = H264Depacketizer::new();
        assert!(d.process(&[0x7c, 0x01, 0xAA], 3).is_empty());
        assert!(d.process(&[0x7c, 0x41, 0xBB], 4).is_empty());
        assert!(d.is_idle());
    }

    #[test]
    fn fu_a_new_start_discards_previous() {
        let mut d = H264Depacketizer::new();
        assert!(d.process(&[0x7c, 0x81, 0x01, 0x02], 1).is_empty());
        assert!(d.process(&[0x7c, 0x85, 0x09], 2).is_empty());
        let out = d.process(&[0x7c, 0x45, 0x0a], 3);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw(), &[0x65, 0x09, 0x0a]);
    }

    #[test]
    fn fu_a_too_short_ignored() {
        let mut d = H264Depacketizer::new();
        assert!(d.process(&[0x7c], 1).is_empty());
        assert!(d.is_idle());
    }

    #[test]
    fn reset_mid_fragment_allows_fresh_start() {
        let mut d = H264Depacketizer::new();
        assert!(d.process(&[0x7c, 0x81, 0x01], 50).is_empty());
        d.reset();
        assert!(d.is_idle());

        // The stale series' end must not complete anything.
        assert!(d.process(&[0x7c, 0x41, 0x02], 51).is_empty());

        let nal = random_nal(0x65, 2500);
        let mut out = Vec::new();
        for (i, frag) in fu_a_payloads(&nal, 1000).iter().enumerate() {
            out.extend(d.process(frag, 7 + i as u16));
        }
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].raw(), nal.as_slice());
    }

    // --- Annex B splitting ---

    #[test]
    fn split_annex_b_mixed_start_codes() {
        let mut data = vec![0, 0, 0, 1, 0x67, 0x42];
        data.extend_from_slice(&[0, 0, 1, 0x68, 0xCE]);
        let nals = split_annex_b(&data);
        assert_eq!(nals, vec![&[0x67, 0x42][..], &[0x68, 0xCE][..]]);
    }

    #[test]
    fn split_annex_b_no_start_code() {
        assert!(split_annex_b(&[0xFF, 0xFE]).is_empty());
        assert!(split_annex_b(&[]).is_empty());
    }
}
