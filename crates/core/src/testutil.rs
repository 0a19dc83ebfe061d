//! Packet builders shared by the unit tests.

pub(crate) const TEST_PT: u8 = 96;
pub(crate) const TEST_SSRC: u32 = 0xAABBCCDD;

/// Build an RTP packet with version 2, payload type 96 and no extension.
pub(crate) fn rtp_packet(seq: u16, marker: bool, payload: &[u8]) -> Vec<u8> {
    rtp_packet_with_pt(TEST_PT, seq, marker, payload)
}

pub(crate) fn rtp_packet_with_pt(pt: u8, seq: u16, marker: bool, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + payload.len());
    buf.push(2 << 6);
    buf.push(((marker as u8) << 7) | pt);
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&(u32::from(seq) * 3000).to_be_bytes());
    buf.extend_from_slice(&TEST_SSRC.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Split a NAL unit (header byte + body) into FU-A payloads of at most
/// `max_fragment` body bytes each (RFC 6184 §5.8).
pub(crate) fn fu_a_payloads(nal: &[u8], max_fragment: usize) -> Vec<Vec<u8>> {
    let indicator = (nal[0] & 0xe0) | 28;
    let nal_type = nal[0] & 0x1f;
    let chunks: Vec<&[u8]> = nal[1..].chunks(max_fragment).collect();
    let last = chunks.len() - 1;
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut header = nal_type;
            if i == 0 {
                header |= 0x80;
            }
            if i == last {
                header |= 0x40;
            }
            let mut p = vec![indicator, header];
            p.extend_from_slice(chunk);
            p
        })
        .collect()
}

/// Prefix a NAL unit with the 4-byte Annex B start code.
pub(crate) fn annex_b(nal: &[u8]) -> Vec<u8> {
    let mut out = vec![0, 0, 0, 1];
    out.extend_from_slice(nal);
    out
}
