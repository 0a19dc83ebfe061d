use crate::error::ParseErrorKind;

/// Size of the fixed RTP header (RFC 3550 §5.1).
pub const FIXED_HEADER_LEN: usize = 12;

/// Profile id of the one-byte header extension form (RFC 8285 §4.2).
pub const ONE_BYTE_PROFILE: u16 = 0xBEDE;

/// One-byte extension element id carrying the sender's wall clock.
pub const SENDER_TIMESTAMP_ID: u8 = 1;

/// Parsed RTP fixed header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |                 CSRC list (CC * 4 bytes)                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      profile (0xBEDE)         |     length (32-bit words)     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                   extension data (if X=1)                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Borrows the datagram it was parsed from; the extension data is exposed as
/// a slice rather than copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader<'a> {
    pub version: u8,
    pub padding: bool,
    pub csrc_count: u8,
    /// Set on the last packet of an access unit (RFC 6184 §5.1).
    pub marker: bool,
    /// 7-bit payload type (RFC 3551).
    pub payload_type: u8,
    /// 16-bit, wraps modulo 65536.
    pub sequence_number: u16,
    /// Media clock, 90 kHz for H.264.
    pub timestamp: u32,
    pub ssrc: u32,
    /// Header extension, present when the X bit is set.
    pub extension: Option<HeaderExtension<'a>>,
}

/// RTP header extension block (RFC 3550 §5.3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderExtension<'a> {
    /// Profile-defined identifier; `0xBEDE` selects one-byte elements.
    pub profile: u16,
    /// Extension data, `length * 4` bytes.
    pub data: &'a [u8],
    /// Sender wall clock in microseconds, from one-byte element id 1.
    ///
    /// Only used for latency diagnostics.
    pub sender_timestamp_us: Option<u64>,
}

impl<'a> HeaderExtension<'a> {
    /// Iterate the one-byte extension elements as `(id, data)` pairs.
    ///
    /// Empty for any profile other than `0xBEDE`.
    pub fn elements(&self) -> OneByteElements<'a> {
        let data = if self.profile == ONE_BYTE_PROFILE {
            self.data
        } else {
            &[]
        };
        OneByteElements {
            data,
            pos: 0,
            malformed: false,
        }
    }
}

/// Iterator over one-byte header extension elements (RFC 8285 §4.2).
///
/// ```text
///  0 1 2 3 4 5 6 7
/// +-+-+-+-+-+-+-+-+
/// |  ID   |  len  |   len = element size - 1
/// +-+-+-+-+-+-+-+-+
/// ```
///
/// A zero byte is padding and is skipped. Id 15 ends the list. Iteration
/// stops at the first element that runs past the end of the block and
/// [`is_malformed`](Self::is_malformed) then reports `true`.
#[derive(Debug, Clone)]
pub struct OneByteElements<'a> {
    data: &'a [u8],
    pos: usize,
    malformed: bool,
}

impl OneByteElements<'_> {
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }
}

impl<'a> Iterator for OneByteElements<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            if b == 0 {
                self.pos += 1;
                continue;
            }
            let id = b >> 4;
            if id == 15 {
                self.pos = self.data.len();
                return None;
            }
            let len = usize::from(b & 0x0f) + 1;
            let start = self.pos + 1;
            let end = start + len;
            if end > self.data.len() {
                self.malformed = true;
                self.pos = self.data.len();
                return None;
            }
            self.pos = end;
            return Some((id, &self.data[start..end]));
        }
        None
    }
}

/// A parsed RTP packet: header plus payload with padding already removed.
///
/// Transient: it borrows the receive buffer and lives for one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub header: RtpHeader<'a>,
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parse one UDP datagram as an RTP packet.
    ///
    /// Fails with a [`ParseErrorKind`] when the buffer is shorter than the
    /// fixed header, when the CSRC list or extension block is truncated, or
    /// when the padding count is larger than the payload. Has no side
    /// effects; the receive loop drops failed datagrams and continues.
    pub fn parse(buf: &'a [u8]) -> Result<Self, ParseErrorKind> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(ParseErrorKind::TooShort);
        }

        let version = buf[0] >> 6;
        let padding = buf[0] & 0x20 != 0;
        let has_extension = buf[0] & 0x10 != 0;
        let csrc_count = buf[0] & 0x0f;
        let marker = buf[1] & 0x80 != 0;
        let payload_type = buf[1] & 0x7f;
        let sequence_number = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let mut offset = FIXED_HEADER_LEN + 4 * usize::from(csrc_count);
        if offset > buf.len() {
            return Err(ParseErrorKind::CsrcOverrun);
        }

        let extension = if has_extension {
            let (ext, ext_end) = parse_extension(buf, offset)?;
            offset = ext_end;
            Some(ext)
        } else {
            None
        };

        let mut payload = &buf[offset..];
        if padding {
            let Some(&pad) = payload.last() else {
                return Err(ParseErrorKind::BadPadding);
            };
            let remaining = payload
                .len()
                .checked_sub(usize::from(pad))
                .ok_or(ParseErrorKind::BadPadding)?;
            payload = &payload[..remaining];
        }

        Ok(RtpPacket {
            header: RtpHeader {
                version,
                padding,
                csrc_count,
                marker,
                payload_type,
                sequence_number,
                timestamp,
                ssrc,
                extension,
            },
            payload,
        })
    }
}

/// Parse the extension block starting at `offset`, returning it and the
/// offset of the first payload byte.
fn parse_extension(
    buf: &[u8],
    offset: usize,
) -> Result<(HeaderExtension<'_>, usize), ParseErrorKind> {
    let data_start = offset + 4;
    if data_start > buf.len() {
        return Err(ParseErrorKind::MalformedExtension);
    }
    let profile = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
    let words = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]);
    let data_end = data_start + 4 * usize::from(words);
    if data_end > buf.len() {
        return Err(ParseErrorKind::MalformedExtension);
    }

    let mut ext = HeaderExtension {
        profile,
        data: &buf[data_start..data_end],
        sender_timestamp_us: None,
    };

    if profile == ONE_BYTE_PROFILE {
        let mut elements = ext.elements();
        for (id, data) in elements.by_ref() {
            if id == SENDER_TIMESTAMP_ID {
                if let Ok(bytes) = <[u8; 8]>::try_from(data) {
                    ext.sender_timestamp_us = Some(u64::from_be_bytes(bytes));
                }
            }
        }
        if elements.is_malformed() {
            return Err(ParseErrorKind::MalformedExtension);
        }
    }

    Ok((ext, data_end))
}
