//! Error types for the ingest library.

use std::fmt;

/// Errors surfaced by the ingest library.
///
/// Only the control path returns these. Per-packet problems inside the
/// receive loop are never propagated; they are classified as a
/// [`DropReason`], logged, counted, and the loop moves on.
///
/// - **Transport**: [`Io`](Self::Io): socket bind/open failures at start.
/// - **Lifecycle**: [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// [`Receiver::start`](crate::Receiver::start) was called while already running.
    #[error("receiver already running")]
    AlreadyRunning,
}

/// Why a datagram failed RTP parsing (RFC 3550 §5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Fewer than 12 bytes, the size of the fixed header.
    TooShort,
    /// The CSRC list runs past the end of the datagram.
    CsrcOverrun,
    /// Extension header or one of its elements is truncated.
    MalformedExtension,
    /// The padding count is larger than the payload it trails.
    BadPadding,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "packet shorter than fixed header"),
            Self::CsrcOverrun => write!(f, "CSRC list exceeds packet length"),
            Self::MalformedExtension => write!(f, "malformed header extension"),
            Self::BadPadding => write!(f, "padding exceeds payload"),
        }
    }
}

/// Why a datagram, fragment, or partial access unit was discarded.
///
/// All of these are recoverable: the stream continues with the next
/// datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The datagram failed RTP header parsing.
    MalformedPacket(ParseErrorKind),
    /// An FU-A continuation did not follow the previous fragment's sequence
    /// number; the in-progress NAL unit was discarded.
    SequenceDiscontinuity { expected: u16, got: u16 },
    /// No marker bit arrived within the loss window; the partial access
    /// unit and the depayloader state were discarded.
    AccessUnitTimeout,
    /// The payload's NAL unit type is not handled (0, 25–27, 29–31).
    UnsupportedNalType(u8),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedPacket(kind) => write!(f, "malformed packet: {kind}"),
            Self::SequenceDiscontinuity { expected, got } => {
                write!(f, "sequence discontinuity (expected {expected}, got {got})")
            }
            Self::AccessUnitTimeout => write!(f, "access unit timed out"),
            Self::UnsupportedNalType(t) => write!(f, "unsupported NAL unit type {t}"),
        }
    }
}

/// Convenience alias for `Result<T, IngestError>`.
pub type Result<T> = std::result::Result<T, IngestError>;
