pub mod assembler;
pub mod error;
pub mod media;
pub mod receiver;
pub mod sink;
pub mod stats;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use assembler::{AccessUnit, AccessUnitAssembler, Pushed};
pub use error::{DropReason, IngestError, ParseErrorKind, Result};
pub use media::NalUnit;
pub use media::h264::H264Depacketizer;
pub use media::rtp::{RtpHeader, RtpPacket};
pub use receiver::{Receiver, ReceiverConfig};
pub use sink::{DecodeSink, DecodeStage, Decoder};
pub use stats::{ReceiverStats, StatsSnapshot};
