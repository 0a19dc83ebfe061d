//! The boundary between the receive loop and the downstream decoder.

/// Consumer of complete access units.
///
/// Called synchronously on the receive-loop thread, once per access unit,
/// with the concatenated Annex B NAL units of one frame. The slice is only
/// valid for the duration of the call. A slow implementation stalls the
/// receive loop; there is no queue in between.
pub trait DecodeSink: Send {
    fn decode_frame(&mut self, access_unit: &[u8]);
}

impl<F> DecodeSink for F
where
    F: FnMut(&[u8]) + Send,
{
    fn decode_frame(&mut self, access_unit: &[u8]) {
        self(access_unit)
    }
}

/// An H.264 decoder: one Annex B access unit in, at most one picture out.
pub trait Decoder: Send {
    type Frame;

    /// Returns `None` when the access unit did not produce a picture
    /// (e.g. parameter sets only, or undecodable after loss).
    fn decode_frame(&mut self, access_unit: &[u8]) -> Option<Self::Frame>;
}

/// [`DecodeSink`] that runs a [`Decoder`] and hands each decoded picture to
/// a presenter callback.
pub struct DecodeStage<D, P> {
    decoder: D,
    present: P,
    undecoded: u64,
}

impl<D, P> DecodeStage<D, P>
where
    D: Decoder,
    P: FnMut(D::Frame) + Send,
{
    pub fn new(decoder: D, present: P) -> Self {
        Self {
            decoder,
            present,
            undecoded: 0,
        }
    }

    /// Access units that produced no picture.
    pub fn undecoded(&self) -> u64 {
        self.undecoded
    }
}

impl<D, P> DecodeSink for DecodeStage<D, P>
where
    D: Decoder,
    P: FnMut(D::Frame) + Send,
{
    fn decode_frame(&mut self, access_unit: &[u8]) {
        match self.decoder.decode_frame(access_unit) {
            Some(frame) => (self.present)(frame),
            None => {
                self.undecoded += 1;
                tracing::trace!(size = access_unit.len(), "access unit produced no frame");
            }
        }
    }
}
