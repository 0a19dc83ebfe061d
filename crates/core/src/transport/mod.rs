//! Datagram input for the receive loop.
//!
//! The loop is written against [`DatagramSource`], a blocking receive that
//! gives up after a bounded wait so the loop can observe its stop flag.
//! [`udp::UdpSource`] is the production implementation; tests substitute
//! scripted sources.

pub mod udp;

use std::io;

pub use udp::UdpSource;

/// Cancellable blocking datagram receive.
pub trait DatagramSource {
    /// Block until a datagram arrives or the source's wait interval elapses.
    ///
    /// Returns `Ok(Some(len))` with the datagram in `buf[..len]`, or
    /// `Ok(None)` if nothing arrived in time. Datagrams larger than `buf`
    /// are truncated.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}
