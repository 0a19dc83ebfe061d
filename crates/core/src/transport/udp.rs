use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use super::DatagramSource;
use crate::error::Result;

/// UDP socket for inbound RTP.
///
/// Binds the configured address and enlarges the kernel receive buffer:
/// once the kernel queue overflows, datagrams are lost with no way to
/// recover them above the transport. A read timeout bounds every
/// [`recv`](DatagramSource::recv) so shutdown is prompt.
#[derive(Debug)]
pub struct UdpSource {
    socket: UdpSocket,
}

impl UdpSource {
    /// Bind `addr`, request a `recv_buffer_size`-byte receive buffer and set
    /// the per-receive wait to `read_timeout`.
    ///
    /// Failing to enlarge the buffer is logged and otherwise ignored; only
    /// bind and timeout setup errors are returned.
    pub fn bind(
        addr: SocketAddr,
        recv_buffer_size: usize,
        read_timeout: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(read_timeout))?;

        if let Err(e) = set_recv_buffer_size(&socket, recv_buffer_size) {
            tracing::warn!(
                error = %e,
                requested = recv_buffer_size,
                "could not enlarge UDP receive buffer"
            );
        }

        tracing::info!(
            addr = %socket.local_addr()?,
            recv_buffer_size,
            "UDP socket bound"
        );
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl DatagramSource for UdpSource {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.recv(buf) {
            Ok(len) => Ok(Some(len)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Set `SO_RCVBUF`. The kernel may clamp the value (Linux caps it at
/// `net.core.rmem_max`).
#[cfg(unix)]
fn set_recv_buffer_size(socket: &UdpSocket, size: usize) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let value = libc::c_int::try_from(size).unwrap_or(libc::c_int::MAX);
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_recv_buffer_size(_socket: &UdpSocket, size: usize) -> io::Result<()> {
    tracing::debug!(size, "receive buffer sizing not supported on this platform");
    Ok(())
}
