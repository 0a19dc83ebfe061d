use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::assembler::AccessUnitAssembler;
use crate::error::{IngestError, Result};
use crate::sink::DecodeSink;
use crate::stats::{ReceiverStats, StatsSnapshot};
use crate::transport::{DatagramSource, UdpSource};

/// Largest datagram the loop accepts (the UDP maximum).
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Receiver configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Local address to bind.
    pub bind_addr: IpAddr,
    /// Local UDP port to bind. `0` picks an ephemeral port.
    pub port: u16,
    /// RTP payload type of the H.264 stream; other types are dropped.
    pub payload_type: u8,
    /// How long a partial access unit may wait for its marker packet.
    pub loss_timeout: Duration,
    /// Requested kernel receive buffer (`SO_RCVBUF`).
    pub recv_buffer_size: usize,
    /// Upper bound on a single blocking receive; also bounds how long
    /// [`Receiver::stop`] waits for the loop to notice cancellation.
    pub read_timeout: Duration,
    /// How long [`Receiver::stop`] waits for the loop thread to exit.
    pub stop_timeout: Duration,
    /// Access units smaller than this are logged as suspicious (still delivered).
    pub min_access_unit_size: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5004,
            payload_type: 96,
            loss_timeout: Duration::from_millis(100),
            recv_buffer_size: 4 * 1024 * 1024,
            read_timeout: Duration::from_millis(250),
            stop_timeout: Duration::from_secs(2),
            min_access_unit_size: 16,
        }
    }
}

impl ReceiverConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

/// RTP/H.264 receiver.
///
/// Owns one worker thread that receives datagrams, assembles access units
/// and hands each one to the [`DecodeSink`] in arrival order. All pipeline
/// state belongs to that thread; it is rebuilt on every [`start`](Self::start)
/// and dropped when the loop exits, so a restart never sees leftovers from
/// the previous run.
///
/// ```no_run
/// use ingest::{Receiver, ReceiverConfig};
///
/// let mut receiver = Receiver::new(ReceiverConfig::default(), |au: &[u8]| {
///     println!("access unit: {} bytes", au.len());
/// });
/// receiver.start()?;
/// // ...
/// receiver.stop();
/// # Ok::<(), ingest::IngestError>(())
/// ```
pub struct Receiver {
    config: ReceiverConfig,
    sink: Arc<Mutex<Box<dyn DecodeSink>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<ReceiverStats>,
    local_addr: Option<SocketAddr>,
}

impl Receiver {
    pub fn new(config: ReceiverConfig, sink: impl DecodeSink + 'static) -> Self {
        Self {
            config,
            sink: Arc::new(Mutex::new(Box::new(sink))),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            stats: Arc::new(ReceiverStats::new()),
            local_addr: None,
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Bind the UDP socket and start the receive loop.
    ///
    /// Bind failure is the only fatal condition and is returned here.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(IngestError::AlreadyRunning);
        }
        let source = UdpSource::bind(
            self.config.socket_addr(),
            self.config.recv_buffer_size,
            self.config.read_timeout,
        )?;
        let local_addr = source.local_addr()?;
        self.start_with_source(source)?;
        self.local_addr = Some(local_addr);
        Ok(())
    }

    /// Start the receive loop over an already-open datagram source.
    pub fn start_with_source<S>(&mut self, source: S) -> Result<()>
    where
        S: DatagramSource + Send + 'static,
    {
        if self.is_running() {
            return Err(IngestError::AlreadyRunning);
        }

        // Fresh flag per run: a loop detached by a timed-out stop keeps
        // observing its own (cleared) flag.
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(ReceiverStats::new());
        let assembler = AccessUnitAssembler::new(&self.config, stats.clone());
        let sink = self.sink.clone();
        let loop_running = running.clone();

        let worker = thread::Builder::new()
            .name("rtp-receive".into())
            .spawn(move || receive_loop(source, assembler, sink, loop_running))?;

        self.running = running;
        self.stats = stats;
        self.worker = Some(worker);
        tracing::info!(
            payload_type = self.config.payload_type,
            loss_timeout_ms = self.config.loss_timeout.as_millis() as u64,
            "receiver started"
        );
        Ok(())
    }

    /// Cancel the receive loop and wait (bounded) for it to exit.
    ///
    /// Does nothing if not running.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("receiver stopping");

        let deadline = Instant::now() + self.config.stop_timeout;
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if worker.is_finished() {
            if worker.join().is_err() {
                tracing::error!("receive loop panicked");
            }
        } else {
            tracing::warn!(
                timeout_ms = self.config.stop_timeout.as_millis() as u64,
                "receive loop did not exit in time, detaching"
            );
        }
        self.local_addr = None;
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some() && self.running.load(Ordering::SeqCst)
    }

    /// Address the UDP socket is bound to, while running via [`start`](Self::start).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Counters for the current run, or the last one after [`stop`](Self::stop).
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The receive loop: one datagram at a time, in arrival order.
///
/// Exits when `running` is cleared; the source's bounded wait guarantees the
/// flag is checked at least once per read timeout. Receive errors are logged
/// and the loop continues.
fn receive_loop<S: DatagramSource>(
    mut source: S,
    mut assembler: AccessUnitAssembler,
    sink: Arc<Mutex<Box<dyn DecodeSink>>>,
    running: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    while running.load(Ordering::SeqCst) {
        match source.recv(&mut buf) {
            Ok(Some(len)) => {
                let now = Instant::now();
                let mut sink = sink.lock();
                assembler.push(&buf[..len], now, &mut **sink);
            }
            Ok(None) => {
                assembler.poll_timeout(Instant::now());
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "UDP receive error");
                }
            }
        }
    }
    tracing::debug!("receive loop exited");
}
