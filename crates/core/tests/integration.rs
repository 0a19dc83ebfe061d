//! Integration test: RTP/H.264 over loopback UDP into a collecting sink.
//!
//! Starts the receiver on a fixed port, sends a packetized stream with a
//! sender socket, and verifies the delivered access units.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ingest::{Receiver, ReceiverConfig};
use parking_lot::Mutex;

/// Fixed port for integration test. Each test uses its own.
const TEST_PORT: u16 = 15004;

fn rtp(seq: u16, marker: bool, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0x80, ((marker as u8) << 7) | 96];
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&90_000u32.to_be_bytes());
    buf.extend_from_slice(&0x1234_5678u32.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn annex_b(nal: &[u8]) -> Vec<u8> {
    [&[0, 0, 0, 1][..], nal].concat()
}

fn start_receiver(port: u16) -> (Receiver, Arc<Mutex<Vec<Vec<u8>>>>, SocketAddr) {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let out = frames.clone();
    let config = ReceiverConfig {
        bind_addr: "127.0.0.1".parse().unwrap(),
        port,
        read_timeout: Duration::from_millis(50),
        ..ReceiverConfig::default()
    };
    let mut receiver = Receiver::new(config, move |au: &[u8]| out.lock().push(au.to_vec()));
    receiver.start().expect("receiver start");
    let addr = receiver.local_addr().expect("bound address");
    (receiver, frames, addr)
}

fn wait_for_frames(frames: &Mutex<Vec<Vec<u8>>>, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while frames.lock().len() < count {
        assert!(Instant::now() < deadline, "timed out waiting for {count} frames");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn sps_fragmented_slice_and_marker() {
    let (mut receiver, frames, addr) = start_receiver(TEST_PORT);
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

    let sps = [0x67, 0x42, 0xc0, 0x1f, 0xda, 0x01];
    let slice: Vec<u8> = std::iter::once(0x41).chain((0..2400).map(|i| i as u8)).collect();
    let tail = [0x41, 0x9b, 0x01, 0x02];

    // FU-A indicator keeps F/NRI from the slice header, type 28.
    let indicator = (slice[0] & 0xe0) | 28;
    let mut start = vec![indicator, 0x80 | 1];
    start.extend_from_slice(&slice[1..1201]);
    let mut end = vec![indicator, 0x40 | 1];
    end.extend_from_slice(&slice[1201..]);

    // Noise the receiver must skip: runt datagram, other payload type.
    sender.send_to(&[0x80, 0x60], addr).unwrap();
    let mut other_pt = rtp(99, true, &[0x65, 0x00]);
    other_pt[1] = 0x80 | 100;
    sender.send_to(&other_pt, addr).unwrap();

    sender.send_to(&rtp(100, false, &sps), addr).unwrap();
    sender.send_to(&rtp(101, false, &start), addr).unwrap();
    sender.send_to(&rtp(102, false, &end), addr).unwrap();
    sender.send_to(&rtp(103, true, &tail), addr).unwrap();

    wait_for_frames(&frames, 1);
    receiver.stop();

    let expected = [annex_b(&sps), annex_b(&slice), annex_b(&tail)].concat();
    assert_eq!(*frames.lock(), vec![expected]);

    let stats = receiver.stats();
    assert_eq!(stats.datagrams, 6);
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.filtered, 1);
    assert_eq!(stats.access_units, 1);
}

#[test]
fn lost_fragment_never_delivered() {
    let (mut receiver, frames, addr) = start_receiver(TEST_PORT + 1);
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

    // FU-A start at 10, middle (11) lost, end at 12 with marker.
    sender
        .send_to(&rtp(10, false, &[0x7c, 0x85, 0xaa]), addr)
        .unwrap();
    sender
        .send_to(&rtp(12, true, &[0x7c, 0x45, 0xcc]), addr)
        .unwrap();
    // Next frame arrives intact.
    sender.send_to(&rtp(13, true, &[0x41, 0x01]), addr).unwrap();

    wait_for_frames(&frames, 1);
    receiver.stop();

    assert_eq!(*frames.lock(), vec![annex_b(&[0x41, 0x01])]);
    assert_eq!(receiver.stats().sequence_discontinuities, 1);
}

#[test]
fn restart_after_stop() {
    let (mut receiver, frames, addr) = start_receiver(TEST_PORT + 2);
    receiver.stop();
    assert!(!receiver.is_running());

    receiver.start().expect("restart");
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender
        .send_to(&rtp(1, true, &[0x65, 0x88, 0x84]), addr)
        .unwrap();
    wait_for_frames(&frames, 1);
    receiver.stop();

    assert_eq!(*frames.lock(), vec![annex_b(&[0x65, 0x88, 0x84])]);
}

#[test]
fn bind_failure_reported_at_start() {
    let (_running, _, addr) = start_receiver(TEST_PORT + 3);
    let config = ReceiverConfig {
        bind_addr: addr.ip(),
        port: addr.port(),
        ..ReceiverConfig::default()
    };
    let mut second = Receiver::new(config, |_: &[u8]| {});
    assert!(second.start().is_err());
    assert!(!second.is_running());
}
