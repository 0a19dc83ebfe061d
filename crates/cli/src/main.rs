use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;
use ingest::media::h264::split_annex_b;
use ingest::{Receiver, ReceiverConfig};

#[derive(Parser)]
#[command(
    name = "ingest-recv",
    about = "Receive an RTP/H.264 stream and write it as an Annex B elementary stream"
)]
struct Args {
    /// Local address to bind
    #[arg(long, short, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Local UDP port
    #[arg(long, short, default_value_t = 5004)]
    port: u16,

    /// Expected RTP payload type
    #[arg(long, default_value_t = 96)]
    payload_type: u8,

    /// Discard a partial frame after this many milliseconds without a marker
    #[arg(long, default_value_t = 100)]
    timeout_ms: u64,

    /// Output file for the Annex B stream, or `-` for stdout
    #[arg(long, short, default_value = "-")]
    output: String,
}

fn open_output(path: &str) -> io::Result<Box<dyn Write + Send>> {
    if path == "-" {
        Ok(Box::new(io::stdout()))
    } else {
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }
}

fn main() {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let args = Args::parse();

    let mut output = match open_output(&args.output) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Failed to open {}: {}", args.output, e);
            return;
        }
    };

    let config = ReceiverConfig {
        bind_addr: args.bind,
        port: args.port,
        payload_type: args.payload_type,
        loss_timeout: Duration::from_millis(args.timeout_ms),
        ..ReceiverConfig::default()
    };

    let mut receiver = Receiver::new(config, move |au: &[u8]| {
        tracing::debug!(
            bytes = au.len(),
            nal_types = ?split_annex_b(au).iter().filter_map(|nal| nal.first().map(|h| h & 0x1f)).collect::<Vec<_>>(),
            "access unit"
        );
        if let Err(e) = output.write_all(au).and_then(|_| output.flush()) {
            tracing::warn!(error = %e, "failed to write access unit");
        }
    });

    if let Err(e) = receiver.start() {
        eprintln!("Failed to start receiver: {}", e);
        return;
    }

    eprintln!(
        "Receiving RTP on {}:{}, press Enter to stop",
        args.bind, args.port
    );
    let mut input = String::new();
    if let Err(e) = io::stdin().read_line(&mut input) {
        tracing::warn!(error = %e, "stdin read failed, stopping");
    }

    receiver.stop();

    let stats = receiver.stats();
    eprintln!(
        "{} access units ({} bytes) from {} datagrams; dropped: {} malformed, {} filtered, {} sequence gaps, {} timeouts, {} unsupported",
        stats.access_units,
        stats.bytes_delivered,
        stats.datagrams,
        stats.malformed,
        stats.filtered,
        stats.sequence_discontinuities,
        stats.timeouts,
        stats.unsupported,
    );
}
