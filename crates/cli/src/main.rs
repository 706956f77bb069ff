mod device;
mod sdp;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use rtsp::transport::TcpServer;
use rtsp::{PortRange, RtcpConfig, Server, ServerConfig};

use crate::device::ToneDevice;
use crate::sdp::{AudioFormat, generate_sdp};

#[derive(Parser)]
#[command(
    name = "rtsp-audio-server",
    about = "RTSP server streaming a test tone as L16 audio over RTP"
)]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:8554")]
    bind: String,

    /// Resource path clients request
    #[arg(long, short, default_value = "/audio")]
    path: String,

    /// Address advertised in the SDP
    #[arg(long, default_value = "0.0.0.0")]
    advertise: String,

    /// Server RTP port; RTCP uses the next one
    #[arg(long, default_value_t = 6970)]
    server_port: u16,

    /// Concurrent sessions allowed
    #[arg(long, default_value_t = 4)]
    max_sessions: usize,

    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    #[arg(long, default_value_t = 480)]
    samples_per_packet: u32,

    /// Tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    frequency: f64,

    /// RTCP SDES CNAME
    #[arg(long, default_value = "rtsp-audio@localhost")]
    cname: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let format = AudioFormat {
        payload_type: 96,
        sample_rate: args.sample_rate,
        channels: 1,
        samples_per_packet: args.samples_per_packet,
    };
    let rtcp = RtcpConfig {
        // Payload plus RTP/UDP/IP headers, in octets per second.
        session_bandwidth: f64::from(args.sample_rate) * 2.0
            * (1.0 + 40.0 / (format.payload_len().max(1) as f64)),
        ..RtcpConfig::default()
    };
    let device = ToneDevice::new(format.clone(), args.frequency, args.cname, rtcp);

    let config = ServerConfig {
        max_sessions: args.max_sessions,
        write_buffer_len: 2048,
        ..ServerConfig::default()
    };
    let mut server = Server::new(config, device);

    let sdp = generate_sdp(&format, &args.advertise, rand::random::<u32>(), "rtsp-audio tone");
    let ports = PortRange::new(args.server_port, args.server_port.wrapping_add(1));
    if let Err(e) = server.add_resource(&args.path, sdp.as_bytes(), ports) {
        eprintln!("Failed to add resource {}: {e}", args.path);
        return ExitCode::FAILURE;
    }

    let server = Arc::new(Mutex::new(server));
    let mut tcp = match TcpServer::start(&args.bind, server.clone()) {
        Ok(tcp) => tcp,
        Err(e) => {
            eprintln!("Failed to start server: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "RTSP server on rtsp://{}{} (press Enter to stop)",
        tcp.local_addr(),
        args.path
    );
    let mut input = String::new();
    if let Err(e) = io::stdin().read_line(&mut input) {
        tracing::warn!(error = %e, "stdin read failed");
    }

    tcp.stop();
    let stats = server.lock().stats();
    tracing::info!(valid = stats.valid, invalid = stats.invalid, "requests handled");
    ExitCode::SUCCESS
}
