//! A test-tone audio source wired into the RTSP server.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rtsp::transport::{Peer, SocketPair, UdpTransport};
use rtsp::{
    CallbackError, CallbackResult, Instruction, ResourceId, RtcpConfig, RtcpTask, RtpSession,
    RtpSessionConfig, RtspHandler, Session, SessionHandle,
};

use crate::sdp::AudioFormat;

/// One client's outgoing stream.
struct Stream {
    rtp: RtpSession<UdpTransport>,
    rtcp: RtcpTask,
    playing: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    sender: Option<JoinHandle<()>>,
}

impl Stream {
    fn close(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(sender) = self.sender.take()
            && sender.join().is_err()
        {
            tracing::warn!("tone sender panicked");
        }
        self.rtcp.shutdown();
        let stats = self.rtp.stats();
        tracing::info!(
            ssrc = format_args!("{:#010X}", self.rtp.ssrc()),
            packets = stats.rtp.packets,
            octets = stats.rtp.octets,
            reports = stats.rtcp.packets,
            "stream closed"
        );
    }
}

/// Streams a sine tone to every playing session.
pub struct ToneDevice {
    format: AudioFormat,
    frequency: f64,
    cname: String,
    rtcp: RtcpConfig,
    streams: HashMap<SessionHandle, Stream>,
    /// Bound on first SETUP of each resource at its advertised ports.
    sockets: HashMap<ResourceId, SocketPair>,
}

impl ToneDevice {
    pub fn new(format: AudioFormat, frequency: f64, cname: String, rtcp: RtcpConfig) -> Self {
        Self {
            format,
            frequency,
            cname,
            rtcp,
            streams: HashMap::new(),
            sockets: HashMap::new(),
        }
    }

    fn create(&mut self, session: &Session<Peer>) -> CallbackResult {
        let client = session.client().addr().ip();
        let sockets = match self.sockets.entry(session.resource()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(SocketPair::bind(client, session.server_ports())?),
        };
        let transport = UdpTransport::new(sockets, client, session.client_ports());
        let config = RtpSessionConfig {
            payload_type: self.format.payload_type,
            timestamp_increment: self.format.timestamp_increment(),
            ssrc: None,
            cname: self.cname.clone(),
            rtcp: self.rtcp.clone(),
        };
        let rtp = RtpSession::new(config, transport).map_err(CallbackError::new)?;
        let rtcp = RtcpTask::spawn(rtp.clone()).map_err(CallbackError::new)?;

        let playing = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let sender = {
            let rtp = rtp.clone();
            let tone = Tone::new(&self.format, self.frequency);
            let payload_len = self.format.payload_len();
            let period = self.format.packet_duration();
            let playing = playing.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("tone".to_string())
                .spawn(move || send_tone(rtp, tone, payload_len, period, &playing, &stop))?
        };

        tracing::info!(
            session_id = %session.id(),
            client = %session.client().addr(),
            ports = %session.client_ports(),
            "stream created"
        );
        self.streams.insert(
            session.handle(),
            Stream {
                rtp,
                rtcp,
                playing,
                stop,
                sender: Some(sender),
            },
        );
        Ok(())
    }

    fn set_playing(&self, session: &Session<Peer>, playing: bool) -> CallbackResult {
        let stream = self
            .streams
            .get(&session.handle())
            .ok_or_else(|| CallbackError::new("no stream for session"))?;
        stream.playing.store(playing, Ordering::SeqCst);
        tracing::info!(session_id = %session.id(), playing, "stream toggled");
        Ok(())
    }
}

impl RtspHandler for ToneDevice {
    type Client = Peer;

    fn transmit(&mut self, client: &Peer, bytes: &[u8]) -> CallbackResult {
        client.send(bytes)?;
        Ok(())
    }

    fn control(&mut self, session: &Session<Peer>, instruction: Instruction) -> CallbackResult {
        match instruction {
            Instruction::Create => self.create(session),
            Instruction::Play => self.set_playing(session, true),
            Instruction::Pause => self.set_playing(session, false),
            Instruction::Delete => {
                if let Some(stream) = self.streams.remove(&session.handle()) {
                    stream.close();
                }
                Ok(())
            }
        }
    }
}

impl Drop for ToneDevice {
    fn drop(&mut self) {
        for (_, stream) in self.streams.drain() {
            stream.close();
        }
    }
}

/// Phase accumulator producing big-endian 16-bit samples.
struct Tone {
    phase: f64,
    step: f64,
    channels: usize,
}

impl Tone {
    fn new(format: &AudioFormat, frequency: f64) -> Self {
        Self {
            phase: 0.0,
            step: std::f64::consts::TAU * frequency / f64::from(format.sample_rate.max(1)),
            channels: usize::from(format.channels.max(1)),
        }
    }

    fn fill(&mut self, out: &mut [u8]) {
        for frame in out.chunks_exact_mut(2 * self.channels) {
            let sample = (self.phase.sin() * f64::from(i16::MAX) * 0.25) as i16;
            for channel in frame.chunks_exact_mut(2) {
                channel.copy_from_slice(&sample.to_be_bytes());
            }
            self.phase = (self.phase + self.step) % std::f64::consts::TAU;
        }
    }
}

fn send_tone(
    rtp: RtpSession<UdpTransport>,
    mut tone: Tone,
    payload_len: usize,
    period: Duration,
    playing: &AtomicBool,
    stop: &AtomicBool,
) {
    let offset = rtp.payload_offset();
    let len = offset + payload_len;
    let mut buffer = match rtp.alloc_data(len) {
        Ok(buffer) => buffer,
        Err(err) => {
            tracing::warn!(error = %err, "failed to allocate RTP buffer");
            return;
        }
    };

    let mut next = Instant::now();
    while !stop.load(Ordering::SeqCst) {
        if playing.load(Ordering::SeqCst) {
            tone.fill(&mut buffer[offset..len]);
            // Failures are counted by the session.
            let _ = rtp.tx_data(&mut buffer, len);
        }
        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }
    rtp.free_data(buffer);
}
