//! RTP/RTCP transport plane (RFC 3550).
//!
//! An [`RtpSession`] owns the sender state of one outgoing stream: sequence
//! number, RTP timestamp, SSRC and the tx counters. Media goes out through
//! [`RtpSession::tx_data`]; an [`RtcpTask`] periodically calls
//! [`RtpSession::send_report`] from its own thread. Both paths share the
//! state behind one mutex.
//!
//! ```text
//! device thread              RTCP thread
//!     |                          |
//!  tx_data ---> [ State ] <--- send_report / next_interval
//!     |                          |
//!  RtpTransport::transmit    RtpTransport::transmit (Control)
//! ```

pub mod header;
pub mod interval;
pub mod rtcp;
pub mod source;
pub mod task;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::callback::{CallbackResult, NtpTimestamp, system_random_u32};
use crate::error::RtpError;
pub use header::{RTP_HEADER_LEN, RtpHeader};
use interval::IntervalInput;
use rtcp::{InvalidRtcp, SenderInfo};
use source::{LossReport, SourceState};
pub use task::RtcpTask;

/// Which plane a transport buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// RTP media.
    Data,
    /// RTCP reports.
    Control,
}

/// Packet I/O, clock and entropy collaborator of an [`RtpSession`].
///
/// Buffers are allocated, filled by the session, transmitted, then handed
/// back through [`free`](Self::free).
pub trait RtpTransport: Send + Sync + 'static {
    type Buffer: AsRef<[u8]> + AsMut<[u8]> + Send;

    fn alloc(&self, kind: BufferKind, len: usize) -> CallbackResult<Self::Buffer>;

    /// Send the first `len` bytes of `buffer`.
    fn transmit(&self, kind: BufferKind, buffer: &Self::Buffer, len: usize) -> CallbackResult;

    fn free(&self, kind: BufferKind, buffer: Self::Buffer) {
        let _ = kind;
        drop(buffer);
    }

    fn ntp_now(&self) -> CallbackResult<NtpTimestamp> {
        NtpTimestamp::now()
    }

    fn random_u32(&self) -> CallbackResult<u32> {
        system_random_u32()
    }
}

/// RTCP scheduling parameters.
#[derive(Debug, Clone)]
pub struct RtcpConfig {
    /// Session bandwidth in octets per second; RTCP gets 5% of it.
    pub session_bandwidth: f64,
    /// Expected session members, this sender included.
    pub members: u32,
    /// Floor of the report interval, halved for the first report.
    pub min_interval: Duration,
}

impl Default for RtcpConfig {
    fn default() -> Self {
        Self {
            session_bandwidth: 64_000.0,
            members: 2,
            min_interval: interval::RTCP_MIN_TIME,
        }
    }
}

/// Parameters of one outgoing RTP stream.
#[derive(Debug, Clone)]
pub struct RtpSessionConfig {
    /// RTP payload type (7-bit, RFC 3551).
    pub payload_type: u8,
    /// RTP clock ticks added per packet.
    pub timestamp_increment: u32,
    /// Fixed SSRC; random when `None` (RFC 3550 §8.1).
    pub ssrc: Option<u32>,
    /// SDES CNAME, at most 255 octets.
    pub cname: String,
    pub rtcp: RtcpConfig,
}

/// Success and failure counts of one plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxCounters {
    pub packets: u64,
    /// Payload octets for RTP, whole packets for RTCP.
    pub octets: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtpStats {
    pub rtp: TxCounters,
    pub rtcp: TxCounters,
    /// Inbound RTCP compounds that passed validation.
    pub rtcp_received: u64,
    pub rtcp_invalid: u64,
}

#[derive(Debug)]
struct State {
    sequence: u16,
    timestamp: u32,
    ssrc: u32,
    /// Wall clock and RTP timestamp of the last media packet.
    last_tx: Option<(NtpTimestamp, u32)>,
    /// Wall-clock time between the last two media packets, 32.32 fixed point.
    ntp_per_tx: u64,
    stats: RtpStats,
    avg_rtcp_size: f64,
    initial: bool,
    /// Media was sent since the previous report.
    we_sent: bool,
    source: Option<SourceState>,
}

struct Inner<T> {
    config: RtpSessionConfig,
    transport: T,
    state: Mutex<State>,
}

/// Sender side of one RTP stream; cheap to clone.
pub struct RtpSession<T: RtpTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: RtpTransport> Clone for RtpSession<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: RtpTransport> RtpSession<T> {
    /// Create a stream with random initial sequence number and timestamp.
    pub fn new(config: RtpSessionConfig, transport: T) -> Result<Self, RtpError> {
        if config.cname.len() > rtcp::MAX_CNAME_LEN {
            return Err(RtpError::Api("CNAME longer than 255 octets"));
        }
        let ssrc = match config.ssrc {
            Some(ssrc) => ssrc,
            None => transport.random_u32()?,
        };
        let sequence = transport.random_u32()? as u16;
        let timestamp = transport.random_u32()?;
        tracing::debug!(
            pt = config.payload_type,
            ssrc = format_args!("{:#010X}", ssrc),
            sequence,
            timestamp,
            "RTP session created"
        );

        let avg_rtcp_size = (rtcp::compound_len(config.cname.len()) + interval::UDP_IP_OVERHEAD) as f64;
        let state = State {
            sequence,
            timestamp,
            ssrc,
            last_tx: None,
            ntp_per_tx: 0,
            stats: RtpStats::default(),
            avg_rtcp_size,
            initial: true,
            we_sent: false,
            source: None,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                transport,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn config(&self) -> &RtpSessionConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn ssrc(&self) -> u32 {
        self.inner.state.lock().ssrc
    }

    /// Sequence number of the last packet sent.
    pub fn sequence(&self) -> u16 {
        self.inner.state.lock().sequence
    }

    /// RTP timestamp of the last packet sent.
    pub fn timestamp(&self) -> u32 {
        self.inner.state.lock().timestamp
    }

    pub fn stats(&self) -> RtpStats {
        self.inner.state.lock().stats
    }

    /// Where media starts in a data buffer.
    pub fn payload_offset(&self) -> usize {
        RTP_HEADER_LEN
    }

    /// Get a data buffer of `len` octets, header space included.
    pub fn alloc_data(&self, len: usize) -> Result<T::Buffer, RtpError> {
        Ok(self.inner.transport.alloc(BufferKind::Data, len)?)
    }

    pub fn free_data(&self, buffer: T::Buffer) {
        self.inner.transport.free(BufferKind::Data, buffer);
    }

    /// Stamp the header onto `buffer` and send its first `len` octets.
    ///
    /// The timestamp and sequence number advance before the header is
    /// written, so the first packet carries `initial + increment`.
    pub fn tx_data(&self, buffer: &mut T::Buffer, len: usize) -> Result<(), RtpError> {
        if len < RTP_HEADER_LEN || len > buffer.as_ref().len() {
            return Err(RtpError::Api("data length outside buffer"));
        }
        let header = {
            let mut state = self.inner.state.lock();
            // Read under the lock so `last_tx` only ever moves forward.
            let now = self.inner.transport.ntp_now();
            state.timestamp = state
                .timestamp
                .wrapping_add(self.inner.config.timestamp_increment);
            state.sequence = state.sequence.wrapping_add(1);
            match now {
                Ok(now) => {
                    if let Some((prev, _)) = state.last_tx
                        && now > prev
                    {
                        state.ntp_per_tx = now.as_u64() - prev.as_u64();
                    }
                    state.last_tx = Some((now, state.timestamp));
                }
                Err(err) => tracing::warn!(error = %err, "NTP time unavailable for RTP packet"),
            }
            RtpHeader {
                marker: false,
                payload_type: self.inner.config.payload_type,
                sequence: state.sequence,
                timestamp: state.timestamp,
                ssrc: state.ssrc,
            }
        };
        header.write(buffer.as_mut())?;

        let sent = self.inner.transport.transmit(BufferKind::Data, buffer, len);
        let mut state = self.inner.state.lock();
        match sent {
            Ok(()) => {
                state.stats.rtp.packets += 1;
                state.stats.rtp.octets += (len - RTP_HEADER_LEN) as u64;
                state.we_sent = true;
                Ok(())
            }
            Err(err) => {
                state.stats.rtp.failed += 1;
                tracing::warn!(sequence = header.sequence, error = %err, "RTP transmit failed");
                Err(RtpError::Callback(err))
            }
        }
    }

    /// Build and send one SR + SDES compound, returning its length.
    ///
    /// Every failure, clock and allocation included, is counted in
    /// `stats().rtcp.failed` and logged.
    pub fn send_report(&self) -> Result<usize, RtpError> {
        let result = self.build_report();
        let mut state = self.inner.state.lock();
        match &result {
            Ok(n) => {
                state.stats.rtcp.packets += 1;
                state.stats.rtcp.octets += *n as u64;
                state.avg_rtcp_size = interval::update_avg_rtcp_size(state.avg_rtcp_size, *n);
                state.initial = false;
                state.we_sent = false;
                tracing::trace!(len = n, "RTCP sender report sent");
            }
            Err(err) => {
                state.stats.rtcp.failed += 1;
                tracing::warn!(error = %err, "RTCP sender report failed");
            }
        }
        result
    }

    fn build_report(&self) -> Result<usize, RtpError> {
        let cname = self.inner.config.cname.as_bytes();
        let len = rtcp::compound_len(cname.len());
        let mut buffer = self.inner.transport.alloc(BufferKind::Control, len)?;

        // Clock and media state are sampled in one critical section.
        let info = {
            let state = self.inner.state.lock();
            self.inner.transport.ntp_now().map(|now| SenderInfo {
                ssrc: state.ssrc,
                ntp: now,
                rtp_timestamp: self.estimate_timestamp(&state, now),
                packet_count: state.stats.rtp.packets as u32,
                octet_count: state.stats.rtp.octets as u32,
            })
        };
        let result = info.map_err(RtpError::Callback).and_then(|info| {
            let n = rtcp::write_compound(buffer.as_mut(), &info, cname)?;
            self.inner
                .transport
                .transmit(BufferKind::Control, &buffer, n)
                .map(|()| n)
                .map_err(RtpError::Callback)
        });
        self.inner.transport.free(BufferKind::Control, buffer);
        result
    }

    /// Placeholder for RTCP BYE on shutdown; nothing is sent.
    pub fn send_bye(&self) -> Result<(), RtpError> {
        tracing::debug!(ssrc = format_args!("{:#010X}", self.ssrc()), "RTCP BYE not sent");
        Ok(())
    }

    /// Randomized delay until the next report.
    pub fn next_interval(&self) -> Duration {
        let rtcp = &self.inner.config.rtcp;
        let input = {
            let state = self.inner.state.lock();
            IntervalInput {
                members: rtcp.members.max(1),
                senders: u32::from(state.we_sent),
                rtcp_bw: rtcp.session_bandwidth * interval::RTCP_BW_FRACTION,
                we_sent: state.we_sent,
                avg_rtcp_size: state.avg_rtcp_size,
                initial: state.initial,
                min_time: rtcp.min_interval,
            }
        };
        interval::rtcp_interval(&input, rand::random::<f64>())
    }

    /// RTP timestamp matching wall-clock `now`, extrapolated from the last
    /// media packet.
    pub fn estimated_timestamp(&self, now: NtpTimestamp) -> u32 {
        let state = self.inner.state.lock();
        self.estimate_timestamp(&state, now)
    }

    fn estimate_timestamp(&self, state: &State, now: NtpTimestamp) -> u32 {
        match state.last_tx {
            Some((last_ntp, last_ts)) => estimate_rtp_timestamp(
                last_ts,
                last_ntp,
                now,
                state.ntp_per_tx,
                self.inner.config.timestamp_increment,
            ),
            None => state.timestamp,
        }
    }

    /// Validate and count an inbound RTCP compound packet.
    pub fn rx_control(&self, datagram: &[u8]) -> Result<usize, InvalidRtcp> {
        let result = rtcp::validate_compound(datagram);
        let mut state = self.inner.state.lock();
        match &result {
            Ok(_) => state.stats.rtcp_received += 1,
            Err(err) => {
                state.stats.rtcp_invalid += 1;
                tracing::debug!(error = %err, len = datagram.len(), "dropping invalid RTCP");
            }
        }
        result
    }

    /// Run an inbound RTP packet through sequence validation.
    ///
    /// Returns whether the packet counts as valid for its source.
    pub fn rx_data(&self, packet: &[u8]) -> bool {
        let Some(header) = RtpHeader::parse(packet) else {
            return false;
        };
        let mut state = self.inner.state.lock();
        state
            .source
            .get_or_insert_with(|| SourceState::new(header.sequence))
            .update(header.sequence)
    }

    /// Close the current reception interval of the remote source.
    pub fn reception_report(&self) -> Option<LossReport> {
        self.inner.state.lock().source.as_mut().map(SourceState::report)
    }
}

/// `last_ts + (now - last_ntp) * increment / ntp_per_tx`, multiplied first.
///
/// A `now` at or before `last_ntp` yields `last_ts`.
pub fn estimate_rtp_timestamp(
    last_ts: u32,
    last_ntp: NtpTimestamp,
    now: NtpTimestamp,
    ntp_per_tx: u64,
    increment: u32,
) -> u32 {
    if ntp_per_tx == 0 || now <= last_ntp {
        return last_ts;
    }
    let elapsed = u128::from(now.as_u64() - last_ntp.as_u64());
    let ticks = elapsed * u128::from(increment) / u128::from(ntp_per_tx);
    last_ts.wrapping_add(ticks as u32)
}
