//! RTP sender and RTCP reports against an in-memory transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rtsp::rtp::rtcp::InvalidRtcp;
use rtsp::rtp::{BufferKind, RtpHeader};
use rtsp::{
    CallbackError, CallbackResult, NtpTimestamp, RtcpConfig, RtpError, RtpSession,
    RtpSessionConfig, RtpTransport,
};

const TEN_MS: u64 = (1u64 << 32) / 100;

struct MemoryTransport {
    sent: Mutex<Vec<(BufferKind, Vec<u8>)>>,
    randoms: Mutex<VecDeque<u32>>,
    clock: Mutex<u64>,
    fail: AtomicBool,
    clock_fails: AtomicBool,
    /// Runs once, inside the next control-buffer allocation.
    on_control_alloc: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl MemoryTransport {
    fn new(randoms: &[u32]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            randoms: Mutex::new(randoms.iter().copied().collect()),
            clock: Mutex::new(NtpTimestamp::new(3_900_000_000, 0).as_u64()),
            fail: AtomicBool::new(false),
            clock_fails: AtomicBool::new(false),
            on_control_alloc: Mutex::new(None),
        }
    }

    fn sent(&self, kind: BufferKind) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }
}

impl RtpTransport for MemoryTransport {
    type Buffer = Vec<u8>;

    fn alloc(&self, kind: BufferKind, len: usize) -> CallbackResult<Vec<u8>> {
        if kind == BufferKind::Control {
            let hook = self.on_control_alloc.lock().take();
            if let Some(hook) = hook {
                hook();
            }
        }
        Ok(vec![0; len])
    }

    fn transmit(&self, kind: BufferKind, buffer: &Vec<u8>, len: usize) -> CallbackResult {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CallbackError::new("unreachable"));
        }
        self.sent.lock().push((kind, buffer[..len].to_vec()));
        Ok(())
    }

    /// Advances 10 ms per reading.
    fn ntp_now(&self) -> CallbackResult<NtpTimestamp> {
        if self.clock_fails.load(Ordering::SeqCst) {
            return Err(CallbackError::new("clock unavailable"));
        }
        let mut clock = self.clock.lock();
        let now = NtpTimestamp::from_u64(*clock);
        *clock += TEN_MS;
        Ok(now)
    }

    fn random_u32(&self) -> CallbackResult<u32> {
        Ok(self.randoms.lock().pop_front().unwrap_or(0))
    }
}

fn config(cname: &str) -> RtpSessionConfig {
    RtpSessionConfig {
        payload_type: 96,
        timestamp_increment: 480,
        ssrc: Some(0x1234_5678),
        cname: cname.to_string(),
        rtcp: RtcpConfig::default(),
    }
}

fn session(randoms: &[u32]) -> RtpSession<MemoryTransport> {
    RtpSession::new(config("abcde"), MemoryTransport::new(randoms)).unwrap()
}

fn send_packet(rtp: &RtpSession<MemoryTransport>, payload: usize) -> Result<(), RtpError> {
    let len = rtp.payload_offset() + payload;
    let mut buffer = rtp.alloc_data(len)?;
    buffer[rtp.payload_offset()..].fill(0x55);
    let result = rtp.tx_data(&mut buffer, len);
    rtp.free_data(buffer);
    result
}

#[test]
fn first_packet_advances_from_initial_values() {
    // Sequence then timestamp are drawn when the SSRC is fixed.
    let rtp = session(&[0xFFFF, 1000]);
    assert_eq!(rtp.ssrc(), 0x1234_5678);
    assert_eq!(rtp.sequence(), 0xFFFF);
    assert_eq!(rtp.timestamp(), 1000);

    send_packet(&rtp, 960).unwrap();
    send_packet(&rtp, 960).unwrap();

    let packets = rtp.transport().sent(BufferKind::Data);
    assert_eq!(packets.len(), 2);
    let first = RtpHeader::parse(&packets[0]).unwrap();
    assert_eq!(first.sequence, 0);
    assert_eq!(first.timestamp, 1480);
    assert_eq!(first.ssrc, 0x1234_5678);
    assert_eq!(first.payload_type, 96);
    assert!(!first.marker);
    let second = RtpHeader::parse(&packets[1]).unwrap();
    assert_eq!(second.sequence, 1);
    assert_eq!(second.timestamp, 1960);
    assert_eq!(packets[1].len(), 12 + 960);
    assert!(packets[1][12..].iter().all(|&b| b == 0x55));

    let stats = rtp.stats();
    assert_eq!(stats.rtp.packets, 2);
    assert_eq!(stats.rtp.octets, 2 * 960);
    assert_eq!(stats.rtp.failed, 0);
}

#[test]
fn random_ssrc_is_drawn_first() {
    let rtp = RtpSession::new(
        RtpSessionConfig {
            ssrc: None,
            ..config("x")
        },
        MemoryTransport::new(&[0xCAFE_F00D, 7, 9]),
    )
    .unwrap();
    assert_eq!(rtp.ssrc(), 0xCAFE_F00D);
    assert_eq!(rtp.sequence(), 7);
    assert_eq!(rtp.timestamp(), 9);
}

#[test]
fn overlong_cname_rejected() {
    let result = RtpSession::new(config(&"c".repeat(256)), MemoryTransport::new(&[]));
    assert!(matches!(result, Err(RtpError::Api(_))));
}

#[test]
fn failed_transmit_is_counted() {
    let rtp = session(&[10, 0]);
    rtp.transport().fail.store(true, Ordering::SeqCst);
    assert!(matches!(send_packet(&rtp, 100), Err(RtpError::Callback(_))));
    let stats = rtp.stats();
    assert_eq!(stats.rtp.failed, 1);
    assert_eq!(stats.rtp.packets, 0);
    assert_eq!(stats.rtp.octets, 0);
}

#[test]
fn data_length_must_cover_header_and_fit_buffer() {
    let rtp = session(&[10, 0]);
    let mut buffer = rtp.alloc_data(20).unwrap();
    assert!(matches!(rtp.tx_data(&mut buffer, 11), Err(RtpError::Api(_))));
    assert!(matches!(rtp.tx_data(&mut buffer, 21), Err(RtpError::Api(_))));
    assert!(rtp.transport().sent(BufferKind::Data).is_empty());
}

#[test]
fn sender_report_layout() {
    let rtp = session(&[10, 5000]);
    send_packet(&rtp, 960).unwrap();
    send_packet(&rtp, 960).unwrap();

    assert_eq!(rtp.send_report().unwrap(), 44);
    let reports = rtp.transport().sent(BufferKind::Control);
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.len(), 44);

    // SR header: V=2, RC=0, length 6 words.
    assert_eq!(report[0], 0x80);
    assert_eq!(report[1], 200);
    assert_eq!(u16::from_be_bytes([report[2], report[3]]), 6);
    assert_eq!(&report[4..8], &0x1234_5678u32.to_be_bytes());
    // One packet interval after the second packet: 480 ticks on.
    let rtp_ts = u32::from_be_bytes(report[16..20].try_into().unwrap());
    assert_eq!(rtp_ts, 5000 + 3 * 480);
    assert_eq!(u32::from_be_bytes(report[20..24].try_into().unwrap()), 2);
    assert_eq!(u32::from_be_bytes(report[24..28].try_into().unwrap()), 1920);

    // SDES: V=2, SC=1, length 3 words, CNAME item, END padding.
    assert_eq!(report[28], 0x81);
    assert_eq!(report[29], 202);
    assert_eq!(u16::from_be_bytes([report[30], report[31]]), 3);
    assert_eq!(&report[32..36], &0x1234_5678u32.to_be_bytes());
    assert_eq!(report[36], 1);
    assert_eq!(report[37], 5);
    assert_eq!(&report[38..43], b"abcde");
    assert_eq!(report[43], 0);

    let stats = rtp.stats();
    assert_eq!(stats.rtcp.packets, 1);
    assert_eq!(stats.rtcp.octets, 44);
}

#[test]
fn media_sent_while_report_allocates_is_not_ahead_of_report_clock() {
    let rtp = session(&[10, 5000]);
    send_packet(&rtp, 960).unwrap();
    send_packet(&rtp, 960).unwrap();

    let media = rtp.clone();
    *rtp.transport().on_control_alloc.lock() = Some(Box::new(move || {
        send_packet(&media, 960).unwrap();
    }));
    rtp.send_report().unwrap();

    let report = &rtp.transport().sent(BufferKind::Control)[0];
    // Third packet carries 5000 + 3 * 480; the report clock is one packet later.
    let rtp_ts = u32::from_be_bytes(report[16..20].try_into().unwrap());
    assert_eq!(rtp_ts, 5000 + 4 * 480);
    assert_eq!(u32::from_be_bytes(report[20..24].try_into().unwrap()), 3);
}

#[test]
fn report_without_clock_is_counted_as_failed() {
    let rtp = session(&[10, 0]);
    rtp.transport().clock_fails.store(true, Ordering::SeqCst);
    assert!(matches!(rtp.send_report(), Err(RtpError::Callback(_))));
    let stats = rtp.stats();
    assert_eq!(stats.rtcp.failed, 1);
    assert_eq!(stats.rtcp.packets, 0);
    assert!(rtp.transport().sent(BufferKind::Control).is_empty());
}

#[test]
fn report_before_any_media_uses_initial_timestamp() {
    let rtp = session(&[10, 777]);
    rtp.send_report().unwrap();
    let report = &rtp.transport().sent(BufferKind::Control)[0];
    assert_eq!(u32::from_be_bytes(report[16..20].try_into().unwrap()), 777);
    assert_eq!(u32::from_be_bytes(report[20..24].try_into().unwrap()), 0);
}

#[test]
fn failed_report_is_counted() {
    let rtp = session(&[10, 0]);
    rtp.transport().fail.store(true, Ordering::SeqCst);
    assert!(rtp.send_report().is_err());
    assert_eq!(rtp.stats().rtcp.failed, 1);
    assert_eq!(rtp.stats().rtcp.packets, 0);
}

#[test]
fn first_interval_is_halved_floor_or_more() {
    let rtp = session(&[10, 0]);
    let interval = rtp.next_interval();
    // Randomized over [0.5, 1.5] of 2.5 s, then compensated.
    let compensation = std::f64::consts::E - 1.5;
    let low = Duration::from_secs_f64(2.5 * 0.5 / compensation);
    let high = Duration::from_secs_f64(2.5 * 1.5 / compensation);
    assert!(interval >= low && interval <= high, "{interval:?}");
}

#[test]
fn inbound_rtcp_validation_counts() {
    let rtp = session(&[10, 0]);
    rtp.send_report().unwrap();
    let report = rtp.transport().sent(BufferKind::Control).remove(0);

    assert_eq!(rtp.rx_control(&report), Ok(2));
    assert_eq!(rtp.rx_control(&report[..40]), Err(InvalidRtcp::Length));
    // SDES alone may not open a compound.
    assert_eq!(rtp.rx_control(&report[28..]), Err(InvalidRtcp::FirstPacket));

    let stats = rtp.stats();
    assert_eq!(stats.rtcp_received, 1);
    assert_eq!(stats.rtcp_invalid, 2);
}

#[test]
fn inbound_rtp_sequence_validation() {
    let sender = session(&[100, 0]);
    for _ in 0..5 {
        send_packet(&sender, 8).unwrap();
    }
    let packets = sender.transport().sent(BufferKind::Data);

    let receiver = session(&[1, 0]);
    assert!(receiver.reception_report().is_none());
    assert!(!receiver.rx_data(&packets[0]));
    assert!(receiver.rx_data(&packets[1]));
    // packets[2] is lost.
    assert!(receiver.rx_data(&packets[3]));
    assert!(receiver.rx_data(&packets[4]));
    assert!(!receiver.rx_data(b"short"));

    let report = receiver.reception_report().unwrap();
    assert_eq!(report.cumulative_lost, 1);
    assert_eq!(report.extended_max_seq, 105);
}
