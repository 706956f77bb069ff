//! RTCP transmission interval (RFC 3550 §6.3.1, Appendix A.7).

use std::time::Duration;

/// Share of the RTCP bandwidth reserved for senders.
pub const SENDER_BW_FRACTION: f64 = 0.25;
/// Share of the RTCP bandwidth reserved for receivers.
pub const RCVR_BW_FRACTION: f64 = 1.0 - SENDER_BW_FRACTION;
/// Share of the session bandwidth given to RTCP.
pub const RTCP_BW_FRACTION: f64 = 0.05;
/// Lower bound on the deterministic interval.
pub const RTCP_MIN_TIME: Duration = Duration::from_secs(5);
/// Undoes the bias of timer reconsideration toward shorter intervals.
pub const COMPENSATION: f64 = std::f64::consts::E - 1.5;

/// UDP over IPv4 header overhead added to each RTCP packet size.
pub const UDP_IP_OVERHEAD: usize = 28;

/// Inputs of one interval computation.
#[derive(Debug, Clone, Copy)]
pub struct IntervalInput {
    /// Session members, this participant included.
    pub members: u32,
    /// Members that sent RTP since the last report.
    pub senders: u32,
    /// RTCP bandwidth in octets per second.
    pub rtcp_bw: f64,
    pub we_sent: bool,
    /// Smoothed compound packet size in octets, transport overhead included.
    pub avg_rtcp_size: f64,
    /// No report has been sent yet.
    pub initial: bool,
    pub min_time: Duration,
}

/// Compute the randomized interval until the next report.
///
/// `random` is uniform in `[0, 1)`; it scales the deterministic interval by
/// `[0.5, 1.5)`.
pub fn rtcp_interval(input: &IntervalInput, random: f64) -> Duration {
    let mut min_time = input.min_time.as_secs_f64();
    if input.initial {
        min_time /= 2.0;
    }

    let mut rtcp_bw = input.rtcp_bw;
    let mut n = f64::from(input.members);
    if f64::from(input.senders) <= f64::from(input.members) * SENDER_BW_FRACTION {
        if input.we_sent {
            rtcp_bw *= SENDER_BW_FRACTION;
            n = f64::from(input.senders);
        } else {
            rtcp_bw *= RCVR_BW_FRACTION;
            n -= f64::from(input.senders);
        }
    }

    let mut t = input.avg_rtcp_size * n / rtcp_bw;
    if !t.is_finite() || t < min_time {
        t = min_time;
    }

    t *= random.clamp(0.0, 1.0) + 0.5;
    t /= COMPENSATION;
    Duration::from_secs_f64(t)
}

/// Fold one sent packet into the smoothed average (RFC 3550 §6.3.3).
pub fn update_avg_rtcp_size(avg: f64, packet_len: usize) -> f64 {
    let size = (packet_len + UDP_IP_OVERHEAD) as f64;
    size / 16.0 + avg * 15.0 / 16.0
}
