//! RTCP Sender Report and Source Description packets (RFC 3550 §6.4, §6.5).
//!
//! The server only sends one compound shape: an SR with no report blocks
//! followed by an SDES chunk holding a single CNAME item.
//!
//! ```text
//! SR:   |V=2|P|RC=0| PT=200 | length |  SSRC  | NTP sec | NTP frac |
//!       | RTP timestamp | packet count | octet count |        28 octets
//! SDES: |V=2|P|SC=1| PT=202 | length |  SSRC  | CNAME=1 | len | text |
//!       | END + zero pad to 32 bits |
//! ```

use crate::callback::NtpTimestamp;
use crate::error::RtpError;

pub const PT_SR: u8 = 200;
pub const PT_RR: u8 = 201;
pub const PT_SDES: u8 = 202;
pub const PT_BYE: u8 = 203;

pub const SDES_CNAME: u8 = 1;

/// Common header plus the 20-octet sender info block.
pub const SENDER_REPORT_LEN: usize = 28;

const COMMON_HEADER_LEN: usize = 4;
/// Common header plus the chunk's SSRC.
const SDES_HEADER_LEN: usize = 8;
/// Item type and length octets.
const SDES_ITEM_HEADER_LEN: usize = 2;

/// Longest CNAME an SDES item can carry.
pub const MAX_CNAME_LEN: usize = 255;

/// Fields of an outgoing Sender Report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderInfo {
    pub ssrc: u32,
    pub ntp: NtpTimestamp,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

/// Zero octets after a CNAME item, END marker included.
///
/// The chunk must end on a 32-bit boundary with at least one null octet
/// (RFC 3550 §6.5), so this is always in `1..=4`.
pub const fn sdes_padding(cname_len: usize) -> usize {
    4 - (SDES_ITEM_HEADER_LEN + cname_len) % 4
}

pub const fn sdes_len(cname_len: usize) -> usize {
    SDES_HEADER_LEN + SDES_ITEM_HEADER_LEN + cname_len + sdes_padding(cname_len)
}

/// Size of the SR + SDES compound packet.
pub const fn compound_len(cname_len: usize) -> usize {
    SENDER_REPORT_LEN + sdes_len(cname_len)
}

/// RTCP `length` field: packet size in 32-bit words minus one.
const fn length_field(octets: usize) -> u16 {
    (octets / 4 - 1) as u16
}

fn common_header(count: u8, packet_type: u8, octets: usize) -> [u8; COMMON_HEADER_LEN] {
    let mut header = [0u8; COMMON_HEADER_LEN];
    header[0] = (2 << 6) | (count & 0x1f);
    header[1] = packet_type;
    header[2..4].copy_from_slice(&length_field(octets).to_be_bytes());
    header
}

/// Write SR followed by SDES into `buf`, returning the compound length.
pub fn write_compound(buf: &mut [u8], info: &SenderInfo, cname: &[u8]) -> Result<usize, RtpError> {
    if cname.len() > MAX_CNAME_LEN {
        return Err(RtpError::Api("CNAME longer than 255 octets"));
    }
    let total = compound_len(cname.len());
    let out = buf
        .get_mut(..total)
        .ok_or(RtpError::Api("buffer shorter than RTCP compound packet"))?;

    let (sr, sdes) = out.split_at_mut(SENDER_REPORT_LEN);
    sr[0..4].copy_from_slice(&common_header(0, PT_SR, SENDER_REPORT_LEN));
    sr[4..8].copy_from_slice(&info.ssrc.to_be_bytes());
    sr[8..12].copy_from_slice(&info.ntp.seconds.to_be_bytes());
    sr[12..16].copy_from_slice(&info.ntp.fraction.to_be_bytes());
    sr[16..20].copy_from_slice(&info.rtp_timestamp.to_be_bytes());
    sr[20..24].copy_from_slice(&info.packet_count.to_be_bytes());
    sr[24..28].copy_from_slice(&info.octet_count.to_be_bytes());

    let sdes_len = sdes.len();
    sdes[0..4].copy_from_slice(&common_header(1, PT_SDES, sdes_len));
    sdes[4..8].copy_from_slice(&info.ssrc.to_be_bytes());
    sdes[8] = SDES_CNAME;
    sdes[9] = cname.len() as u8;
    let text_end = 10 + cname.len();
    sdes[10..text_end].copy_from_slice(cname);
    sdes[text_end..].fill(0);

    Ok(total)
}

/// Reasons an inbound RTCP compound packet is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRtcp {
    #[error("packet shorter than an RTCP header")]
    Truncated,
    #[error("RTCP version is not 2")]
    Version,
    #[error("compound packet does not start with SR or RR")]
    FirstPacket,
    #[error("padding bit set before the last packet")]
    Padding,
    #[error("packet lengths do not add up to the datagram")]
    Length,
}

/// Header validity checks of RFC 3550 A.2.
///
/// Returns the number of packets in the compound. Packet contents are not
/// interpreted.
pub fn validate_compound(datagram: &[u8]) -> Result<usize, InvalidRtcp> {
    if datagram.len() < COMMON_HEADER_LEN {
        return Err(InvalidRtcp::Truncated);
    }
    let first_type = datagram[1];
    if first_type != PT_SR && first_type != PT_RR {
        return Err(InvalidRtcp::FirstPacket);
    }

    let mut rest = datagram;
    let mut packets = 0;
    while !rest.is_empty() {
        if rest.len() < COMMON_HEADER_LEN {
            return Err(InvalidRtcp::Length);
        }
        if rest[0] >> 6 != 2 {
            return Err(InvalidRtcp::Version);
        }
        let len = (usize::from(u16::from_be_bytes([rest[2], rest[3]])) + 1) * 4;
        if len > rest.len() {
            return Err(InvalidRtcp::Length);
        }
        let padded = rest[0] & 0x20 != 0;
        rest = &rest[len..];
        if padded && !rest.is_empty() {
            return Err(InvalidRtcp::Padding);
        }
        packets += 1;
    }
    Ok(packets)
}
