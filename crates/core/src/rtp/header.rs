use crate::error::RtpError;

/// Size of the fixed RTP header without CSRCs.
pub const RTP_HEADER_LEN: usize = 12;

const RTP_VERSION: u8 = 2;

/// RTP fixed header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Outgoing headers always carry padding, extension and CSRC count of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    pub fn to_bytes(&self) -> [u8; RTP_HEADER_LEN] {
        let mut header = [0u8; RTP_HEADER_LEN];
        header[0] = RTP_VERSION << 6;
        header[1] = ((self.marker as u8) << 7) | (self.payload_type & 0x7f);
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        header
    }

    /// Serialize into the first [`RTP_HEADER_LEN`] bytes of `buf`.
    pub fn write(&self, buf: &mut [u8]) -> Result<(), RtpError> {
        let dst = buf
            .get_mut(..RTP_HEADER_LEN)
            .ok_or(RtpError::Api("buffer shorter than RTP header"))?;
        dst.copy_from_slice(&self.to_bytes());
        Ok(())
    }

    /// Read the fixed header of a received packet.
    ///
    /// Returns `None` for short packets or a version other than 2.
    pub fn parse(packet: &[u8]) -> Option<Self> {
        let fixed = packet.get(..RTP_HEADER_LEN)?;
        if fixed[0] >> 6 != RTP_VERSION {
            return None;
        }
        Some(Self {
            marker: fixed[1] & 0x80 != 0,
            payload_type: fixed[1] & 0x7f,
            sequence: u16::from_be_bytes([fixed[2], fixed[3]]),
            timestamp: u32::from_be_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]),
            ssrc: u32::from_be_bytes([fixed[8], fixed[9], fixed[10], fixed[11]]),
        })
    }
}
