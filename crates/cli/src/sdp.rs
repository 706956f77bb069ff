//! SDP for the single L16 audio resource (RFC 4566, RFC 3551 §4.5.11).
//!
//! ```text
//! v=0
//! o=<user> <sess-id> 1 IN IP4 <addr>
//! s=<session-name>
//! c=IN IP4 <addr>
//! t=0 0
//! a=tool:rtsp-audio
//! a=sendonly
//! m=audio 0 RTP/AVP 96
//! a=rtpmap:96 L16/<rate>/<channels>
//! a=ptime:<ms>
//! ```

use std::time::Duration;

/// Audio parameters advertised to clients.
#[derive(Debug, Clone)]
pub struct AudioFormat {
    pub payload_type: u8,
    pub sample_rate: u32,
    pub channels: u8,
    pub samples_per_packet: u32,
}

impl AudioFormat {
    /// RTP timestamp advance per packet.
    pub fn timestamp_increment(&self) -> u32 {
        self.samples_per_packet
    }

    /// Payload octets per packet (16-bit samples).
    pub fn payload_len(&self) -> usize {
        self.samples_per_packet as usize * usize::from(self.channels) * 2
    }

    /// Wall-clock length of one packet, the sender's pacing period.
    pub fn packet_duration(&self) -> Duration {
        Duration::from_secs_f64(
            f64::from(self.samples_per_packet) / f64::from(self.sample_rate.max(1)),
        )
    }

    pub fn packet_millis(&self) -> u64 {
        u64::from(self.samples_per_packet) * 1000 / u64::from(self.sample_rate.max(1))
    }
}

pub fn generate_sdp(format: &AudioFormat, ip: &str, session_id: u32, session_name: &str) -> String {
    let lines = [
        "v=0".to_string(),
        format!("o=- {session_id} 1 IN IP4 {ip}"),
        format!("s={session_name}"),
        format!("c=IN IP4 {ip}"),
        "t=0 0".to_string(),
        "a=tool:rtsp-audio".to_string(),
        "a=sendonly".to_string(),
        format!("m=audio 0 RTP/AVP {}", format.payload_type),
        format!(
            "a=rtpmap:{} L16/{}/{}",
            format.payload_type, format.sample_rate, format.channels
        ),
        format!("a=ptime:{}", format.packet_millis()),
    ];
    let sdp = lines.join("\r\n");
    tracing::debug!("SDP: {sdp}");
    format!("{sdp}\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> AudioFormat {
        AudioFormat {
            payload_type: 96,
            sample_rate: 48000,
            channels: 1,
            samples_per_packet: 480,
        }
    }

    #[test]
    fn generates_l16_sdp() {
        let sdp = generate_sdp(&format(), "192.168.1.100", 42, "Tone");
        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=- 42 1 IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("c=IN IP4 192.168.1.100\r\n"));
        assert!(sdp.contains("m=audio 0 RTP/AVP 96\r\n"));
        assert!(sdp.contains("a=rtpmap:96 L16/48000/1\r\n"));
        assert!(sdp.contains("a=ptime:10\r\n"));

        let sendonly = sdp.find("a=sendonly").unwrap();
        let media = sdp.find("m=audio").unwrap();
        assert!(sendonly < media, "session-level attrs must precede m= line");
        assert!(sdp.ends_with("\r\n"));
    }

    #[test]
    fn packet_sizes() {
        let f = format();
        assert_eq!(f.payload_len(), 960);
        assert_eq!(f.timestamp_increment(), 480);
    }

    #[test]
    fn packet_duration_keeps_fractional_millis() {
        let f = AudioFormat {
            samples_per_packet: 160,
            ..format()
        };
        let period = f.packet_duration().as_secs_f64();
        assert!((period - 160.0 / 48000.0).abs() < 1e-9, "{period}");
        assert_eq!(f.packet_millis(), 3);
    }
}
