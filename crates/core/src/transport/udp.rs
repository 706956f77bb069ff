use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::callback::CallbackResult;
use crate::rtp::{BufferKind, RtpTransport};
use crate::session::PortRange;

/// The server's RTP and RTCP sockets for one resource.
///
/// Bound to the resource's advertised `server_port` pair and shared by every
/// session streaming that resource, so packets leave from the ports the
/// SETUP reply names.
#[derive(Debug, Clone)]
pub struct SocketPair {
    rtp: Arc<UdpSocket>,
    rtcp: Arc<UdpSocket>,
}

impl SocketPair {
    /// Bind `ports` on the unspecified address of `family`'s IP version.
    pub fn bind(family: IpAddr, ports: PortRange) -> std::io::Result<Self> {
        let ip = match family {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let rtp = UdpSocket::bind(SocketAddr::new(ip, ports.rtp))?;
        let rtcp = UdpSocket::bind(SocketAddr::new(ip, ports.rtcp))?;
        let pair = Self {
            rtp: Arc::new(rtp),
            rtcp: Arc::new(rtcp),
        };
        tracing::debug!(ports = %pair.local_ports()?, "UDP sockets bound");
        Ok(pair)
    }

    /// Ports actually bound; differs from the request only for port 0.
    pub fn local_ports(&self) -> std::io::Result<PortRange> {
        Ok(PortRange::new(
            self.rtp.local_addr()?.port(),
            self.rtcp.local_addr()?.port(),
        ))
    }
}

/// UDP delivery of one RTP stream and its RTCP reports.
///
/// Sends data to the client's RTP port and reports to its RTCP port,
/// through the resource's [`SocketPair`].
#[derive(Debug)]
pub struct UdpTransport {
    sockets: SocketPair,
    rtp_addr: SocketAddr,
    rtcp_addr: SocketAddr,
}

impl UdpTransport {
    pub fn new(sockets: &SocketPair, client: IpAddr, ports: PortRange) -> Self {
        tracing::debug!(%client, client_ports = %ports, "UDP transport created");
        Self {
            sockets: sockets.clone(),
            rtp_addr: SocketAddr::new(client, ports.rtp),
            rtcp_addr: SocketAddr::new(client, ports.rtcp),
        }
    }

    pub fn destination(&self, kind: BufferKind) -> SocketAddr {
        match kind {
            BufferKind::Data => self.rtp_addr,
            BufferKind::Control => self.rtcp_addr,
        }
    }

    fn socket(&self, kind: BufferKind) -> &UdpSocket {
        match kind {
            BufferKind::Data => &self.sockets.rtp,
            BufferKind::Control => &self.sockets.rtcp,
        }
    }
}

impl RtpTransport for UdpTransport {
    type Buffer = Vec<u8>;

    fn alloc(&self, _kind: BufferKind, len: usize) -> CallbackResult<Vec<u8>> {
        Ok(vec![0; len])
    }

    fn transmit(&self, kind: BufferKind, buffer: &Vec<u8>, len: usize) -> CallbackResult {
        let bytes = buffer.get(..len).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "length exceeds buffer")
        })?;
        self.socket(kind).send_to(bytes, self.destination(kind))?;
        Ok(())
    }
}
