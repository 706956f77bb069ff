//! Reference socket collaborators built on `std::net`.
//!
//! - **TCP** ([`tcp`]): RTSP signaling. One thread per connection feeds
//!   whole requests into a shared [`Server`](crate::Server).
//! - **UDP** ([`udp`]): an [`RtpTransport`](crate::RtpTransport) that sends
//!   RTP and RTCP from the resource's server ports to one client's port pair.

pub mod tcp;
pub mod udp;

pub use tcp::{Peer, TcpServer};
pub use udp::{SocketPair, UdpTransport};
