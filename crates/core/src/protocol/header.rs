//! Recognised request headers and their decoders.
//!
//! Matching is a case-sensitive prefix comparison against `"Name: "`.
//! Header lines that match nothing are skipped.

use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::buffer::{LineBuffer, find_bytes};
use crate::session::{PortRange, SessionId};

/// How many `Require` option-tags are kept; later ones are only counted.
pub const MAX_REQUIRE: usize = 3;

/// Longest decimal port accepted in `client_port=`.
const MAX_PORT_DIGITS: usize = 5;

/// The closed set of headers the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderName {
    CSeq,
    Accept,
    Transport,
    Session,
    Require,
    Connection,
}

impl HeaderName {
    pub const ALL: [HeaderName; 6] = [
        HeaderName::CSeq,
        HeaderName::Accept,
        HeaderName::Transport,
        HeaderName::Session,
        HeaderName::Require,
        HeaderName::Connection,
    ];

    /// Literal that introduces the header, separator included.
    pub const fn prefix(self) -> &'static [u8] {
        match self {
            HeaderName::CSeq => b"CSeq: ",
            HeaderName::Accept => b"Accept: ",
            HeaderName::Transport => b"Transport: ",
            HeaderName::Session => b"Session: ",
            HeaderName::Require => b"Require: ",
            HeaderName::Connection => b"Connection: ",
        }
    }

    /// Identify the header on `line`, if it is one we decode.
    pub fn identify(line: &[u8]) -> Option<HeaderName> {
        Self::ALL
            .into_iter()
            .find(|name| line.starts_with(name.prefix()))
    }
}

/// Value of the `Connection` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connection {
    #[default]
    Unrecognised,
    Close,
    KeepAlive,
}

/// The transport-spec chosen from a `Transport` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportSpec {
    pub unicast: bool,
    pub client_port: Option<PortRange>,
}

/// `Require` option-tags the server does not support.
#[derive(Debug, Clone, Copy, Default)]
pub struct Require<'a> {
    tags: [&'a [u8]; MAX_REQUIRE],
    count: usize,
}

impl<'a> Require<'a> {
    /// Number of `Require` headers seen, including ones not stored.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Stored option-tags, in arrival order.
    pub fn tags(&self) -> &[&'a [u8]] {
        &self.tags[..self.count.min(MAX_REQUIRE)]
    }

    fn push(&mut self, tag: &'a [u8]) {
        if self.count < MAX_REQUIRE {
            self.tags[self.count] = tag;
        }
        self.count += 1;
    }
}

/// Decoded header bag of one request.
///
/// Byte spans borrow from the receive buffer; the session id is copied.
#[derive(Debug, Clone, Default)]
pub struct Headers<'a> {
    /// The entire `CSeq` line, echoed verbatim in the reply.
    pub cseq: Option<&'a [u8]>,
    pub accept_sdp: bool,
    pub transport: Option<TransportSpec>,
    pub session_id: Option<SessionId>,
    pub require: Require<'a>,
    pub connection: Connection,
}

impl<'a> Headers<'a> {
    /// Decode one header line.
    ///
    /// `line` is the whole header line without its terminator and `value`
    /// is a cursor positioned just after the name and separator.
    pub fn decode(
        &mut self,
        name: HeaderName,
        line: &'a [u8],
        value: &mut LineBuffer<'a>,
    ) -> Result<()> {
        match name {
            HeaderName::CSeq => self.cseq = Some(line),
            HeaderName::Accept => {
                self.accept_sdp = find_bytes(value.line(), b"application/sdp").is_some();
            }
            HeaderName::Transport => self.transport = Some(decode_transport(value.line())?),
            HeaderName::Session => self.session_id = Some(decode_session(value)),
            HeaderName::Require => self.require.push(value.line()),
            HeaderName::Connection => {
                self.connection = match value.line() {
                    b"close" => Connection::Close,
                    b"Keep-Alive" => Connection::KeepAlive,
                    _ => Connection::Unrecognised,
                };
            }
        }
        Ok(())
    }
}

fn decode_session(value: &mut LineBuffer<'_>) -> SessionId {
    let line = value.line();
    let mut params = *value;
    let id = if params.advance_to_after_char(b';', 0) {
        // `;timeout=N` is not acted on.
        &line[..line.len() - params.line_len() - 1]
    } else {
        line
    };
    SessionId::from_bytes_truncated(id)
}

/// Pick a transport-spec out of a comma-separated `Transport` value.
///
/// The first `RTP/AVP` (or `RTP/AVP/UDP`) spec marked `unicast` wins. When no
/// such spec is unicast the first RTP/AVP spec is returned as-is so the caller
/// can reject it. A value with no RTP/AVP spec at all fails with
/// [`ParseErrorKind::UnsupportedTransport`].
fn decode_transport(value: &[u8]) -> Result<TransportSpec> {
    let mut fallback = None;
    for spec in value.split(|&b| b == b',') {
        let Some(parsed) = decode_transport_spec(spec.trim_ascii())? else {
            continue;
        };
        if parsed.unicast {
            return Ok(parsed);
        }
        fallback.get_or_insert(parsed);
    }
    fallback.ok_or(RtspError::parse(ParseErrorKind::UnsupportedTransport))
}

fn decode_transport_spec(spec: &[u8]) -> Result<Option<TransportSpec>> {
    let protocol = spec.split(|&b| b == b';').next().unwrap_or_default();
    if protocol != b"RTP/AVP" && protocol != b"RTP/AVP/UDP" {
        return Ok(None);
    }

    let mut cursor = LineBuffer::from_line(spec);
    let mut transport = TransportSpec::default();
    while cursor.advance_to_after_char(b';', 0) {
        let rest = cursor.line();
        let end = rest.iter().position(|&b| b == b';').unwrap_or(rest.len());
        let param = &rest[..end];
        if param == b"unicast" {
            transport.unicast = true;
        } else if let Some(ports) = param.strip_prefix(b"client_port=") {
            transport.client_port = Some(parse_port_range(ports)?);
        }
    }
    Ok(Some(transport))
}

/// Parse `low-high`, two bounded decimal ports.
pub(crate) fn parse_port_range(text: &[u8]) -> Result<PortRange> {
    let invalid = || RtspError::parse(ParseErrorKind::InvalidPortRange);
    let dash = text.iter().position(|&b| b == b'-').ok_or_else(invalid)?;
    let rtp = parse_port(&text[..dash]).ok_or_else(invalid)?;
    let rtcp = parse_port(&text[dash + 1..]).ok_or_else(invalid)?;
    Ok(PortRange { rtp, rtcp })
}

fn parse_port(digits: &[u8]) -> Option<u16> {
    if digits.is_empty() || digits.len() > MAX_PORT_DIGITS {
        return None;
    }
    let mut value: u32 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value * 10 + u32::from(b - b'0');
    }
    u16::try_from(value).ok()
}
