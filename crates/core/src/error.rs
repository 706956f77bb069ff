//! Error types for the RTSP and RTP/RTCP cores.

use std::fmt;

use crate::callback::CallbackError;

/// Errors raised by the RTSP control plane.
///
/// Variants follow the failure taxonomy of the request pipeline:
///
/// - **Input**: [`Parse`](Self::Parse) for malformed bytes and
///   [`Invalid`](Self::Invalid) for well-formed requests the server will not
///   honour. Both are recoverable; the connection may carry on.
/// - **Lookup**: [`ResourceNotFound`](Self::ResourceNotFound),
///   [`SessionNotFound`](Self::SessionNotFound).
/// - **Capacity**: [`NoCapacity`](Self::NoCapacity) when a fixed table is full.
/// - **Collaborator**: [`Callback`](Self::Callback), typically followed by
///   the transport closing the connection.
/// - **Guard**: [`Internal`](Self::Internal) when a bounded write would have
///   overflowed. Always reported to the client as `500`.
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// The request bytes could not be parsed.
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The request parsed but cannot be served as asked.
    #[error("invalid request: {0}")]
    Invalid(&'static str),

    /// No resource is registered at the request path.
    #[error("resource not found")]
    ResourceNotFound,

    /// No session matches the request's `Session` header.
    #[error("session not found")]
    SessionNotFound,

    /// A fixed-capacity table has no free slot.
    #[error("no capacity left for {0}")]
    NoCapacity(&'static str),

    /// A collaborator callback reported failure.
    #[error("callback failed: {0}")]
    Callback(#[from] CallbackError),

    /// A bounded write or internal consistency check tripped.
    #[error("internal error: {0}")]
    Internal(&'static str),

    /// Socket failure in the reference transports.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RtspError {
    pub(crate) fn parse(kind: ParseErrorKind) -> Self {
        Self::Parse { kind }
    }
}

/// Specific kind of RTSP parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The receive buffer was empty.
    EmptyBuffer,
    /// No CRLF terminator before the end of the buffer.
    MalformedLine,
    /// A cursor advance ran past the current line or buffer.
    OutOfRange,
    /// The request line did not start with a known method.
    UnknownMethod,
    /// The request line did not have the `METHOD SP URI SP VERSION` shape.
    InvalidRequestLine,
    /// The version token was not `RTSP/1.0`.
    UnsupportedVersion,
    /// The request carried no `CSeq` header.
    MissingCSeq,
    /// No transport-spec in the `Transport` header starts with `RTP/AVP`.
    UnsupportedTransport,
    /// `client_port=` was not two bounded decimal numbers joined by `-`.
    InvalidPortRange,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EmptyBuffer => "empty buffer",
            Self::MalformedLine => "line without CRLF terminator",
            Self::OutOfRange => "advance past end of line",
            Self::UnknownMethod => "unknown method",
            Self::InvalidRequestLine => "invalid request line",
            Self::UnsupportedVersion => "unsupported RTSP version",
            Self::MissingCSeq => "missing CSeq header",
            Self::UnsupportedTransport => "unsupported transport",
            Self::InvalidPortRange => "invalid client_port range",
        };
        f.write_str(text)
    }
}

/// Errors raised by the RTP/RTCP transport plane.
#[derive(Debug, thiserror::Error)]
pub enum RtpError {
    /// The caller violated an API precondition (e.g. a buffer too short for
    /// the RTP header).
    #[error("RTP API misuse: {0}")]
    Api(&'static str),

    /// A transport, clock or random-number collaborator failed.
    #[error("RTP callback failed: {0}")]
    Callback(#[from] CallbackError),

    /// The operating system refused a resource (thread spawn).
    #[error("RTP OS error: {0}")]
    Os(#[from] std::io::Error),
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
