use std::fmt::{self, Write as _};

use crate::error::{Result, RtspError};

/// Value of the `Public` header in OPTIONS replies.
pub const PUBLIC_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN";

/// RTSP status codes the server emits (RFC 2326 §7.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    ParameterNotUnderstood,
    SessionNotFound,
    MethodNotValidInThisState,
    InvalidRange,
    UnsupportedTransport,
    InternalServerError,
    ServiceUnavailable,
    VersionNotSupported,
}

impl StatusCode {
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::ParameterNotUnderstood => 451,
            Self::SessionNotFound => 454,
            Self::MethodNotValidInThisState => 455,
            Self::InvalidRange => 457,
            Self::UnsupportedTransport => 461,
            Self::InternalServerError => 500,
            Self::ServiceUnavailable => 503,
            Self::VersionNotSupported => 505,
        }
    }

    pub const fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::ParameterNotUnderstood => "Parameter Not Understood",
            Self::SessionNotFound => "Session Not Found",
            Self::MethodNotValidInThisState => "Method Not Valid in This State",
            Self::InvalidRange => "Invalid Range",
            Self::UnsupportedTransport => "Unsupported Transport",
            Self::InternalServerError => "Internal Server Error",
            Self::ServiceUnavailable => "Service Unavailable",
            Self::VersionNotSupported => "RTSP Version Not Supported",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// Bounded response builder over a caller-owned scratch buffer.
///
/// Every write is checked against the buffer: a write that would bring the
/// length to or past capacity fails with [`RtspError::Internal`] and the
/// response must be discarded. Nothing is ever truncated silently.
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// Server: rtsp-audio/0.1\r\n
/// CSeq: 2\r\n
/// \r\n
/// ```
pub struct ResponseWriter<'b> {
    buf: &'b mut [u8],
    len: usize,
}

impl<'b> ResponseWriter<'b> {
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Status line followed by the `Server` header.
    pub fn begin(buf: &'b mut [u8], status: StatusCode, agent: &str) -> Result<Self> {
        let mut writer = Self::new(buf);
        writer.text(format_args!("RTSP/1.0 {status}\r\nServer: {agent}\r\n"))?;
        Ok(writer)
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.len + bytes.len() >= self.buf.len() {
            return Err(RtspError::Internal("response exceeds write buffer"));
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    pub fn text(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        self.write_fmt(args)
            .map_err(|_| RtspError::Internal("response exceeds write buffer"))
    }

    pub fn header(&mut self, name: &str, value: impl fmt::Display) -> Result<()> {
        self.text(format_args!("{name}: {value}\r\n"))
    }

    /// Echo the request's `CSeq` line byte-for-byte.
    pub fn cseq(&mut self, line: &[u8]) -> Result<()> {
        self.bytes(line)?;
        self.bytes(b"\r\n")
    }

    pub fn end_headers(&mut self) -> Result<()> {
        self.bytes(b"\r\n")
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The response written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Write for ResponseWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.bytes(s.as_bytes()).map_err(|_| fmt::Error)
    }
}
