use crate::error::{ParseErrorKind, Result, RtspError};
use crate::protocol::buffer::LineBuffer;
use crate::protocol::header::{HeaderName, Headers};
use crate::protocol::response::StatusCode;

const RTSP_VERSION: &[u8] = b"RTSP/1.0";

/// Request methods of RFC 2326 §10.
///
/// Methods are recognised by their first four bytes, so two keywords sharing
/// a 4-byte prefix cannot both be supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Pause,
    Teardown,
    Announce,
    GetParameter,
    Record,
    Redirect,
    SetParameter,
}

impl Method {
    pub const ALL: [Method; 11] = [
        Method::Options,
        Method::Describe,
        Method::Setup,
        Method::Play,
        Method::Pause,
        Method::Teardown,
        Method::Announce,
        Method::GetParameter,
        Method::Record,
        Method::Redirect,
        Method::SetParameter,
    ];

    pub const fn keyword(self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Pause => "PAUSE",
            Method::Teardown => "TEARDOWN",
            Method::Announce => "ANNOUNCE",
            Method::GetParameter => "GET_PARAMETER",
            Method::Record => "RECORD",
            Method::Redirect => "REDIRECT",
            Method::SetParameter => "SET_PARAMETER",
        }
    }

    /// Match the start of a request line against the method table.
    pub fn from_prefix(line: &[u8]) -> Option<Method> {
        Self::ALL
            .into_iter()
            .find(|m| line.len() >= 4 && line[..4] == m.keyword().as_bytes()[..4])
    }

    /// Whether the dispatcher serves this method.
    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            Method::Options
                | Method::Describe
                | Method::Setup
                | Method::Play
                | Method::Pause
                | Method::Teardown
        )
    }
}

/// One parsed RTSP request.
///
/// `uri` and `path` borrow from the receive buffer and are valid only as long
/// as it is. `response_error` remembers the status to report if parsing or
/// dispatch fails.
#[derive(Debug, Clone, Default)]
pub struct Request<'a> {
    pub method: Option<Method>,
    pub uri: &'a [u8],
    /// URI from its third `/` up to the space; empty for the root resource.
    pub path: &'a [u8],
    pub headers: Headers<'a>,
    pub response_error: Option<StatusCode>,
}

impl<'a> Request<'a> {
    /// Parse the request line and headers of `bytes`.
    ///
    /// On failure `self` keeps whatever was decoded before the error, in
    /// particular the `CSeq` line and `response_error`, so the caller can
    /// still send an error reply.
    pub fn parse(&mut self, bytes: &'a [u8]) -> Result<()> {
        let mut buf = LineBuffer::new(bytes)?;
        self.parse_request_line(buf)?;

        let mut header_failure = None;
        loop {
            if buf.advance_to_next_line().is_err() {
                break;
            }
            let line = buf.line();
            if line.is_empty() {
                break;
            }
            let Some(name) = HeaderName::identify(line) else {
                continue;
            };
            let mut value = buf;
            value.advance_within_line(name.prefix().len())?;
            if let Err(err) = self.headers.decode(name, line, &mut value) {
                // Keep scanning so a CSeq after the bad header is still echoed.
                header_failure.get_or_insert(err);
            }
        }

        if let Some(err) = header_failure {
            self.response_error = Some(match &err {
                RtspError::Parse {
                    kind: ParseErrorKind::UnsupportedTransport,
                } => StatusCode::UnsupportedTransport,
                _ => StatusCode::BadRequest,
            });
            return Err(err);
        }
        if self.headers.cseq.is_none() {
            self.response_error = Some(StatusCode::BadRequest);
            return Err(RtspError::parse(ParseErrorKind::MissingCSeq));
        }
        Ok(())
    }

    fn parse_request_line(&mut self, mut buf: LineBuffer<'a>) -> Result<()> {
        let Some(method) = Method::from_prefix(buf.line()) else {
            self.response_error = Some(StatusCode::BadRequest);
            return Err(RtspError::parse(ParseErrorKind::UnknownMethod));
        };
        self.method = Some(method);

        if !buf.advance_to_after_char(b' ', 0) {
            self.response_error = Some(StatusCode::BadRequest);
            return Err(RtspError::parse(ParseErrorKind::InvalidRequestLine));
        }

        let line = buf.line();
        let Some(uri_len) = line.iter().position(|&b| b == b' ') else {
            self.response_error = Some(StatusCode::BadRequest);
            return Err(RtspError::parse(ParseErrorKind::InvalidRequestLine));
        };
        self.uri = &line[..uri_len];
        self.path = path_of(self.uri);

        buf.advance_within_line(uri_len + 1)?;
        if buf.line() != RTSP_VERSION {
            self.response_error = Some(StatusCode::VersionNotSupported);
            return Err(RtspError::parse(ParseErrorKind::UnsupportedVersion));
        }
        Ok(())
    }
}

/// Substring of `uri` starting at its third `/`.
fn path_of(uri: &[u8]) -> &[u8] {
    uri.iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'/')
        .nth(2)
        .map_or(&[][..], |(idx, _)| &uri[idx..])
}
