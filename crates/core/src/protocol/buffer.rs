use crate::error::{ParseErrorKind, Result, RtspError};

const CRLF: &[u8] = b"\r\n";

/// Cursor over a caller-owned receive buffer, one CRLF-terminated line at a
/// time.
///
/// `rest()` is everything not yet consumed; `line()` is the prefix of it up
/// to (not including) the next CRLF. The invariant `line().len() <=
/// rest().len()` holds after every operation.
///
/// ```
/// use rtsp::protocol::LineBuffer;
///
/// let mut buf = LineBuffer::new(b"CSeq: 1\r\n\r\n").unwrap();
/// assert_eq!(buf.line(), b"CSeq: 1");
/// buf.advance_within_line(6).unwrap();
/// assert_eq!(buf.line(), b"1");
/// buf.advance_to_next_line().unwrap();
/// assert!(buf.line().is_empty());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LineBuffer<'a> {
    rest: &'a [u8],
    line_len: usize,
}

impl<'a> LineBuffer<'a> {
    /// Position the cursor on the first line of `bytes`.
    ///
    /// Fails with [`ParseErrorKind::EmptyBuffer`] on empty input and
    /// [`ParseErrorKind::MalformedLine`] when no CRLF is present.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(RtspError::parse(ParseErrorKind::EmptyBuffer));
        }
        let line_len = find_crlf(bytes).ok_or(RtspError::parse(ParseErrorKind::MalformedLine))?;
        Ok(Self {
            rest: bytes,
            line_len,
        })
    }

    /// A cursor whose single line is all of `bytes`; no terminator is
    /// required. Used to sub-parse one element of a header value.
    pub fn from_line(bytes: &'a [u8]) -> Self {
        Self {
            rest: bytes,
            line_len: bytes.len(),
        }
    }

    /// Remainder of the current line.
    pub fn line(&self) -> &'a [u8] {
        &self.rest[..self.line_len]
    }

    /// Every unconsumed byte, current line included.
    pub fn rest(&self) -> &'a [u8] {
        self.rest
    }

    pub fn line_len(&self) -> usize {
        self.line_len
    }

    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    /// Skip `n` bytes of the current line.
    pub fn advance_within_line(&mut self, n: usize) -> Result<()> {
        if n > self.line_len {
            return Err(RtspError::parse(ParseErrorKind::OutOfRange));
        }
        self.rest = &self.rest[n..];
        self.line_len -= n;
        Ok(())
    }

    /// Move past the first `ch` found at or after `skip` bytes into the
    /// current line.
    ///
    /// Returns `false`, leaving the cursor untouched, when the line holds no
    /// such byte. Callers iterating `;`-separated parameters treat that as the
    /// end of the list.
    pub fn advance_to_after_char(&mut self, ch: u8, skip: usize) -> bool {
        let line = self.line();
        if skip > line.len() {
            return false;
        }
        match line[skip..].iter().position(|&b| b == ch) {
            Some(idx) => {
                let n = skip + idx + 1;
                self.rest = &self.rest[n..];
                self.line_len -= n;
                true
            }
            None => false,
        }
    }

    /// Skip the rest of the current line and its terminator.
    ///
    /// Fails with [`ParseErrorKind::OutOfRange`] when the buffer ends before
    /// the terminator, which is how a header loop learns there is nothing
    /// left. A next line without its own CRLF extends to the end of the
    /// buffer.
    pub fn advance_to_next_line(&mut self) -> Result<()> {
        let skip = self.line_len + CRLF.len();
        if skip > self.rest.len() {
            return Err(RtspError::parse(ParseErrorKind::OutOfRange));
        }
        self.rest = &self.rest[skip..];
        self.line_len = find_crlf(self.rest).unwrap_or(self.rest.len());
        Ok(())
    }
}

fn find_crlf(bytes: &[u8]) -> Option<usize> {
    bytes.windows(CRLF.len()).position(|w| w == CRLF)
}

/// Offset of `needle` within `haystack`.
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
