//! RTSP protocol engine (RFC 2326).
//!
//! Requests are parsed in place from the caller's receive buffer; only the
//! few header values a session must keep (its id, client ports) are copied.
//! Responses are formatted into one caller-owned scratch buffer with every
//! write bounds-checked.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! ```text
//! SETUP rtsp://device/audio RTSP/1.0\r\n
//! CSeq: 3\r\n
//! Transport: RTP/AVP;unicast;client_port=49170-49171\r\n
//! \r\n
//! ```
//!
//! ## Supported methods
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | DESCRIBE | §10.2 | Retrieve the resource's SDP |
//! | SETUP | §10.4 | Negotiate UDP ports, create a session |
//! | PLAY | §10.5 | Start media delivery |
//! | PAUSE | §10.6 | Suspend media delivery |
//! | TEARDOWN | §10.7 | Destroy the session |
//!
//! ANNOUNCE, GET_PARAMETER, RECORD, REDIRECT and SET_PARAMETER are
//! recognised and answered with `405 Method Not Allowed`.

pub mod buffer;
pub mod handler;
pub mod header;
pub mod request;
pub mod response;

pub use buffer::LineBuffer;
pub use handler::MethodHandler;
pub use header::{Connection, HeaderName, Headers, Require, TransportSpec};
pub use request::{Method, Request};
pub use response::{ResponseWriter, StatusCode};
