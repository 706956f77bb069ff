pub mod callback;
pub mod error;
pub mod protocol;
pub mod rtp;
pub mod server;
pub mod session;
pub mod transport;

pub use callback::{CallbackError, CallbackResult, NtpTimestamp};
pub use error::{ParseErrorKind, Result, RtpError, RtspError};
pub use rtp::{RtcpConfig, RtcpTask, RtpSession, RtpSessionConfig, RtpTransport};
pub use server::{Instruction, RtspHandler, RxStats, Server, ServerConfig};
pub use session::{PortRange, ResourceId, Session, SessionHandle, SessionId, SessionState};
