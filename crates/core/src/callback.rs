//! Collaborator plumbing shared by the RTSP and RTP cores.
//!
//! Both cores reach the outside world (sockets, clocks, entropy) only through
//! traits. This module holds the pieces those traits have in common: the
//! opaque error a collaborator returns and the NTP timestamp type.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the UNIX epoch (1970).
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Opaque failure reported by a collaborator callback.
///
/// The core never inspects the cause; it only propagates or counts it.
#[derive(Debug)]
pub struct CallbackError(Box<dyn std::error::Error + Send + Sync + 'static>);

impl CallbackError {
    pub fn new<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self(err.into())
    }

    /// Consume the wrapper and return the collaborator's error.
    pub fn into_inner(self) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self.0
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for CallbackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

impl From<std::io::Error> for CallbackError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err)
    }
}

/// Result of a collaborator callback.
pub type CallbackResult<T = ()> = std::result::Result<T, CallbackError>;

/// 64-bit NTP timestamp (RFC 3550 §4): seconds since 1900 plus a 32-bit
/// binary fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct NtpTimestamp {
    pub seconds: u32,
    pub fraction: u32,
}

impl NtpTimestamp {
    pub const fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    /// The timestamp as one 32.32 fixed-point value.
    pub const fn as_u64(self) -> u64 {
        ((self.seconds as u64) << 32) | self.fraction as u64
    }

    pub const fn from_u64(value: u64) -> Self {
        Self {
            seconds: (value >> 32) as u32,
            fraction: value as u32,
        }
    }

    /// Read the wall clock.
    pub fn now() -> CallbackResult<Self> {
        let since_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(CallbackError::new)?;
        let seconds = since_unix.as_secs().wrapping_add(NTP_UNIX_OFFSET) as u32;
        let fraction = ((u64::from(since_unix.subsec_nanos()) << 32) / 1_000_000_000) as u32;
        Ok(Self { seconds, fraction })
    }
}

impl fmt::Display for NtpTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08x}", self.seconds, self.fraction)
    }
}

/// Default entropy source for collaborators that do not supply their own.
pub fn system_random_u32() -> CallbackResult<u32> {
    Ok(rand::random::<u32>())
}
