//! Resource and session tables (RFC 2326 §3, §12.37).
//!
//! Both tables are fixed-capacity slot arenas sized once from
//! [`ServerConfig`](crate::ServerConfig). Handles are generation-checked
//! indices, so a handle kept past a TEARDOWN never resolves to a session
//! created later in the same slot.
//!
//! ## Session lifecycle (RFC 2326 §A.1)
//!
//! ```text
//! SETUP    -> Ready
//! PLAY     -> Playing  (from Ready)
//! PAUSE    -> Ready    (from Playing)
//! TEARDOWN -> (removed)
//! resource removed -> (removed, every session bound to it)
//! ```

mod slots;

use std::fmt;

use crate::error::{Result, RtspError};
use slots::SlotTable;

/// Capacity of a session id; longer `Session` header values are truncated.
pub const MAX_SESSION_ID_LEN: usize = 16;

/// An RTP/RTCP port pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortRange {
    pub rtp: u16,
    pub rtcp: u16,
}

impl PortRange {
    pub const fn new(rtp: u16, rtcp: u16) -> Self {
        Self { rtp, rtcp }
    }

    pub fn is_zero(&self) -> bool {
        self.rtp == 0 || self.rtcp == 0
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.rtp, self.rtcp)
    }
}

/// Server-assigned session identifier, stored inline.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId {
    bytes: [u8; MAX_SESSION_ID_LEN],
    len: u8,
}

impl SessionId {
    /// Uppercase hex rendering of a random value, without padding.
    pub fn from_u32(value: u32) -> Self {
        let mut id = Self {
            bytes: [0; MAX_SESSION_ID_LEN],
            len: 0,
        };
        let mut digits = [0u8; 8];
        let mut n = value;
        let mut count = 0;
        loop {
            digits[count] = b"0123456789ABCDEF"[(n & 0xF) as usize];
            count += 1;
            n >>= 4;
            if n == 0 {
                break;
            }
        }
        for (slot, digit) in id.bytes.iter_mut().zip(digits[..count].iter().rev()) {
            *slot = *digit;
        }
        id.len = count as u8;
        id
    }

    /// Copy `bytes`, keeping at most [`MAX_SESSION_ID_LEN`] of them.
    pub fn from_bytes_truncated(bytes: &[u8]) -> Self {
        let len = bytes.len().min(MAX_SESSION_ID_LEN);
        let mut id = Self {
            bytes: [0; MAX_SESSION_ID_LEN],
            len: len as u8,
        };
        id.bytes[..len].copy_from_slice(&bytes[..len]);
        id
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({self})")
    }
}

/// Handle to a registered [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId {
    index: usize,
    generation: u32,
}

/// Handle to a live [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    index: usize,
    generation: u32,
}

/// A streamable endpoint.
#[derive(Debug, Clone)]
pub struct Resource {
    path: Vec<u8>,
    sdp: Vec<u8>,
    server_ports: PortRange,
}

impl Resource {
    /// Path with at most one leading and one trailing `/` removed.
    pub fn path(&self) -> &[u8] {
        &self.path
    }

    pub fn sdp(&self) -> &[u8] {
        &self.sdp
    }

    pub fn server_ports(&self) -> PortRange {
        self.server_ports
    }
}

/// Playback state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created by SETUP, or paused.
    Ready,
    /// Media is flowing.
    Playing,
}

/// One client's negotiated stream.
///
/// `C` is the transport's opaque client identity; the store only clones and
/// hands it back.
#[derive(Debug, Clone)]
pub struct Session<C> {
    handle: SessionHandle,
    resource: ResourceId,
    id: SessionId,
    client_ports: PortRange,
    server_ports: PortRange,
    client: C,
    state: SessionState,
}

impl<C> Session<C> {
    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn client_ports(&self) -> PortRange {
        self.client_ports
    }

    /// The owning resource's advertised server ports.
    pub fn server_ports(&self) -> PortRange {
        self.server_ports
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == SessionState::Playing
    }
}

/// Strip at most one leading and one trailing `/`.
pub fn trim_path(path: &[u8]) -> &[u8] {
    let path = path.strip_prefix(b"/").unwrap_or(path);
    path.strip_suffix(b"/").unwrap_or(path)
}

/// The fixed-capacity resource and session tables.
pub struct Store<C> {
    resources: SlotTable<Resource>,
    sessions: SlotTable<Session<C>>,
}

impl<C: Clone> Store<C> {
    pub fn new(max_resources: usize, max_sessions: usize) -> Self {
        Self {
            resources: SlotTable::with_capacity(max_resources),
            sessions: SlotTable::with_capacity(max_sessions),
        }
    }

    /// Register a resource. The SDP must be non-empty.
    pub fn add_resource(
        &mut self,
        path: &[u8],
        sdp: &[u8],
        server_ports: PortRange,
    ) -> Result<ResourceId> {
        if sdp.is_empty() {
            return Err(RtspError::Invalid("resource needs a session description"));
        }
        let path = trim_path(path);
        if self.find_trimmed(path).is_some() {
            return Err(RtspError::Invalid("resource path already registered"));
        }
        let resource = Resource {
            path: path.to_vec(),
            sdp: sdp.to_vec(),
            server_ports,
        };
        let (index, generation) = self
            .resources
            .insert(resource)
            .ok_or(RtspError::NoCapacity("resources"))?;
        tracing::info!(
            path = %String::from_utf8_lossy(path),
            server_ports = %server_ports,
            "resource registered"
        );
        Ok(ResourceId { index, generation })
    }

    /// Look up a resource; `/derp/`, `/derp` and `derp` are the same path.
    pub fn find_resource_by_path(&self, path: &[u8]) -> Result<ResourceId> {
        self.find_trimmed(trim_path(path))
            .ok_or(RtspError::ResourceNotFound)
    }

    fn find_trimmed(&self, path: &[u8]) -> Option<ResourceId> {
        self.resources
            .iter()
            .find(|(_, _, resource)| resource.path == path)
            .map(|(index, generation, _)| ResourceId { index, generation })
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id.index, id.generation)
    }

    /// Free a resource slot. Sessions bound to it must be removed first.
    pub(crate) fn remove_resource(&mut self, id: ResourceId) -> Option<Resource> {
        let removed = self.resources.remove(id.index, id.generation);
        if let Some(resource) = &removed {
            tracing::info!(path = %String::from_utf8_lossy(&resource.path), "resource removed");
        }
        removed
    }

    /// Fill the first free session slot. The new session is [`SessionState::Ready`].
    pub(crate) fn create_session(
        &mut self,
        resource: ResourceId,
        id: SessionId,
        client_ports: PortRange,
        client: C,
    ) -> Result<SessionHandle> {
        let server_ports = self
            .resource(resource)
            .ok_or(RtspError::ResourceNotFound)?
            .server_ports;
        let (index, generation) = self
            .sessions
            .insert_with(|index, generation| Session {
                handle: SessionHandle { index, generation },
                resource,
                id,
                client_ports,
                server_ports,
                client,
                state: SessionState::Ready,
            })
            .ok_or(RtspError::NoCapacity("sessions"))?;
        tracing::debug!(session_id = %id, total_sessions = self.sessions.len(), "session slot filled");
        Ok(SessionHandle { index, generation })
    }

    /// Find the session of `resource` whose id matches exactly.
    pub fn find_session(&self, resource: ResourceId, id: &[u8]) -> Result<SessionHandle> {
        self.sessions
            .iter()
            .find(|(_, _, session)| session.resource == resource && session.id.as_bytes() == id)
            .map(|(_, _, session)| session.handle)
            .ok_or(RtspError::SessionNotFound)
    }

    pub fn session(&self, handle: SessionHandle) -> Option<&Session<C>> {
        self.sessions.get(handle.index, handle.generation)
    }

    pub(crate) fn set_state(&mut self, handle: SessionHandle, state: SessionState) {
        if let Some(session) = self.sessions.get_mut(handle.index, handle.generation) {
            tracing::debug!(session_id = %session.id, old_state = ?session.state, new_state = ?state, "state transition");
            session.state = state;
        }
    }

    pub(crate) fn remove_session(&mut self, handle: SessionHandle) -> Option<Session<C>> {
        let removed = self.sessions.remove(handle.index, handle.generation);
        if let Some(session) = &removed {
            tracing::debug!(session_id = %session.id, total_sessions = self.sessions.len(), "session slot freed");
        }
        removed
    }

    /// Handles of every session matching `pred`.
    pub fn sessions_where(&self, mut pred: impl FnMut(&Session<C>) -> bool) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .filter(|(_, _, session)| pred(session))
            .map(|(_, _, session)| session.handle)
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_capacity(&self) -> usize {
        self.sessions.capacity()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}
