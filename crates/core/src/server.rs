use crate::callback::{CallbackError, CallbackResult, system_random_u32};
use crate::error::{Result, RtspError};
use crate::protocol::{MethodHandler, Request, ResponseWriter, StatusCode};
use crate::session::{PortRange, ResourceId, Session, Store};

/// Session lifecycle notification sent to the [`RtspHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// SETUP created the session.
    Create,
    /// PLAY started delivery.
    Play,
    /// PAUSE suspended delivery.
    Pause,
    /// The session is about to be removed (TEARDOWN or resource removal).
    Delete,
}

/// The device side of the RTSP server.
///
/// `Client` identifies the connection a request arrived on. The server only
/// clones it into the session it creates and hands it back to
/// [`transmit`](Self::transmit) and [`control`](Self::control).
pub trait RtspHandler {
    type Client: Clone;

    /// Send reply bytes to the client.
    fn transmit(&mut self, client: &Self::Client, bytes: &[u8]) -> CallbackResult;

    /// React to a lifecycle change of `session`.
    ///
    /// For [`Instruction::Delete`] the session is still in the table; it is
    /// removed right after this returns.
    fn control(&mut self, session: &Session<Self::Client>, instruction: Instruction) -> CallbackResult;

    /// Entropy for session ids.
    fn random_u32(&mut self) -> CallbackResult<u32> {
        system_random_u32()
    }
}

/// Server sizing and identification.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Capacity of the resource table.
    pub max_resources: usize,
    /// Capacity of the session table.
    pub max_sessions: usize,
    /// Size of the response scratch buffer in octets.
    pub write_buffer_len: usize,
    /// Value of the `Server` header (RFC 2326 §12.36).
    pub server_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_resources: 1,
            max_sessions: 1,
            write_buffer_len: 512,
            server_agent: "rtsp-audio/0.1".to_string(),
        }
    }
}

/// Counters of requests handled by [`Server::rx`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    pub valid: u64,
    pub invalid: u64,
}

/// RTSP server core: resource and session tables plus the response buffer.
///
/// `Server` does no I/O of its own. A transport feeds it one complete
/// request per [`rx`](Self::rx) call and the [`RtspHandler`] carries replies
/// back. Requests are handled strictly one at a time through `&mut self`.
pub struct Server<H: RtspHandler> {
    config: ServerConfig,
    handler: H,
    store: Store<H::Client>,
    scratch: Vec<u8>,
    stats: RxStats,
}

impl<H: RtspHandler> Server<H> {
    pub fn new(config: ServerConfig, handler: H) -> Self {
        tracing::debug!(
            max_resources = config.max_resources,
            max_sessions = config.max_sessions,
            write_buffer_len = config.write_buffer_len,
            "RTSP server created"
        );
        Self {
            store: Store::new(config.max_resources, config.max_sessions),
            scratch: vec![0; config.write_buffer_len],
            config,
            handler,
            stats: RxStats::default(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn store(&self) -> &Store<H::Client> {
        &self.store
    }

    pub fn stats(&self) -> RxStats {
        self.stats
    }

    /// Register a streamable resource.
    pub fn add_resource(&mut self, path: &str, sdp: &[u8], server_ports: PortRange) -> Result<ResourceId> {
        self.store.add_resource(path.as_bytes(), sdp, server_ports)
    }

    /// Remove a resource and every session bound to it.
    ///
    /// Each session gets [`Instruction::Delete`] before its slot is freed. A
    /// failing callback does not stop the cascade; the last failure is
    /// returned once every session and the resource are gone.
    pub fn remove_resource(&mut self, id: ResourceId) -> Result<()> {
        if self.store.resource(id).is_none() {
            return Err(RtspError::ResourceNotFound);
        }
        let last = self.close_sessions(|session| session.resource() == id);
        self.store.remove_resource(id);
        match last {
            Some(err) => Err(RtspError::Callback(err)),
            None => Ok(()),
        }
    }

    /// Delete every session matching `pred`, e.g. those of a client whose
    /// connection dropped. Returns the last callback error, if any.
    pub fn close_sessions(
        &mut self,
        pred: impl FnMut(&Session<H::Client>) -> bool,
    ) -> Option<CallbackError> {
        let mut last = None;
        for handle in self.store.sessions_where(pred) {
            if let Some(session) = self.store.session(handle) {
                if let Err(err) = self.handler.control(session, Instruction::Delete) {
                    tracing::warn!(session_id = %session.id(), error = %err, "DELETE callback failed");
                    last = Some(err);
                }
                tracing::info!(session_id = %session.id(), "session closed");
            }
            self.store.remove_session(handle);
        }
        last
    }

    /// Handle one complete request received from `client`.
    ///
    /// When handling fails after a status code was chosen, an error reply is
    /// sent before the error is returned.
    pub fn rx(&mut self, client: &H::Client, bytes: &[u8]) -> Result<()> {
        let mut request = Request::default();
        let result = match request.parse(bytes) {
            Ok(()) => MethodHandler::new(
                &mut self.handler,
                &mut self.store,
                &mut self.scratch,
                &self.config,
            )
            .dispatch(&mut request, client),
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                self.stats.valid += 1;
                Ok(())
            }
            Err(err) => {
                self.stats.invalid += 1;
                tracing::warn!(
                    method = ?request.method,
                    uri = %String::from_utf8_lossy(request.uri),
                    status = ?request.response_error.map(|s| s.code()),
                    error = %err,
                    "request rejected"
                );
                if let Some(status) = request.response_error {
                    self.send_error(client, &request, status);
                }
                Err(err)
            }
        }
    }

    fn send_error(&mut self, client: &H::Client, request: &Request<'_>, status: StatusCode) {
        match write_error_reply(&mut self.scratch, &self.config.server_agent, request, status) {
            Ok(len) => {
                if let Err(err) = self.handler.transmit(client, &self.scratch[..len]) {
                    tracing::warn!(error = %err, "failed to send error reply");
                }
            }
            Err(err) => tracing::warn!(error = %err, "error reply does not fit write buffer"),
        }
    }
}

fn write_error_reply(
    scratch: &mut [u8],
    agent: &str,
    request: &Request<'_>,
    status: StatusCode,
) -> Result<usize> {
    let mut writer = ResponseWriter::begin(scratch, status, agent)?;
    if let Some(cseq) = request.headers.cseq {
        writer.cseq(cseq)?;
    }
    writer.end_headers()?;
    Ok(writer.len())
}
