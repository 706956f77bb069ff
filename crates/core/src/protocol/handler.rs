use crate::error::{Result, RtspError};
use crate::protocol::request::{Method, Request};
use crate::protocol::response::{PUBLIC_METHODS, ResponseWriter, StatusCode};
use crate::server::{Instruction, RtspHandler, ServerConfig};
use crate::session::{ResourceId, SessionHandle, SessionId, SessionState, Store};

/// Routes one parsed request to its method handler.
///
/// Borrows the pieces of a [`Server`](crate::Server) for the duration of one
/// request; the scratch buffer is exclusively held while the reply is built.
pub struct MethodHandler<'s, H: RtspHandler> {
    handler: &'s mut H,
    store: &'s mut Store<H::Client>,
    scratch: &'s mut [u8],
    config: &'s ServerConfig,
}

impl<'s, H: RtspHandler> MethodHandler<'s, H> {
    pub fn new(
        handler: &'s mut H,
        store: &'s mut Store<H::Client>,
        scratch: &'s mut [u8],
        config: &'s ServerConfig,
    ) -> Self {
        Self {
            handler,
            store,
            scratch,
            config,
        }
    }

    /// Serve `request`. Failures leave a status to report in
    /// `request.response_error` when the client should get an error reply.
    pub fn dispatch(&mut self, request: &mut Request<'_>, client: &H::Client) -> Result<()> {
        let method = request
            .method
            .ok_or(RtspError::Internal("dispatch before parse"))?;
        tracing::debug!(
            method = method.keyword(),
            path = %String::from_utf8_lossy(request.path),
            "request"
        );

        if !method.is_supported() {
            request.response_error = Some(StatusCode::MethodNotAllowed);
            return Err(RtspError::Invalid("method not allowed"));
        }

        let resource = match self.store.find_resource_by_path(request.path) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(path = %String::from_utf8_lossy(request.path), "request for unknown resource");
                request.response_error = Some(StatusCode::NotFound);
                return Err(err);
            }
        };

        match method {
            Method::Options => self.handle_options(request, client),
            Method::Describe => self.handle_describe(request, resource, client),
            Method::Setup => self.handle_setup(request, resource, client),
            Method::Play => self.handle_play(request, resource, client),
            Method::Pause => self.handle_pause(request, resource, client),
            Method::Teardown => self.handle_teardown(request, resource, client),
            _ => Err(RtspError::Internal("unsupported method reached dispatch")),
        }
    }

    fn handle_options(&mut self, request: &mut Request<'_>, client: &H::Client) -> Result<()> {
        let len = self.write(request, |w, cseq| {
            w.cseq(cseq)?;
            w.header("Public", PUBLIC_METHODS)?;
            w.end_headers()
        })?;
        self.send(client, len)
    }

    fn handle_describe(
        &mut self,
        request: &mut Request<'_>,
        resource: ResourceId,
        client: &H::Client,
    ) -> Result<()> {
        if !request.headers.accept_sdp {
            tracing::warn!("DESCRIBE without Accept: application/sdp");
            return Err(RtspError::Invalid("DESCRIBE requires Accept: application/sdp"));
        }
        let sdp = self
            .store
            .resource(resource)
            .map(|r| r.sdp())
            .filter(|sdp| !sdp.is_empty())
            .ok_or(RtspError::Invalid("resource has no session description"))?;

        let cseq = cseq_of(request)?;
        let written = ResponseWriter::begin(self.scratch, StatusCode::Ok, &self.config.server_agent)
            .and_then(|mut w| describe_body(&mut w, cseq, sdp));
        let len = match written {
            Ok(len) => len,
            Err(err) => {
                request.response_error = Some(StatusCode::InternalServerError);
                return Err(err);
            }
        };
        self.send(client, len)
    }

    fn handle_setup(
        &mut self,
        request: &mut Request<'_>,
        resource: ResourceId,
        client: &H::Client,
    ) -> Result<()> {
        let Some(transport) = request.headers.transport else {
            tracing::warn!("SETUP without Transport header");
            request.response_error = Some(StatusCode::BadRequest);
            return Err(RtspError::Invalid("SETUP requires a Transport header"));
        };
        if !transport.unicast {
            tracing::warn!("SETUP for non-unicast transport");
            request.response_error = Some(StatusCode::ParameterNotUnderstood);
            return Err(RtspError::Invalid("only unicast RTP/AVP is supported"));
        }
        let client_ports = match transport.client_port {
            Some(ports) if !ports.is_zero() => ports,
            _ => {
                tracing::warn!(client_port = ?transport.client_port, "SETUP without usable client_port");
                request.response_error = Some(StatusCode::InvalidRange);
                return Err(RtspError::Invalid("client_port must be two non-zero ports"));
            }
        };

        let id = SessionId::from_u32(self.handler.random_u32()?);
        let handle = match self
            .store
            .create_session(resource, id, client_ports, client.clone())
        {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(error = %err, "session table full");
                request.response_error = Some(StatusCode::ServiceUnavailable);
                return Err(err);
            }
        };

        if let Err(err) = self.control(handle, Instruction::Create) {
            // CREATE never happened as far as the device is concerned.
            self.store.remove_session(handle);
            return Err(err);
        }

        let server_ports = self
            .store
            .session(handle)
            .map(|s| s.server_ports())
            .unwrap_or_default();
        let written = self.write(request, |w, cseq| {
            w.cseq(cseq)?;
            w.header("Session", id)?;
            w.header(
                "Transport",
                format_args!("RTP/AVP;unicast;client_port={client_ports};server_port={server_ports}"),
            )?;
            w.end_headers()
        });
        let result = written.and_then(|len| self.send(client, len));
        match result {
            Ok(()) => {
                tracing::info!(
                    session_id = %id,
                    client_port = %client_ports,
                    server_port = %server_ports,
                    "session created via SETUP"
                );
                Ok(())
            }
            Err(err) => {
                self.discard(handle);
                Err(err)
            }
        }
    }

    fn handle_play(
        &mut self,
        request: &mut Request<'_>,
        resource: ResourceId,
        client: &H::Client,
    ) -> Result<()> {
        let handle = self.find_session(request, resource)?;
        if self.state(handle) == Some(SessionState::Ready) {
            self.control(handle, Instruction::Play)?;
            self.store.set_state(handle, SessionState::Playing);
            tracing::info!(session_id = %self.session_id(handle), "session started playing");
        }
        self.reply_with_session(request, handle, client)
    }

    fn handle_pause(
        &mut self,
        request: &mut Request<'_>,
        resource: ResourceId,
        client: &H::Client,
    ) -> Result<()> {
        let handle = self.find_session(request, resource)?;
        if self.state(handle) != Some(SessionState::Playing) {
            tracing::warn!(session_id = %self.session_id(handle), "PAUSE for session that is not playing");
            request.response_error = Some(StatusCode::MethodNotValidInThisState);
            return Err(RtspError::Invalid("PAUSE requires a playing session"));
        }
        self.control(handle, Instruction::Pause)?;
        self.store.set_state(handle, SessionState::Ready);
        tracing::info!(session_id = %self.session_id(handle), "session paused");
        self.reply_with_session(request, handle, client)
    }

    fn handle_teardown(
        &mut self,
        request: &mut Request<'_>,
        resource: ResourceId,
        client: &H::Client,
    ) -> Result<()> {
        let handle = self.find_session(request, resource)?;
        let id = self.session_id(handle);
        let deleted = self.control(handle, Instruction::Delete);
        self.store.remove_session(handle);
        deleted?;
        tracing::info!(session_id = %id, "session terminated via TEARDOWN");

        let len = self.write(request, |w, cseq| {
            w.cseq(cseq)?;
            w.end_headers()
        })?;
        self.send(client, len)
    }

    fn find_session(&mut self, request: &mut Request<'_>, resource: ResourceId) -> Result<SessionHandle> {
        let id = request.headers.session_id.unwrap_or(SessionId::from_bytes_truncated(b""));
        self.store
            .find_session(resource, id.as_bytes())
            .inspect_err(|_| {
                tracing::warn!(session_id = %id, "request for unknown session");
                request.response_error = Some(StatusCode::SessionNotFound);
            })
    }

    fn reply_with_session(
        &mut self,
        request: &mut Request<'_>,
        handle: SessionHandle,
        client: &H::Client,
    ) -> Result<()> {
        let id = self.session_id(handle);
        let len = self.write(request, |w, cseq| {
            w.cseq(cseq)?;
            w.header("Session", id)?;
            w.end_headers()
        })?;
        self.send(client, len)
    }

    /// Build a `200 OK` reply. Overflow records `500` on the request.
    fn write(
        &mut self,
        request: &mut Request<'_>,
        body: impl FnOnce(&mut ResponseWriter<'_>, &[u8]) -> Result<()>,
    ) -> Result<usize> {
        let cseq = cseq_of(request)?;
        let result = ResponseWriter::begin(self.scratch, StatusCode::Ok, &self.config.server_agent)
            .and_then(|mut w| body(&mut w, cseq).map(|()| w.len()));
        if result.is_err() {
            request.response_error = Some(StatusCode::InternalServerError);
        }
        result
    }

    fn send(&mut self, client: &H::Client, len: usize) -> Result<()> {
        self.handler
            .transmit(client, &self.scratch[..len])
            .map_err(|err| {
                tracing::warn!(error = %err, "reply transmit failed");
                RtspError::Callback(err)
            })
    }

    fn control(&mut self, handle: SessionHandle, instruction: Instruction) -> Result<()> {
        let session = self
            .store
            .session(handle)
            .ok_or(RtspError::SessionNotFound)?;
        self.handler.control(session, instruction).map_err(|err| {
            tracing::warn!(session_id = %session.id(), ?instruction, error = %err, "control callback failed");
            RtspError::Callback(err)
        })
    }

    /// Undo a SETUP whose reply could not be delivered.
    fn discard(&mut self, handle: SessionHandle) {
        if let Err(err) = self.control(handle, Instruction::Delete) {
            tracing::warn!(error = %err, "DELETE during SETUP rollback failed");
        }
        self.store.remove_session(handle);
    }

    fn state(&self, handle: SessionHandle) -> Option<SessionState> {
        self.store.session(handle).map(|s| s.state())
    }

    fn session_id(&self, handle: SessionHandle) -> SessionId {
        self.store
            .session(handle)
            .map(|s| *s.id())
            .unwrap_or(SessionId::from_bytes_truncated(b""))
    }
}

fn cseq_of<'a>(request: &Request<'a>) -> Result<&'a [u8]> {
    request
        .headers
        .cseq
        .ok_or(RtspError::Internal("request without CSeq reached dispatch"))
}

fn describe_body(w: &mut ResponseWriter<'_>, cseq: &[u8], sdp: &[u8]) -> Result<usize> {
    w.header("Content-Type", "application/sdp")?;
    w.header("Content-Length", sdp.len())?;
    w.cseq(cseq)?;
    w.end_headers()?;
    w.bytes(sdp)?;
    Ok(w.len())
}
