//! Request handling through [`Server::rx`] with a recording device.

use rtsp::{
    CallbackError, CallbackResult, Instruction, PortRange, RtspError, RtspHandler, Server,
    ServerConfig, Session, SessionId,
};

const SDP: &[u8] = b"v=0\r\nm=audio 0 RTP/AVP 96\r\na=rtpmap:96 L16/48000/1\r\n";
const SERVER_PORTS: PortRange = PortRange::new(6970, 6971);

#[derive(Default)]
struct Recorder {
    sent: Vec<(u32, String)>,
    controls: Vec<(String, Instruction)>,
    fail_create: bool,
    fail_transmit: bool,
    fail_delete: bool,
    next_id: u32,
}

impl RtspHandler for Recorder {
    type Client = u32;

    fn transmit(&mut self, client: &u32, bytes: &[u8]) -> CallbackResult {
        if self.fail_transmit {
            return Err(CallbackError::new("link down"));
        }
        self.sent.push((*client, String::from_utf8_lossy(bytes).into_owned()));
        Ok(())
    }

    fn control(&mut self, session: &Session<u32>, instruction: Instruction) -> CallbackResult {
        self.controls.push((session.id().to_string(), instruction));
        match instruction {
            Instruction::Create if self.fail_create => Err(CallbackError::new("no stream")),
            Instruction::Delete if self.fail_delete => Err(CallbackError::new("stuck")),
            _ => Ok(()),
        }
    }

    fn random_u32(&mut self) -> CallbackResult<u32> {
        self.next_id += 1;
        Ok(0xBEEE + self.next_id)
    }
}

fn server_with(config: ServerConfig) -> Server<Recorder> {
    let mut server = Server::new(config, Recorder::default());
    server.add_resource("/audio", SDP, SERVER_PORTS).unwrap();
    server
}

fn server() -> Server<Recorder> {
    server_with(ServerConfig::default())
}

fn last_reply(server: &Server<Recorder>) -> &str {
    &server.handler().sent.last().expect("a reply was sent").1
}

fn instructions(server: &Server<Recorder>) -> Vec<Instruction> {
    server.handler().controls.iter().map(|(_, i)| *i).collect()
}

fn setup(cseq: u32) -> String {
    format!(
        "SETUP rtsp://10.0.0.2/audio RTSP/1.0\r\nCSeq: {cseq}\r\n\
         Transport: RTP/AVP;unicast;client_port=49170-49171\r\n\r\n"
    )
}

fn with_session(method: &str, cseq: u32, id: &str) -> String {
    format!("{method} rtsp://10.0.0.2/audio RTSP/1.0\r\nCSeq: {cseq}\r\nSession: {id}\r\n\r\n")
}

#[test]
fn options_lists_public_methods() {
    let mut s = server();
    s.rx(&1, b"OPTIONS rtsp://10.0.0.2/audio RTSP/1.0\r\nCSeq: 1\r\n\r\n")
        .unwrap();
    assert_eq!(
        last_reply(&s),
        "RTSP/1.0 200 OK\r\nServer: rtsp-audio/0.1\r\nCSeq: 1\r\n\
         Public: OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN\r\n\r\n"
    );
    assert_eq!(s.handler().sent[0].0, 1);
}

#[test]
fn describe_returns_sdp_body() {
    let mut s = server();
    s.rx(
        &1,
        b"DESCRIBE rtsp://10.0.0.2/audio/ RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp\r\n\r\n",
    )
    .unwrap();
    let reply = last_reply(&s);
    assert!(reply.starts_with("RTSP/1.0 200 OK\r\n"));
    assert!(reply.contains("Content-Type: application/sdp\r\n"));
    assert!(reply.contains(&format!("Content-Length: {}\r\n", SDP.len())));
    assert!(reply.contains("CSeq: 2\r\n"));
    assert!(reply.ends_with(&format!("\r\n\r\n{}", String::from_utf8_lossy(SDP))));
}

#[test]
fn describe_without_accept_sends_nothing() {
    let mut s = server();
    let err = s
        .rx(&1, b"DESCRIBE rtsp://10.0.0.2/audio RTSP/1.0\r\nCSeq: 2\r\n\r\n")
        .unwrap_err();
    assert!(matches!(err, RtspError::Invalid(_)));
    assert!(s.handler().sent.is_empty());
    assert_eq!(s.stats().invalid, 1);
}

#[test]
fn full_session_lifecycle() {
    let mut s = server();
    s.rx(&7, setup(3).as_bytes()).unwrap();
    let reply = last_reply(&s);
    assert!(reply.starts_with("RTSP/1.0 200 OK\r\n"));
    assert!(reply.contains("CSeq: 3\r\n"));
    assert!(reply.contains("Session: BEEF\r\n"));
    assert!(reply.contains("Transport: RTP/AVP;unicast;client_port=49170-49171;server_port=6970-6971\r\n"));
    assert_eq!(s.store().session_count(), 1);

    let audio = s.store().find_resource_by_path(b"audio").unwrap();
    let handle = s.store().find_session(audio, b"BEEF").unwrap();
    let session = s.store().session(handle).unwrap();
    assert_eq!(session.client_ports(), PortRange::new(49170, 49171));
    assert_eq!(session.server_ports(), SERVER_PORTS);
    assert_eq!(*session.client(), 7);
    assert!(!session.is_playing());

    s.rx(&7, with_session("PLAY", 4, "BEEF").as_bytes()).unwrap();
    assert_eq!(
        last_reply(&s),
        "RTSP/1.0 200 OK\r\nServer: rtsp-audio/0.1\r\nCSeq: 4\r\nSession: BEEF\r\n\r\n"
    );
    assert!(s.store().session(handle).unwrap().is_playing());

    s.rx(&7, with_session("PAUSE", 5, "BEEF").as_bytes()).unwrap();
    assert!(!s.store().session(handle).unwrap().is_playing());

    s.rx(&7, with_session("TEARDOWN", 6, "BEEF").as_bytes()).unwrap();
    assert_eq!(
        last_reply(&s),
        "RTSP/1.0 200 OK\r\nServer: rtsp-audio/0.1\r\nCSeq: 6\r\n\r\n"
    );

    assert_eq!(
        instructions(&s),
        [Instruction::Create, Instruction::Play, Instruction::Pause, Instruction::Delete]
    );
    assert!(s.handler().controls.iter().all(|(id, _)| id == "BEEF"));
    assert!(matches!(
        s.store().find_session(audio, b"BEEF"),
        Err(RtspError::SessionNotFound)
    ));
    assert_eq!(s.store().session_count(), 0);
    assert_eq!(s.stats().valid, 4);
}

#[test]
fn play_while_playing_skips_callback() {
    let mut s = server();
    s.rx(&1, setup(1).as_bytes()).unwrap();
    s.rx(&1, with_session("PLAY", 2, "BEEF").as_bytes()).unwrap();
    s.rx(&1, with_session("PLAY", 3, "BEEF").as_bytes()).unwrap();
    assert_eq!(instructions(&s), [Instruction::Create, Instruction::Play]);
    assert!(last_reply(&s).contains("CSeq: 3\r\n"));
}

#[test]
fn pause_when_ready_is_rejected() {
    let mut s = server();
    s.rx(&1, setup(1).as_bytes()).unwrap();
    assert!(s.rx(&1, with_session("PAUSE", 2, "BEEF").as_bytes()).is_err());
    assert!(last_reply(&s).starts_with("RTSP/1.0 455 "));
    assert!(last_reply(&s).contains("CSeq: 2\r\n"));
    assert_eq!(instructions(&s), [Instruction::Create]);
}

#[test]
fn malformed_client_port_creates_nothing() {
    let mut s = server();
    let request = b"SETUP rtsp://10.0.0.2/audio RTSP/1.0\r\nCSeq: 3\r\n\
                    Transport: RTP/AVP;unicast;client_port=49170-\r\n\r\n";
    let err = s.rx(&1, request).unwrap_err();
    assert!(matches!(err, RtspError::Parse { .. }));
    assert_eq!(
        last_reply(&s),
        "RTSP/1.0 400 Bad Request\r\nServer: rtsp-audio/0.1\r\nCSeq: 3\r\n\r\n"
    );
    assert_eq!(s.store().session_count(), 0);
    assert!(s.handler().controls.is_empty());
}

#[test]
fn setup_rejections() {
    let cases: [(&str, &str); 4] = [
        ("Transport: RTP/AVP;multicast;client_port=5000-5001\r\n", "451"),
        ("Transport: RTP/AVP/TCP;interleaved=0-1\r\n", "461"),
        ("Transport: RTP/AVP;unicast\r\n", "457"),
        ("", "400"),
    ];
    for (transport, status) in cases {
        let mut s = server();
        let request =
            format!("SETUP rtsp://10.0.0.2/audio RTSP/1.0\r\nCSeq: 9\r\n{transport}\r\n");
        assert!(s.rx(&1, request.as_bytes()).is_err(), "{transport:?}");
        assert!(
            last_reply(&s).starts_with(&format!("RTSP/1.0 {status} ")),
            "{transport:?}: {}",
            last_reply(&s)
        );
        assert_eq!(s.store().session_count(), 0);
    }
}

#[test]
fn full_session_table_is_unavailable() {
    let mut s = server();
    s.rx(&1, setup(1).as_bytes()).unwrap();
    assert!(s.rx(&2, setup(2).as_bytes()).is_err());
    assert!(last_reply(&s).starts_with("RTSP/1.0 503 Service Unavailable\r\n"));
    assert_eq!(s.store().session_count(), 1);
    assert_eq!(instructions(&s), [Instruction::Create]);
}

#[test]
fn failed_create_leaves_no_session() {
    let mut s = server();
    s.handler_mut().fail_create = true;
    let err = s.rx(&1, setup(1).as_bytes()).unwrap_err();
    assert!(matches!(err, RtspError::Callback(_)));
    assert_eq!(s.store().session_count(), 0);
    assert_eq!(instructions(&s), [Instruction::Create]);
}

#[test]
fn undeliverable_setup_reply_rolls_back() {
    let mut s = server();
    s.handler_mut().fail_transmit = true;
    assert!(s.rx(&1, setup(1).as_bytes()).is_err());
    assert_eq!(s.store().session_count(), 0);
    assert_eq!(instructions(&s), [Instruction::Create, Instruction::Delete]);
}

#[test]
fn write_buffer_overflow_rolls_back_setup() {
    let mut s = server_with(ServerConfig {
        write_buffer_len: 60,
        ..ServerConfig::default()
    });
    assert!(s.rx(&1, setup(3).as_bytes()).is_err());
    assert_eq!(
        last_reply(&s),
        "RTSP/1.0 500 Internal Server Error\r\nServer: rtsp-audio/0.1\r\nCSeq: 3\r\n\r\n"
    );
    assert_eq!(s.store().session_count(), 0);
    assert_eq!(instructions(&s), [Instruction::Create, Instruction::Delete]);
}

#[test]
fn error_replies() {
    let cases: [(&[u8], &str); 5] = [
        (b"OPTIONS rtsp://10.0.0.2/other RTSP/1.0\r\nCSeq: 1\r\n\r\n", "404 Not Found"),
        (b"PLAY rtsp://10.0.0.2/audio RTSP/1.0\r\nCSeq: 1\r\nSession: F00D\r\n\r\n", "454 Session Not Found"),
        (b"PLAY rtsp://10.0.0.2/audio RTSP/2.0\r\nCSeq: 1\r\n\r\n", "505 RTSP Version Not Supported"),
        (b"ANNOUNCE rtsp://10.0.0.2/audio RTSP/1.0\r\nCSeq: 1\r\n\r\n", "405 Method Not Allowed"),
        (b"OPTIONS rtsp://10.0.0.2/audio RTSP/1.0\r\n\r\n", "400 Bad Request"),
    ];
    for (request, status) in cases {
        let mut s = server();
        assert!(s.rx(&1, request).is_err());
        assert!(
            last_reply(&s).starts_with(&format!("RTSP/1.0 {status}\r\n")),
            "{}",
            last_reply(&s)
        );
    }
}

#[test]
fn error_reply_omits_unknown_cseq() {
    let mut s = server();
    assert!(s.rx(&1, b"OPTIONS rtsp://10.0.0.2/audio RTSP/1.0\r\n\r\n").is_err());
    assert_eq!(
        last_reply(&s),
        "RTSP/1.0 400 Bad Request\r\nServer: rtsp-audio/0.1\r\n\r\n"
    );
}

#[test]
fn path_lookup_ignores_one_slash_each_side() {
    let s = server();
    let store = s.store();
    let id = store.find_resource_by_path(b"audio").unwrap();
    for path in [&b"/audio"[..], b"audio/", b"/audio/"] {
        assert_eq!(store.find_resource_by_path(path).unwrap(), id);
    }
    assert!(store.find_resource_by_path(b"//audio").is_err());
}

#[test]
fn duplicate_and_empty_resources_rejected() {
    let mut s = server_with(ServerConfig {
        max_resources: 4,
        ..ServerConfig::default()
    });
    assert!(s.add_resource("audio/", SDP, SERVER_PORTS).is_err());
    assert!(s.add_resource("/other", b"", SERVER_PORTS).is_err());
    assert!(s.add_resource("/other", SDP, SERVER_PORTS).is_ok());
    assert_eq!(s.store().resource_count(), 2);
}

#[test]
fn removing_resource_closes_its_sessions() {
    let mut s = server_with(ServerConfig {
        max_sessions: 3,
        ..ServerConfig::default()
    });
    s.rx(&1, setup(1).as_bytes()).unwrap();
    s.rx(&2, setup(2).as_bytes()).unwrap();
    s.handler_mut().fail_delete = true;

    let audio = s.store().find_resource_by_path(b"/audio").unwrap();
    let err = s.remove_resource(audio).unwrap_err();
    assert!(matches!(err, RtspError::Callback(_)));
    assert_eq!(s.store().session_count(), 0);
    assert_eq!(s.store().resource_count(), 0);
    assert_eq!(
        instructions(&s),
        [Instruction::Create, Instruction::Create, Instruction::Delete, Instruction::Delete]
    );
    assert!(matches!(s.remove_resource(audio), Err(RtspError::ResourceNotFound)));
}

#[test]
fn close_sessions_by_client() {
    let mut s = server_with(ServerConfig {
        max_sessions: 3,
        ..ServerConfig::default()
    });
    s.rx(&1, setup(1).as_bytes()).unwrap();
    s.rx(&2, setup(2).as_bytes()).unwrap();
    assert!(s.close_sessions(|session| *session.client() == 1).is_none());

    let audio = s.store().find_resource_by_path(b"/audio").unwrap();
    assert_eq!(s.store().session_count(), 1);
    assert!(s.store().find_session(audio, b"BEEF").is_err());
    assert!(s.store().find_session(audio, b"BEF0").is_ok());
}

#[test]
fn session_ids_are_uppercase_hex() {
    assert_eq!(SessionId::from_u32(0xBEEF).to_string(), "BEEF");
    assert_eq!(SessionId::from_u32(0).to_string(), "0");
    assert_eq!(SessionId::from_u32(u32::MAX).to_string(), "FFFFFFFF");
}
