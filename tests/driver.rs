//! End-to-end driver scenarios: handshakes, echo, fragmentation, close
//! handshakes and pre-open queueing, exercised through the public API.

use std::cell::Cell;
use std::rc::Rc;

use wsdriver::{
    Config, Driver, Event, Frame, Handler, Limits, Message, ReadyState, RequestContext,
};

#[derive(Default)]
struct Recorder {
    wire: Vec<u8>,
    events: Vec<Event>,
}

impl Recorder {
    fn take_wire(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.wire)
    }

    fn messages(&self) -> Vec<&Message> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Message(m) => Some(m),
                _ => None,
            })
            .collect()
    }
}

impl Handler for Recorder {
    fn write(&mut self, bytes: &[u8]) {
        self.wire.extend_from_slice(bytes);
    }

    fn event(&mut self, event: Event) {
        self.events.push(event);
    }
}

const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

fn hybi_ctx() -> RequestContext {
    [
        ("REQUEST_METHOD", "GET"),
        ("REQUEST_URI", "/chat"),
        ("HTTP_HOST", "server.example.com"),
        ("HTTP_CONNECTION", "Upgrade"),
        ("HTTP_UPGRADE", "websocket"),
        ("HTTP_SEC_WEBSOCKET_KEY", "dGhlIHNhbXBsZSBub25jZQ=="),
        ("HTTP_SEC_WEBSOCKET_VERSION", "13"),
    ]
    .into_iter()
    .collect()
}

/// Rebuild a request context from the raw GET request a client driver
/// emitted, the way an HTTP frontend would present it.
fn ctx_from_request(bytes: &[u8]) -> RequestContext {
    let text = std::str::from_utf8(bytes).expect("request is ASCII");
    let mut lines = text.lines();
    let request_line = lines.next().expect("request line");
    let mut parts = request_line.split_whitespace();
    let mut ctx = RequestContext::new();
    ctx.set("REQUEST_METHOD", parts.next().unwrap());
    ctx.set("REQUEST_URI", parts.next().unwrap());
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':').unwrap();
        let key = format!("HTTP_{}", name.trim().to_uppercase().replace('-', "_"));
        ctx.set(key, value.trim());
    }
    ctx
}

/// Run the full Hybi handshake between a fresh client and server pair.
fn open_pair(
    client_config: Config,
    server_config: Config,
) -> (Driver<Recorder>, Driver<Recorder>) {
    let mut client =
        Driver::client("ws://example.com/chat", client_config, Recorder::default()).unwrap();
    assert!(client.start());
    let request = client.handler_mut().take_wire();

    let mut server = Driver::server(&ctx_from_request(&request), server_config, Recorder::default());
    assert!(server.start());
    let response = server.handler_mut().take_wire();

    client.parse(&response);
    assert_eq!(client.state(), ReadyState::Open);
    assert_eq!(server.state(), ReadyState::Open);
    (client, server)
}

#[test]
fn hybi_accept_header_vector() {
    let mut server = Driver::server(&hybi_ctx(), Config::new(), Recorder::default());
    assert!(server.start());
    let response = String::from_utf8(server.handler_mut().take_wire()).unwrap();
    assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    assert_eq!(
        server.handler().events,
        vec![Event::Open {
            protocol: String::new()
        }]
    );
}

#[test]
fn server_decodes_masked_text_frame() {
    let mut server = Driver::server(&hybi_ctx(), Config::new(), Recorder::default());
    server.start();
    server.handler_mut().take_wire();

    server.parse(&[
        0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
    ]);
    assert_eq!(
        server.handler().messages(),
        vec![&Message::Text("Hello".into())]
    );

    // Echo goes out unmasked, as a server must send it.
    assert!(server.text("Hello"));
    assert_eq!(
        server.handler().wire,
        vec![0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]
    );
}

#[test]
fn client_frames_are_masked_and_round_trip() {
    let (mut client, mut server) = open_pair(Config::new(), Config::new());

    assert!(client.text("Hello"));
    let frame = client.handler_mut().take_wire();
    assert_eq!(frame[0], 0x81);
    assert_eq!(frame[1], 0x85, "MASK bit must be set with length 5");
    // Unmasking the wire payload with the carried key restores the text.
    let key = [frame[2], frame[3], frame[4], frame[5]];
    let unmasked: Vec<u8> = frame[6..]
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ key[i % 4])
        .collect();
    assert_eq!(unmasked, b"Hello");

    server.parse(&frame);
    assert_eq!(
        server.handler().messages(),
        vec![&Message::Text("Hello".into())]
    );
}

#[test]
fn payload_length_boundaries_round_trip() {
    let (mut client, mut server) = open_pair(Config::new(), Config::new());
    let sizes = [0usize, 125, 126, 127, 65535, 65536];

    for &size in &sizes {
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        assert!(client.binary(&payload));
        server.parse(&client.handler_mut().take_wire());
        assert_eq!(
            server.handler().messages().last().unwrap(),
            &&Message::Binary(payload)
        );
    }
    assert_eq!(server.handler().messages().len(), sizes.len());
}

#[test]
fn empty_text_round_trips() {
    let (mut client, mut server) = open_pair(Config::new(), Config::new());
    assert!(client.text(""));
    server.parse(&client.handler_mut().take_wire());
    assert_eq!(server.handler().messages(), vec![&Message::Text(String::new())]);
}

#[test]
fn fragmented_message_assembles_once() {
    let (mut client, _server) = open_pair(Config::new(), Config::new());

    // Server-to-client fragments arrive unmasked.
    client.parse(&[0x01, 0x03, 0x48, 0x65, 0x6c]);
    assert!(client.handler().messages().is_empty());
    client.parse(&[0x80, 0x02, 0x6c, 0x6f]);
    assert_eq!(
        client.handler().messages(),
        vec![&Message::Text("Hello".into())]
    );
}

#[test]
fn sixteen_fragment_message_reassembles() {
    let (mut client, _server) = open_pair(Config::new(), Config::new());
    let mut expected = Vec::new();

    for i in 0..16u8 {
        let first = i == 0;
        let last = i == 15;
        let mut header = vec![
            u8::from(last) << 7 | u8::from(first) * 2, // binary then continuation
            1,
        ];
        header.push(i);
        expected.push(i);
        client.parse(&header);
    }
    assert_eq!(
        client.handler().messages(),
        vec![&Message::Binary(expected)]
    );
}

#[test]
fn control_frame_between_fragments_does_not_disturb_assembly() {
    let (mut client, _server) = open_pair(Config::new(), Config::new());

    client.parse(&[0x01, 0x03, 0x48, 0x65, 0x6c]);
    client.parse(&[0x89, 0x02, 0x68, 0x62]); // ping "hb"
    client.parse(&[0x80, 0x02, 0x6c, 0x6f]);

    let events = &client.handler().events;
    assert!(events.iter().any(|e| matches!(e, Event::Ping(p) if p == b"hb")));
    assert_eq!(
        client.handler().messages(),
        vec![&Message::Text("Hello".into())]
    );
}

#[test]
fn inbound_ping_gets_automatic_pong() {
    let (mut client, mut server) = open_pair(Config::new(), Config::new());

    client.parse(&[0x89, 0x02, 0x68, 0x62]); // unmasked ping from the server
    let pong = client.handler_mut().take_wire();
    server.parse(&pong);
    assert!(server
        .handler()
        .events
        .iter()
        .any(|e| matches!(e, Event::Pong(p) if p == b"hb")));
}

#[test]
fn ping_callback_fires_on_matching_pong() {
    let (mut client, mut server) = open_pair(Config::new(), Config::new());
    let fired = Rc::new(Cell::new(false));
    let flag = Rc::clone(&fired);

    assert!(client.ping(b"hb", Some(Box::new(move || flag.set(true)))));
    server.parse(&client.handler_mut().take_wire());
    assert!(server
        .handler()
        .events
        .iter()
        .any(|e| matches!(e, Event::Ping(p) if p == b"hb")));

    assert!(!fired.get());
    client.parse(&server.handler_mut().take_wire());
    assert!(fired.get());
    assert!(client
        .handler()
        .events
        .iter()
        .any(|e| matches!(e, Event::Pong(p) if p == b"hb")));
}

#[test]
fn reserved_bits_close_with_1002() {
    let mut server = Driver::server(&hybi_ctx(), Config::new(), Recorder::default());
    server.start();
    server.handler_mut().take_wire();

    let mut frame = Frame::text(b"x".to_vec());
    frame.rsv1 = true;
    server.parse(&frame.encode(Some(MASK)));

    assert_eq!(server.state(), ReadyState::Closed);
    let events = &server.handler().events;
    assert!(events.iter().any(|e| matches!(e, Event::Error { .. })));
    assert!(matches!(events.last(), Some(Event::Close { code: 1002, .. })));
    // A close frame with code 1002 went on the wire.
    let wire = &server.handler().wire;
    assert_eq!(wire[0], 0x88);
    assert_eq!(&wire[2..4], &1002u16.to_be_bytes());
}

#[test]
fn unmasked_frame_at_server_is_a_protocol_error() {
    let mut server = Driver::server(&hybi_ctx(), Config::new(), Recorder::default());
    server.start();

    server.parse(&[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
    assert_eq!(server.state(), ReadyState::Closed);
    assert!(matches!(
        server.handler().events.last(),
        Some(Event::Close { code: 1002, .. })
    ));
}

#[test]
fn masked_frame_at_client_is_a_protocol_error() {
    let (mut client, _server) = open_pair(Config::new(), Config::new());
    client.parse(&Frame::text(b"x".to_vec()).encode(Some(MASK)));
    assert_eq!(client.state(), ReadyState::Closed);
    assert!(matches!(
        client.handler().events.last(),
        Some(Event::Close { code: 1002, .. })
    ));
}

#[test]
fn invalid_utf8_text_closes_with_1007() {
    let mut server = Driver::server(&hybi_ctx(), Config::new(), Recorder::default());
    server.start();

    server.parse(&Frame::text(vec![0xC0, 0xAF]).encode(Some(MASK)));
    assert_eq!(server.state(), ReadyState::Closed);
    assert!(matches!(
        server.handler().events.last(),
        Some(Event::Close { code: 1007, .. })
    ));
}

#[test]
fn oversized_frame_closes_with_1009() {
    let config = Config::new().with_limits(Limits::new(1024, 1024, 8192));
    let mut server = Driver::server(&hybi_ctx(), config, Recorder::default());
    server.start();

    server.parse(&Frame::binary(vec![0u8; 2048]).encode(Some(MASK)));
    assert_eq!(server.state(), ReadyState::Closed);
    assert!(matches!(
        server.handler().events.last(),
        Some(Event::Close { code: 1009, .. })
    ));
}

#[test]
fn oversized_message_across_fragments_closes_with_1009() {
    let config = Config::new().with_limits(Limits::new(1024, 1500, 8192));
    let mut server = Driver::server(&hybi_ctx(), config, Recorder::default());
    server.start();

    let first = Frame::new(false, wsdriver::OpCode::Binary, vec![0u8; 1000]);
    server.parse(&first.encode(Some(MASK)));
    assert_eq!(server.state(), ReadyState::Open);

    let second = Frame::new(true, wsdriver::OpCode::Continuation, vec![0u8; 1000]);
    server.parse(&second.encode(Some(MASK)));
    assert!(matches!(
        server.handler().events.last(),
        Some(Event::Close { code: 1009, .. })
    ));
}

#[test]
fn peer_close_is_echoed_and_reported() {
    // Server receives a masked close 1000 and must write 88 02 03 e8 back.
    let mut server = Driver::server(&hybi_ctx(), Config::new(), Recorder::default());
    server.start();
    server.handler_mut().take_wire();

    server.parse(&Frame::close(Some(1000), "").encode(Some(MASK)));
    assert_eq!(server.handler().wire, vec![0x88, 0x02, 0x03, 0xe8]);
    assert_eq!(
        server.handler().events.last(),
        Some(&Event::Close {
            code: 1000,
            reason: String::new()
        })
    );
    assert_eq!(server.state(), ReadyState::Closed);
}

#[test]
fn close_without_code_synthesizes_1005() {
    let mut server = Driver::server(&hybi_ctx(), Config::new(), Recorder::default());
    server.start();
    server.handler_mut().take_wire();

    server.parse(&Frame::close(None, "").encode(Some(MASK)));
    // The echo carries no code either.
    assert_eq!(server.handler().wire, vec![0x88, 0x00]);
    assert_eq!(
        server.handler().events.last(),
        Some(&Event::Close {
            code: 1005,
            reason: String::new()
        })
    );
}

#[test]
fn close_with_reserved_code_is_a_protocol_error() {
    let mut server = Driver::server(&hybi_ctx(), Config::new(), Recorder::default());
    server.start();

    server.parse(&Frame::close(Some(1006), "").encode(Some(MASK)));
    assert!(matches!(
        server.handler().events.last(),
        Some(Event::Close { code: 1002, .. })
    ));
}

#[test]
fn local_close_handshake_completes_on_peer_close() {
    let (mut client, mut server) = open_pair(Config::new(), Config::new());

    assert!(client.close(Some(1000), "done"));
    assert_eq!(client.state(), ReadyState::Closing);

    server.parse(&client.handler_mut().take_wire());
    assert_eq!(server.state(), ReadyState::Closed);
    assert_eq!(
        server.handler().events.last(),
        Some(&Event::Close {
            code: 1000,
            reason: "done".into()
        })
    );

    client.parse(&server.handler_mut().take_wire());
    assert_eq!(client.state(), ReadyState::Closed);
    assert_eq!(
        client.handler().events.last(),
        Some(&Event::Close {
            code: 1000,
            reason: "done".into()
        })
    );
}

#[test]
fn sends_after_close_produce_nothing() {
    let (mut client, mut server) = open_pair(Config::new(), Config::new());
    client.close(Some(1000), "");
    server.parse(&client.handler_mut().take_wire());
    client.parse(&server.handler_mut().take_wire());
    assert_eq!(client.state(), ReadyState::Closed);

    assert!(!client.text("nope"));
    assert!(!client.binary(&[1]));
    assert!(!client.ping(b"x", None));
    assert!(!client.close(Some(1000), ""));
    assert!(client.handler().wire.is_empty());

    // Inbound bytes after close are silently discarded.
    let events_before = client.handler().events.len();
    client.parse(&[0x81, 0x01, 0x61]);
    assert_eq!(client.handler().events.len(), events_before);
}

#[test]
fn open_and_close_fire_exactly_once() {
    let (mut client, mut server) = open_pair(Config::new(), Config::new());
    client.text("one");
    server.parse(&client.handler_mut().take_wire());
    client.close(Some(1000), "");
    server.parse(&client.handler_mut().take_wire());
    client.parse(&server.handler_mut().take_wire());

    for recorder in [client.handler(), server.handler()] {
        let opens = recorder
            .events
            .iter()
            .filter(|e| matches!(e, Event::Open { .. }))
            .count();
        let closes = recorder
            .events
            .iter()
            .filter(|e| matches!(e, Event::Close { .. }))
            .count();
        assert_eq!(opens, 1);
        assert_eq!(closes, 1);
        assert!(matches!(recorder.events.last(), Some(Event::Close { .. })));
        assert!(matches!(recorder.events.first(), Some(Event::Open { .. })));
    }
}

#[test]
fn messages_queued_before_start_flush_in_order_on_open() {
    let mut client =
        Driver::client("ws://example.com/chat", Config::new(), Recorder::default()).unwrap();
    assert!(client.text("a"));
    assert!(client.binary(b"b"));
    assert!(client.handler().wire.is_empty());

    assert!(client.start());
    let request = client.handler_mut().take_wire();
    let mut server = Driver::server(&ctx_from_request(&request), Config::new(), Recorder::default());
    server.start();
    client.parse(&server.handler_mut().take_wire());
    assert_eq!(client.state(), ReadyState::Open);

    // Both queued messages hit the wire during the open transition,
    // in call order.
    server.parse(&client.handler_mut().take_wire());
    assert_eq!(
        server.handler().messages(),
        vec![&Message::Text("a".into()), &Message::Binary(b"b".to_vec())]
    );
}

#[test]
fn subprotocol_negotiation_end_to_end() {
    let client_config = Config::new().with_protocols(["superchat", "chat"]);
    let server_config = Config::new().with_protocols(["chat"]);
    let (client, server) = open_pair(client_config, server_config);

    assert_eq!(client.protocol(), "chat");
    assert_eq!(server.protocol(), "chat");
    assert!(matches!(
        client.handler().events.first(),
        Some(Event::Open { protocol }) if protocol == "chat"
    ));
}

#[test]
fn client_rejects_tampered_accept_header() {
    let mut client =
        Driver::client("ws://example.com/chat", Config::new(), Recorder::default()).unwrap();
    client.start();
    client.handler_mut().take_wire();

    client.parse(
        b"HTTP/1.1 101 Switching Protocols\r\n\
          Upgrade: websocket\r\n\
          Connection: Upgrade\r\n\
          Sec-WebSocket-Accept: AAAAAAAAAAAAAAAAAAAAAAAAAAA=\r\n\r\n",
    );
    assert_eq!(client.state(), ReadyState::Closed);
    let events = &client.handler().events;
    assert!(matches!(events[0], Event::Error { .. }));
    assert!(matches!(events[1], Event::Close { code: 1002, .. }));
    // No handshake was completed, so nothing else was written.
    assert!(client.handler().wire.is_empty());
}

#[test]
fn server_rejects_bad_version_at_start() {
    let mut ctx = hybi_ctx();
    ctx.set("HTTP_SEC_WEBSOCKET_VERSION", "7");
    let mut server = Driver::server(&ctx, Config::new(), Recorder::default());
    assert!(!server.start());
    assert_eq!(server.state(), ReadyState::Closed);
    assert!(server.handler().wire.is_empty());
    let events = &server.handler().events;
    assert!(matches!(events[0], Event::Error { .. }));
    assert!(matches!(events[1], Event::Close { code: 1002, .. }));
}

#[test]
fn byte_at_a_time_parsing_matches_whole_feed() {
    let mut whole = Driver::server(&hybi_ctx(), Config::new(), Recorder::default());
    whole.start();
    let mut split = Driver::server(&hybi_ctx(), Config::new(), Recorder::default());
    split.start();

    let mut stream = Vec::new();
    stream.extend_from_slice(&Frame::text(b"Hello".to_vec()).encode(Some(MASK)));
    stream.extend_from_slice(&Frame::ping(b"hb".to_vec()).encode(Some([1, 2, 3, 4])));
    stream.extend_from_slice(&Frame::binary(vec![0u8; 300]).encode(Some(MASK)));

    whole.parse(&stream);
    for byte in &stream {
        split.parse(std::slice::from_ref(byte));
    }

    assert_eq!(whole.handler().events, split.handler().events);
}

#[test]
fn response_and_first_frames_in_one_packet() {
    let mut client =
        Driver::client("ws://example.com/chat", Config::new(), Recorder::default()).unwrap();
    client.start();
    let request = client.handler_mut().take_wire();
    let mut server = Driver::server(&ctx_from_request(&request), Config::new(), Recorder::default());
    server.start();
    server.text("early bird");

    // Handshake response and the first data frame arrive together.
    client.parse(&server.handler_mut().take_wire());
    assert_eq!(client.state(), ReadyState::Open);
    assert_eq!(
        client.handler().messages(),
        vec![&Message::Text("early bird".into())]
    );
}

#[test]
fn hixie76_challenge_end_to_end() {
    let ctx: RequestContext = [
        ("REQUEST_METHOD", "GET"),
        ("REQUEST_URI", "/demo"),
        ("HTTP_HOST", "example.com"),
        ("HTTP_CONNECTION", "Upgrade"),
        ("HTTP_UPGRADE", "WebSocket"),
        ("HTTP_ORIGIN", "http://example.com"),
        ("HTTP_SEC_WEBSOCKET_KEY1", "4 @1  46546xW%0l 1 5"),
        ("HTTP_SEC_WEBSOCKET_KEY2", "12998 5 Y3 1  .P00"),
    ]
    .into_iter()
    .collect();

    let mut server = Driver::server(&ctx, Config::new(), Recorder::default());
    assert_eq!(server.version(), "hixie-76");
    assert!(server.start());

    let head = String::from_utf8(server.handler_mut().take_wire()).unwrap();
    assert!(head.starts_with("HTTP/1.1 101 WebSocket Protocol Handshake\r\n"));
    assert!(head.contains("Sec-WebSocket-Location: ws://example.com/demo\r\n"));
    assert!(head.ends_with("\r\n\r\n"));
    assert_eq!(server.state(), ReadyState::Connecting);

    // Proxy delivers the 8-byte body separately; the MD5 digest of
    // big-endian 829309203 || 259970620 || body completes the handshake.
    server.parse(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]);
    assert_eq!(
        server.handler().wire,
        vec![
            0xbd, 0xec, 0xbe, 0x4a, 0x4d, 0x76, 0x1c, 0xfa, 0x90, 0x17, 0x2c, 0x59, 0x69, 0x7d,
            0x46, 0xdb,
        ]
    );
    assert_eq!(server.state(), ReadyState::Open);

    // Hixie framing from here on.
    server.parse(b"\x00hello\xFF");
    assert_eq!(
        server.handler().messages(),
        vec![&Message::Text("hello".into())]
    );
}

#[test]
fn hixie75_handshake_and_capabilities() {
    let ctx: RequestContext = [
        ("REQUEST_METHOD", "GET"),
        ("REQUEST_URI", "/demo"),
        ("HTTP_HOST", "example.com"),
        ("HTTP_CONNECTION", "Upgrade"),
        ("HTTP_UPGRADE", "WebSocket"),
        ("HTTP_ORIGIN", "http://example.com"),
    ]
    .into_iter()
    .collect();

    let mut server = Driver::server(&ctx, Config::new(), Recorder::default());
    assert_eq!(server.version(), "hixie-75");
    assert!(server.start());

    let response = String::from_utf8(server.handler_mut().take_wire()).unwrap();
    assert!(response.starts_with("HTTP/1.1 101 Web Socket Protocol Handshake\r\n"));
    assert!(response.contains("WebSocket-Origin: http://example.com\r\n"));
    assert_eq!(server.state(), ReadyState::Open);

    assert!(!server.binary(&[1, 2, 3]));
    assert!(!server.ping(b"hb", None));
    assert!(server.text("hi"));
    assert_eq!(server.handler().wire, b"\x00hi\xFF");

    // Hixie close is local-only and immediate.
    assert!(server.close(None, ""));
    assert_eq!(server.state(), ReadyState::Closed);
    assert_eq!(
        server.handler().events.last(),
        Some(&Event::Close {
            code: 1000,
            reason: String::new()
        })
    );
}
