//! Server session handshake tests against scripted client bytes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use classic_core::{Click, ClientConnection, ServerHandler, ServerHandlerFactory, SessionInfo};
use classic_proto::{
    Extension, LocationWidth, Position, ProtocolError, Result, TextEncoding,
};
use classic_server::ClientSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf, duplex, split};
use tokio::time::timeout;

type Events = Arc<Mutex<Vec<String>>>;

/// Greets on ready so the identification frame shows up on the wire, and
/// journals everything else.
struct Greeter {
    events: Events,
}

impl Greeter {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ServerHandler for Greeter {
    async fn ready(&mut self, conn: &mut dyn ClientConnection) -> Result<()> {
        self.push("ready".to_string());
        conn.world_info("World", "Hi", false).await
    }

    async fn change_block(
        &mut self,
        _conn: &mut dyn ClientConnection,
        position: Position,
        placed: bool,
        holding: u8,
    ) -> Result<()> {
        self.push(format!("block {},{},{} {placed} {holding}", position.x, position.y, position.z));
        Ok(())
    }

    async fn submit_message(
        &mut self,
        _conn: &mut dyn ClientConnection,
        message: &str,
    ) -> Result<()> {
        self.push(format!("chat {message}"));
        Ok(())
    }

    async fn click(&mut self, _conn: &mut dyn ClientConnection, click: Click) -> Result<()> {
        self.push(format!(
            "click {} {} at {},{},{} face {}",
            click.button, click.action, click.target.x, click.target.y, click.target.z, click.face
        ));
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.push("disconnect".to_string());
    }
}

fn greeter_factory(events: Events) -> ServerHandlerFactory {
    Box::new(move |info: &SessionInfo| {
        events
            .lock()
            .unwrap()
            .push(format!("factory {}", info.username.clone().unwrap_or_default()));
        Box::new(Greeter { events })
    })
}

type TestSession = ClientSession<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

fn session(events: Events) -> (TestSession, DuplexStream) {
    let (near, far) = duplex(256 * 1024);
    let (reader, writer) = split(near);
    (ClientSession::new(reader, writer, greeter_factory(events)), far)
}

fn padded(text: &str) -> [u8; 64] {
    let mut field = [b' '; 64];
    field[..text.len()].copy_from_slice(text.as_bytes());
    field
}

fn client_hello(username: &str, magic: u8) -> Vec<u8> {
    let mut frame = vec![0x00, 7];
    frame.extend_from_slice(&padded(username));
    frame.extend_from_slice(&padded("xxxx"));
    frame.push(magic);
    frame
}

async fn run_to_eof(session: &mut TestSession) -> Result<()> {
    timeout(Duration::from_secs(5), session.run()).await.expect("session hung")
}

async fn drain(session: TestSession, mut far: DuplexStream) -> Vec<u8> {
    drop(session);
    let mut wire = Vec::new();
    far.read_to_end(&mut wire).await.unwrap();
    wire
}

#[tokio::test]
async fn non_cpe_handshake_skips_ext_info() {
    let events = Events::default();
    let (mut session, mut far) = session(events.clone());

    far.write_all(&client_hello("Alice", 0x00)).await.unwrap();
    far.shutdown().await.unwrap();

    assert_eq!(run_to_eof(&mut session).await, Ok(()));
    assert_eq!(session.username(), Some("Alice"));
    assert!(session.connection().extensions().is_empty());
    assert_eq!(session.connection().location_width(), LocationWidth::Short);
    assert_eq!(session.connection().text_encoding(), TextEncoding::Ascii);
    assert_eq!(session.connection().vendor(), "(no vendor)");

    assert_eq!(*events.lock().unwrap(), vec!["factory Alice", "ready", "disconnect"]);

    // The only frame on the wire is the identification: no ext-info.
    let wire = drain(session, far).await;
    assert_eq!(wire.len(), 131);
    assert_eq!(wire[0], 0x00);
    assert_eq!(wire[1], 7);
    assert_eq!(wire[2..66], padded("World"));
    assert_eq!(wire[66..130], padded("Hi"));
    assert_eq!(wire[130], 0x00);
}

#[tokio::test]
async fn cpe_handshake_negotiates_and_fires_ready_on_last_entry() {
    let events = Events::default();
    let (mut session, mut far) = session(events.clone());

    far.write_all(&client_hello("Alice", 0x42)).await.unwrap();

    let mut ext_info = vec![0x10];
    ext_info.extend_from_slice(&padded("cli"));
    ext_info.extend_from_slice(&2i16.to_be_bytes());
    far.write_all(&ext_info).await.unwrap();
    for name in ["ExtEntityPositions", "FullCP437"] {
        let mut entry = vec![0x11];
        entry.extend_from_slice(&padded(name));
        entry.extend_from_slice(&1u32.to_be_bytes());
        far.write_all(&entry).await.unwrap();
    }
    far.shutdown().await.unwrap();

    assert_eq!(run_to_eof(&mut session).await, Ok(()));
    assert_eq!(session.connection().vendor(), "cli");
    assert!(session.connection().supports(&Extension::ENTITY_POSITIONS));
    assert!(session.connection().supports(&Extension::FULL_CP437));
    assert_eq!(session.connection().location_width(), LocationWidth::Int);
    assert_eq!(session.connection().text_encoding(), TextEncoding::Cp437);

    assert_eq!(*events.lock().unwrap(), vec!["factory Alice", "ready", "disconnect"]);

    // Wire order: our ext-info, our eight ext-entries, then the
    // application-driven identification.
    let wire = drain(session, far).await;
    assert_eq!(wire[0], 0x10);
    let announced = i16::from_be_bytes([wire[65], wire[66]]);
    assert_eq!(announced, 8);
    let mut offset = 67;
    let mut names = Vec::new();
    for _ in 0..announced {
        assert_eq!(wire[offset], 0x11);
        let name = String::from_utf8(wire[offset + 1..offset + 65].to_vec()).unwrap();
        names.push(name.trim_end().to_string());
        offset += 69;
    }
    assert!(names.contains(&"ExtEntityPositions".to_string()));
    assert!(names.contains(&"HeldBlock".to_string()));
    assert_eq!(wire[offset], 0x00, "identification follows the announcement");
}

#[tokio::test]
async fn version_mismatch_sends_reasoned_disconnect() {
    let events = Events::default();
    let (mut session, mut far) = session(events.clone());

    let mut hello = client_hello("Alice", 0x00);
    hello[1] = 6;
    far.write_all(&hello).await.unwrap();

    let result = run_to_eof(&mut session).await;
    assert_eq!(result, Err(ProtocolError::VersionMismatch(6)));

    // The factory never ran.
    assert!(events.lock().unwrap().is_empty());

    let wire = drain(session, far).await;
    assert_eq!(wire[0], 0x0E);
    let reason = String::from_utf8(wire[1..65].to_vec()).unwrap();
    assert!(reason.trim_end().contains("version"), "reason was {reason:?}");
}

#[tokio::test]
async fn ext_entry_overflow_is_a_violation() {
    let events = Events::default();
    let (mut session, mut far) = session(events.clone());

    far.write_all(&client_hello("Alice", 0x42)).await.unwrap();

    let mut ext_info = vec![0x10];
    ext_info.extend_from_slice(&padded("cli"));
    ext_info.extend_from_slice(&1i16.to_be_bytes());
    far.write_all(&ext_info).await.unwrap();
    for name in ["HeldBlock", "TextColors"] {
        let mut entry = vec![0x11];
        entry.extend_from_slice(&padded(name));
        entry.extend_from_slice(&1u32.to_be_bytes());
        far.write_all(&entry).await.unwrap();
    }

    let result = run_to_eof(&mut session).await;
    assert!(matches!(result, Err(ProtocolError::ProtocolViolation(_))));

    // Best-effort disconnect frame went out after our announcement.
    let wire = drain(session, far).await;
    let disconnect = wire.iter().position(|&byte| byte == 0x0E);
    assert!(disconnect.is_some());
}

#[tokio::test]
async fn repeated_hello_is_a_violation() {
    let events = Events::default();
    let (mut session, mut far) = session(events.clone());

    far.write_all(&client_hello("Alice", 0x00)).await.unwrap();
    far.write_all(&client_hello("Alice", 0x00)).await.unwrap();

    let result = run_to_eof(&mut session).await;
    assert!(matches!(result, Err(ProtocolError::ProtocolViolation(_))));

    // ready fired once for the first hello; disconnect exactly once.
    let events = events.lock().unwrap();
    assert_eq!(events.iter().filter(|event| *event == "ready").count(), 1);
    assert_eq!(events.iter().filter(|event| *event == "disconnect").count(), 1);
}

#[tokio::test]
async fn outbound_after_close_writes_nothing() {
    let events = Events::default();
    let (mut session, far) = session(events);

    session.close();
    session.world_info("World", "Hi", true).await.unwrap();
    session.set_block(Position::new(1, 2, 3), 4).await.unwrap();
    session.send_level(Position::new(0, 0, 0), &[1, 2, 3]).await.unwrap();
    session.kick("bye").await.unwrap();

    let wire = drain(session, far).await;
    assert!(wire.is_empty());
}

#[tokio::test]
async fn inbound_frames_reach_the_handler() {
    let events = Events::default();
    let (mut session, mut far) = session(events.clone());

    far.write_all(&client_hello("Alice", 0x00)).await.unwrap();

    // change-block: position, placed, holding.
    far.write_all(&[0x05, 0, 1, 0, 2, 0, 3, 1, 42]).await.unwrap();

    // Single-fragment chat.
    let mut chat = vec![0x0D, 0x00];
    chat.extend_from_slice(&padded("hi there"));
    far.write_all(&chat).await.unwrap();

    // Player click: button, action, yaw, pitch, target entity, block, face.
    let mut click = vec![0x22, 1, 0];
    click.extend_from_slice(&100u16.to_be_bytes());
    click.extend_from_slice(&200u16.to_be_bytes());
    click.push(255);
    click.extend_from_slice(&[0, 4, 0, 5, 0, 6]);
    click.push(2);
    far.write_all(&click).await.unwrap();
    far.shutdown().await.unwrap();

    assert_eq!(run_to_eof(&mut session).await, Ok(()));

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "factory Alice",
            "ready",
            "block 1,2,3 true 42",
            "chat hi there",
            "click 1 0 at 4,5,6 face 2",
            "disconnect",
        ]
    );
}

#[tokio::test]
async fn gated_operations_without_negotiation_write_nothing() {
    // A live session with no extensions negotiated: every gated operation
    // must stay silent.
    let events = Events::default();
    let (mut session, far) = session(events);

    session.hold_this(5, true).await.unwrap();
    session.add_player(1, "Bob", None, "", None).await.unwrap();
    session.remove_player(1).await.unwrap();
    session.set_color_code(b'h', 1, 2, 3, 4).await.unwrap();
    session.set_block_permission(7, true, false).await.unwrap();
    session.set_message(1, "status").await.unwrap();

    let wire = drain(session, far).await;
    assert!(wire.is_empty(), "gated frames leaked: {wire:?}");
}
