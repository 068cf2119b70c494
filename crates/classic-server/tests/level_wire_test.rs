//! Wire-format test for the outbound level sub-protocol: the chunk frames'
//! valid prefixes must concatenate and decompress to the length-prefixed
//! level bytes, framed by start-level and finish-level.

use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use classic_core::{ClientConnection, ServerHandler, ServerHandlerFactory};
use classic_proto::{Position, Result};
use classic_server::ClientSession;
use flate2::read::GzDecoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex, split};
use tokio::time::timeout;

struct LevelSender;

#[async_trait]
impl ServerHandler for LevelSender {
    async fn ready(&mut self, conn: &mut dyn ClientConnection) -> Result<()> {
        conn.send_level(Position::new(2, 3, 4), &[1, 2, 3, 4, 5]).await
    }
}

fn padded(text: &str) -> [u8; 64] {
    let mut field = [b' '; 64];
    field[..text.len()].copy_from_slice(text.as_bytes());
    field
}

#[tokio::test]
async fn level_wire_format() {
    let (near, mut far) = duplex(256 * 1024);
    let (reader, writer) = split(near);

    let factory: ServerHandlerFactory = Box::new(|_info| Box::new(LevelSender));
    let mut session = ClientSession::new(reader, writer, factory);

    let mut hello = vec![0x00, 7];
    hello.extend_from_slice(&padded("Alice"));
    hello.extend_from_slice(&padded("xxxx"));
    hello.push(0x00);
    far.write_all(&hello).await.unwrap();
    far.shutdown().await.unwrap();

    timeout(Duration::from_secs(5), session.run()).await.expect("session hung").unwrap();
    drop(session);

    let mut wire = Vec::new();
    far.read_to_end(&mut wire).await.unwrap();

    // start-level carries no payload.
    assert_eq!(wire[0], 0x02);

    // One or more 1028-byte chunk frames follow; collect the valid prefixes.
    let mut offset = 1;
    let mut compressed = Vec::new();
    while wire[offset] == 0x03 {
        let valid = i16::from_be_bytes([wire[offset + 1], wire[offset + 2]]);
        assert!((0..=1024).contains(&valid));
        let data = &wire[offset + 3..offset + 3 + 1024];
        compressed.extend_from_slice(&data[..valid as usize]);
        let _percent = wire[offset + 3 + 1024];
        offset += 1 + 2 + 1024 + 1;
    }
    assert!(!compressed.is_empty());

    let mut payload = Vec::new();
    GzDecoder::new(&compressed[..]).read_to_end(&mut payload).unwrap();
    assert_eq!(&payload[..4], &5u32.to_be_bytes());
    assert_eq!(&payload[4..], &[1, 2, 3, 4, 5]);

    // finish-level carries the spawn position.
    assert_eq!(&wire[offset..offset + 7], &[0x04, 0, 2, 0, 3, 0, 4]);
    assert_eq!(wire.len(), offset + 7);
}
