//! The primitive codec bound to a byte stream, plus CPE negotiation state.
//!
//! A [`Connection`] owns one end of a full-duplex stream and everything the
//! codec needs that the handshake can change under it: the text encoding
//! (ASCII until `FullCP437` negotiates) and the location axis width (16-bit
//! until `ExtEntityPositions` negotiates). All reads are exact — a stream
//! that ends mid-field surfaces as `ConnectionClosed`.
//!
//! Outbound frames are assembled in a scratch buffer and written with a
//! single `write_all` + `flush`, so frames from one session are never
//! interleaved on the wire.

use std::collections::HashSet;

use bytes::{BufMut, BytesMut};
use classic_proto::{
    Extension, Location, Opcode, Position, ProtocolError, Result, TextEncoding, text,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Vendor sentinel before any CPE traffic has been seen.
pub const NO_VENDOR: &str = "(no vendor)";

/// Vendor sentinel once a CPE magic byte has arrived but no ext-info yet.
pub const UNKNOWN_VENDOR: &str = "(unknown)";

/// Result of processing one ext-entry frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtNegotiation {
    /// More ext-entry frames are expected from the peer.
    Pending,
    /// The countdown hit zero; the peer's extension set is final.
    Complete,
}

/// One endpoint's bound reader/writer pair and negotiation-mutable state.
///
/// The session roles compose this struct; it knows nothing about which
/// opcodes either role emits or accepts beyond the two CPE frames shared by
/// both (ext-info, ext-entry).
#[derive(Debug)]
pub struct Connection<R, W> {
    reader: R,
    writer: W,
    /// Agent string announced in our ext-info.
    agent: String,
    /// Extensions this endpoint offers, in announcement order.
    supported: Vec<Extension>,

    alive: bool,
    vendor: String,
    /// The peer's announced extension set; empty until negotiation completes.
    extensions: HashSet<Extension>,
    /// Remaining ext-entry frames announced by the peer's ext-info.
    ext_left: u16,

    text_encoding: TextEncoding,
    location_width: classic_proto::LocationWidth,

    current_opcode: Option<u8>,
    last_opcode: Option<u8>,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Bind a connection to a reader/writer pair.
    ///
    /// `agent` is the string announced in our ext-info; `supported` the
    /// extension set this endpoint offers.
    pub fn new(reader: R, writer: W, agent: String, supported: Vec<Extension>) -> Self {
        Self {
            reader,
            writer,
            agent,
            supported,
            alive: true,
            vendor: NO_VENDOR.to_string(),
            extensions: HashSet::new(),
            ext_left: 0,
            text_encoding: TextEncoding::default(),
            location_width: classic_proto::LocationWidth::default(),
            current_opcode: None,
            last_opcode: None,
        }
    }

    /// Whether the session is still live. Outbound role methods are no-ops
    /// once this is false.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Mark the session dead. Idempotent; the frame loop exits at its next
    /// iteration and the role delivers the disconnect upcall.
    pub fn close(&mut self) {
        self.alive = false;
    }

    /// The peer's announced agent string, or a sentinel.
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// Overwrite the vendor string (sentinel bookkeeping on the server).
    pub fn set_vendor(&mut self, vendor: &str) {
        self.vendor = vendor.to_string();
    }

    /// Whether the peer announced the given extension.
    pub fn supports(&self, extension: &Extension) -> bool {
        self.extensions.contains(extension)
    }

    /// The peer's announced extension set.
    pub fn extensions(&self) -> &HashSet<Extension> {
        &self.extensions
    }

    /// Extensions this endpoint offers.
    pub fn advertised(&self) -> &[Extension] {
        &self.supported
    }

    /// Text encoding currently in effect.
    pub fn text_encoding(&self) -> TextEncoding {
        self.text_encoding
    }

    /// Location axis width currently in effect.
    pub fn location_width(&self) -> classic_proto::LocationWidth {
        self.location_width
    }

    /// Opcode currently being decoded, if any.
    pub fn current_opcode(&self) -> Option<u8> {
        self.current_opcode
    }

    /// Most recent fully-decoded opcode.
    pub fn last_opcode(&self) -> Option<u8> {
        self.last_opcode
    }

    /// Record the opcode the frame loop is about to decode.
    pub fn begin_frame(&mut self, opcode: u8) {
        self.current_opcode = Some(opcode);
    }

    /// Record that the current frame decoded completely.
    pub fn finish_frame(&mut self) {
        self.last_opcode = self.current_opcode.take();
    }

    // Reads. All exact; EOF mid-field is ConnectionClosed.

    /// Read an unsigned 8-bit integer.
    pub async fn read_u8(&mut self) -> Result<u8> {
        Ok(self.reader.read_u8().await?)
    }

    /// Read a signed 8-bit integer.
    pub async fn read_i8(&mut self) -> Result<i8> {
        Ok(self.reader.read_i8().await?)
    }

    /// Read a signed big-endian 16-bit integer.
    pub async fn read_i16(&mut self) -> Result<i16> {
        Ok(self.reader.read_i16().await?)
    }

    /// Read an unsigned big-endian 16-bit integer.
    pub async fn read_u16(&mut self) -> Result<u16> {
        Ok(self.reader.read_u16().await?)
    }

    /// Read an unsigned big-endian 32-bit integer.
    pub async fn read_u32(&mut self) -> Result<u32> {
        Ok(self.reader.read_u32().await?)
    }

    /// Read exactly `len` bytes.
    pub async fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Read a 64-byte string field and decode it under the current encoding.
    pub async fn read_string(&mut self) -> Result<String> {
        let field = self.read_string_raw().await?;
        text::decode_padded(&field, self.text_encoding)
    }

    /// Read a 64-byte string field without decoding (chat reassembly).
    pub async fn read_string_raw(&mut self) -> Result<[u8; text::STRING_BYTES]> {
        let mut field = [0u8; text::STRING_BYTES];
        self.reader.read_exact(&mut field).await?;
        Ok(field)
    }

    /// Read a block-space position.
    pub async fn read_position(&mut self) -> Result<Position> {
        let bytes = self.read_bytes(Position::WIRE_SIZE).await?;
        Ok(Position::decode(&mut &bytes[..]))
    }

    /// Read a fractional-space location at the current axis width.
    pub async fn read_location(&mut self) -> Result<Location> {
        let bytes = self.read_bytes(self.location_width.wire_size()).await?;
        Ok(Location::decode(&mut &bytes[..], self.location_width))
    }

    // Frame assembly and writes.

    /// Start a frame: a scratch buffer seeded with the opcode byte.
    pub fn frame(&self, opcode: Opcode) -> BytesMut {
        let mut buf = BytesMut::with_capacity(80);
        buf.put_u8(opcode.to_u8());
        buf
    }

    /// Append a 64-byte string field encoded under the current encoding.
    pub fn put_string(&self, buf: &mut BytesMut, value: &str) -> Result<()> {
        buf.put_slice(&text::encode_padded(value, self.text_encoding)?);
        Ok(())
    }

    /// Append a location at the current axis width.
    pub fn put_location(&self, buf: &mut BytesMut, location: Location) {
        location.encode(buf, self.location_width);
    }

    /// Write one assembled frame to the stream and flush it.
    pub async fn send(&mut self, frame: BytesMut) -> Result<()> {
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Emit a chat message as one frame per 64 encoded bytes. Non-final
    /// fragments carry continuation flag 1, the final fragment 0; the
    /// receiving side appends fragments and delivers on flag 0.
    ///
    /// An empty message emits nothing.
    pub async fn send_chat(&mut self, message: &str) -> Result<()> {
        let raw = text::encode_bytes(message, self.text_encoding)?;
        let fragments = raw.len().div_ceil(text::STRING_BYTES);
        for (index, fragment) in raw.chunks(text::STRING_BYTES).enumerate() {
            let last = index + 1 == fragments;
            let mut buf = self.frame(Opcode::Message);
            buf.put_u8(u8::from(!last));
            buf.put_slice(&text::pad_field(fragment));
            self.send(buf).await?;
        }
        Ok(())
    }

    // CPE negotiation, shared by both roles.

    /// Announce our extension set: one ext-info frame, then one ext-entry
    /// frame per supported extension.
    pub async fn write_extensions(&mut self) -> Result<()> {
        let mut buf = self.frame(Opcode::ExtInfo);
        self.put_string(&mut buf, &self.agent)?;
        buf.put_i16(self.supported.len() as i16);
        for extension in &self.supported {
            buf.put_u8(Opcode::ExtEntry.to_u8());
            buf.put_slice(&text::encode_padded(&extension.name, self.text_encoding)?);
            buf.put_u32(extension.version);
        }
        tracing::debug!(agent = %self.agent, count = self.supported.len(), "announcing extensions");
        self.send(buf).await
    }

    /// Decode an inbound ext-info frame: vendor string and entry count.
    pub async fn handle_ext_info(&mut self) -> Result<()> {
        let vendor = self.read_string().await?;
        let count = self.read_i16().await?;
        if count < 0 {
            return Err(ProtocolError::ProtocolViolation(format!(
                "negative ext-entry count {count}"
            )));
        }
        tracing::debug!(vendor = %vendor, count, "peer ext-info");
        self.vendor = vendor;
        self.ext_left = count as u16;
        Ok(())
    }

    /// Decode an inbound ext-entry frame and count it down.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::ProtocolViolation` if the peer sends more entries
    ///   than its ext-info announced
    pub async fn handle_ext_entry(&mut self) -> Result<ExtNegotiation> {
        let name = self.read_string().await?;
        let version = self.read_u32().await?;
        if self.ext_left == 0 {
            return Err(ProtocolError::ProtocolViolation(format!(
                "ext-entry {name} past the announced count"
            )));
        }
        self.extensions.insert(Extension::new(name, version));
        self.ext_left -= 1;
        Ok(if self.ext_left == 0 { ExtNegotiation::Complete } else { ExtNegotiation::Pending })
    }

    /// Reconfigure the codec from the now-final extension set. Called by the
    /// roles when the ext-entry countdown completes.
    pub fn apply_negotiated(&mut self) {
        if self.supports(&Extension::ENTITY_POSITIONS) {
            self.location_width = classic_proto::LocationWidth::Int;
        }
        if self.supports(&Extension::FULL_CP437) {
            self.text_encoding = TextEncoding::Cp437;
        }
        tracing::debug!(
            vendor = %self.vendor,
            extensions = self.extensions.len(),
            width = ?self.location_width,
            encoding = ?self.text_encoding,
            "extension negotiation complete"
        );
    }
}
