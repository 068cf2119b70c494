//! The server endpoint: one accepted client connection.

use classic_core::{
    Click, ClientConnection, Connection, ExtNegotiation, ServerHandlerFactory, SessionInfo,
    UNKNOWN_VENDOR, level,
};
use classic_proto::{
    CPE_MAGIC, Extension, LEVEL_CHUNK_BYTES, Location, Opcode, PROTOCOL_VERSION, Position,
    ProtocolError, Result, text,
};
use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncWrite};

/// Wire byte for operator status in the identification frame.
const OPERATOR_BYTE: u8 = 0x64;

/// Deliver an upcall, lending the session to the handler as its outbound
/// connection. The handler is parked outside `self` for the duration so the
/// borrow checker lets it call back into us.
macro_rules! upcall {
    ($self:ident, $method:ident ( $($arg:expr),* $(,)? )) => {{
        match $self.handler.take() {
            Some(mut handler) => {
                let result = handler.$method($self, $($arg),*).await;
                $self.handler = Some(handler);
                result
            },
            None => Err(ProtocolError::ProtocolViolation(concat!(
                "data frame before handshake completion: ",
                stringify!($method)
            )
            .to_string())),
        }
    }};
}

/// Our end of one accepted client connection.
///
/// Built by [`crate::Server`] for every accepted stream (or by [`Self::new`]
/// over any stream). [`Self::run`] drives the frame loop; inbound frames
/// surface on the [`classic_core::ServerHandler`] produced by the factory
/// once the handshake reaches steady state, and the outbound surface is the
/// [`ClientConnection`] impl.
pub struct ClientSession<R, W> {
    conn: Connection<R, W>,
    factory: Option<ServerHandlerFactory>,
    handler: Option<Box<dyn classic_core::ServerHandler>>,

    username: Option<String>,
    token: Option<String>,

    last_location: Option<Location>,
    last_held: Option<u8>,
    partial_message: Vec<u8>,
}

impl<R, W> ClientSession<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Extensions this endpoint announces.
    fn advertised() -> Vec<Extension> {
        vec![
            Extension::EXT_PLAYER_LIST,
            Extension::MESSAGE_TYPES,
            Extension::HELD_BLOCK,
            Extension::LONGER_MESSAGES,
            Extension::BLOCK_PERMISSIONS,
            Extension::PLAYER_CLICK,
            Extension::ENTITY_POSITIONS,
            Extension::FULL_CP437,
        ]
    }

    /// Build a session over an arbitrary reader/writer pair.
    pub fn new(reader: R, writer: W, factory: ServerHandlerFactory) -> Self {
        let agent = format!("classic-server/{}", env!("CARGO_PKG_VERSION"));
        Self {
            conn: Connection::new(reader, writer, agent, Self::advertised()),
            factory: Some(factory),
            handler: None,
            username: None,
            token: None,
            last_location: None,
            last_held: None,
            partial_message: Vec::new(),
        }
    }

    /// The underlying connection (negotiation state, diagnostics).
    pub fn connection(&self) -> &Connection<R, W> {
        &self.conn
    }

    /// Username from the client hello, once received.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Verification token from the client hello, once received.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Drive the frame loop until the session closes.
    ///
    /// EOF and connection reset end the loop silently (`Ok`). On a protocol
    /// violation or version mismatch the client is sent a disconnect frame
    /// with a short reason before the session closes, and the error is
    /// returned. Either way the handler's `disconnect` upcall is delivered
    /// exactly once.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.frame_loop().await;
        if let Err(err) = &result {
            match err {
                ProtocolError::ConnectionClosed => tracing::debug!("client stream closed"),
                other => {
                    tracing::warn!(%other, "closing session on protocol error");
                    self.send_kick_frame(&other.to_string()).await;
                },
            }
        }
        self.conn.close();
        if let Some(mut handler) = self.handler.take() {
            handler.disconnect().await;
        }
        match result {
            Err(ProtocolError::ConnectionClosed) => Ok(()),
            other => other,
        }
    }

    async fn frame_loop(&mut self) -> Result<()> {
        while self.conn.is_alive() {
            let opcode = self.conn.read_u8().await?;
            self.conn.begin_frame(opcode);
            self.dispatch(opcode).await?;
            self.conn.finish_frame();
        }
        Ok(())
    }

    async fn dispatch(&mut self, opcode: u8) -> Result<()> {
        match Opcode::from_u8(opcode) {
            Some(Opcode::Hello) => self.handle_hello().await,
            Some(Opcode::ChangeBlock) => self.handle_change_block().await,
            Some(Opcode::AbsoluteLocation) => self.handle_location_change().await,
            Some(Opcode::Message) => self.handle_message().await,
            Some(Opcode::PlayerClick) => self.handle_click().await,
            Some(Opcode::ExtInfo) => self.conn.handle_ext_info().await,
            Some(Opcode::ExtEntry) => {
                if self.conn.handle_ext_entry().await? == ExtNegotiation::Complete {
                    self.received_extensions().await?;
                }
                Ok(())
            },
            Some(other) => Err(ProtocolError::ProtocolViolation(format!(
                "server-bound stream carried {other:?}"
            ))),
            None => Err(ProtocolError::ProtocolViolation(format!("unknown opcode {opcode:#04x}"))),
        }
    }

    /// Negotiation is final: reconfigure the codec, install the application
    /// handler, and deliver `ready`. Also the non-CPE fast path, with an
    /// empty extension set.
    async fn received_extensions(&mut self) -> Result<()> {
        self.conn.apply_negotiated();
        if let Some(factory) = self.factory.take() {
            let info = SessionInfo {
                username: self.username.clone(),
                vendor: self.conn.vendor().to_string(),
                extensions: self.conn.extensions().clone(),
            };
            self.handler = Some(factory(&info));
            tracing::info!(
                user = info.username.as_deref().unwrap_or("?"),
                vendor = %info.vendor,
                extensions = info.extensions.len(),
                "session ready"
            );
            return upcall!(self, ready());
        }
        Ok(())
    }

    async fn handle_hello(&mut self) -> Result<()> {
        if self.username.is_some() {
            return Err(ProtocolError::ProtocolViolation("client hello more than once".to_string()));
        }
        let version = self.conn.read_u8().await?;
        let username = self.conn.read_string().await?;
        let token = self.conn.read_string().await?;
        let magic = self.conn.read_u8().await?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch(version));
        }

        tracing::debug!(user = %username, cpe = magic == CPE_MAGIC, "client hello");
        self.username = Some(username);
        self.token = Some(token);

        if magic == CPE_MAGIC {
            self.conn.set_vendor(UNKNOWN_VENDOR);
            self.conn.write_extensions().await
        } else {
            self.received_extensions().await
        }
    }

    async fn handle_change_block(&mut self) -> Result<()> {
        let position = self.conn.read_position().await?;
        let created = self.conn.read_u8().await?;
        let holding = self.conn.read_u8().await?;
        upcall!(self, change_block(position, created != 0, holding))
    }

    async fn handle_location_change(&mut self) -> Result<()> {
        let holding = self.conn.read_u8().await?;
        let location = self.conn.read_location().await?;
        if self.conn.supports(&Extension::HELD_BLOCK) && self.last_held != Some(holding) {
            self.last_held = Some(holding);
            upcall!(self, change_held(holding))?;
        }
        // last_location is only written by outbound teleports of entity 255;
        // the comparison swallows the echo of a server-initiated teleport.
        if self.last_location != Some(location) {
            upcall!(self, change_location(location))?;
        }
        Ok(())
    }

    async fn handle_message(&mut self) -> Result<()> {
        let partial = self.conn.read_u8().await?;
        let field = self.conn.read_string_raw().await?;
        self.partial_message.extend_from_slice(&field);
        if partial != 0 {
            return Ok(());
        }
        let raw = std::mem::take(&mut self.partial_message);
        let message = text::decode_bytes(&raw, self.conn.text_encoding())?;
        upcall!(self, submit_message(&message))
    }

    async fn handle_click(&mut self) -> Result<()> {
        let click = Click {
            button: self.conn.read_u8().await?,
            action: self.conn.read_u8().await?,
            yaw: self.conn.read_u16().await?,
            pitch: self.conn.read_u16().await?,
            target_entity: self.conn.read_u8().await?,
            target: self.conn.read_position().await?,
            face: self.conn.read_u8().await?,
        };
        upcall!(self, click(click))
    }

    /// Best-effort disconnect frame on the error path; failures are moot
    /// because the session is closing anyway.
    async fn send_kick_frame(&mut self, reason: &str) {
        let reason: String = reason.chars().take(text::STRING_BYTES).collect();
        let mut buf = self.conn.frame(Opcode::Disconnect);
        if self.conn.put_string(&mut buf, &reason).is_ok() {
            let _ = self.conn.send(buf).await;
        }
    }
}

#[async_trait::async_trait]
impl<R, W> ClientConnection for ClientSession<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn supports(&self, extension: &Extension) -> bool {
        self.conn.supports(extension)
    }

    fn is_alive(&self) -> bool {
        self.conn.is_alive()
    }

    fn close(&mut self) {
        self.conn.close();
    }

    async fn world_info(&mut self, name: &str, motd: &str, operator: bool) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::Hello);
        buf.put_u8(PROTOCOL_VERSION);
        self.conn.put_string(&mut buf, name)?;
        self.conn.put_string(&mut buf, motd)?;
        buf.put_u8(if operator { OPERATOR_BYTE } else { 0 });
        self.conn.send(buf).await
    }

    async fn send_level(&mut self, spawn: Position, data: &[u8]) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        self.conn.send(self.conn.frame(Opcode::StartLevel)).await?;

        let compressed = level::compress_level(data)?;
        for chunk in compressed.chunks(LEVEL_CHUNK_BYTES) {
            let mut buf = self.conn.frame(Opcode::LevelChunk);
            buf.put_i16(chunk.len() as i16);
            buf.put_slice(chunk);
            buf.put_bytes(0, LEVEL_CHUNK_BYTES - chunk.len());
            buf.put_u8(0);
            self.conn.send(buf).await?;
        }

        let mut buf = self.conn.frame(Opcode::FinishLevel);
        spawn.encode(&mut buf);
        self.conn.send(buf).await?;
        tracing::debug!(blocks = data.len(), wire = compressed.len(), "level sent");
        Ok(())
    }

    async fn set_block(&mut self, position: Position, block: u8) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::SetBlock);
        position.encode(&mut buf);
        buf.put_u8(block);
        self.conn.send(buf).await
    }

    async fn send_message(&mut self, message: &str) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        self.conn.send_chat(message).await
    }

    async fn set_message(&mut self, message_type: u8, message: &str) -> Result<()> {
        if !self.conn.is_alive() || !self.conn.supports(&Extension::MESSAGE_TYPES) {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::Message);
        buf.put_u8(message_type);
        self.conn.put_string(&mut buf, message)?;
        self.conn.send(buf).await
    }

    async fn ping(&mut self) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        self.conn.send(self.conn.frame(Opcode::Heartbeat)).await
    }

    async fn add_entity(
        &mut self,
        entity: u8,
        name: &str,
        location: Location,
        skin: Option<&str>,
    ) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        let extended = self.conn.supports(&Extension::EXT_PLAYER_LIST);
        let opcode = if extended { Opcode::AddEntityExt } else { Opcode::AddEntity };
        let mut buf = self.conn.frame(opcode);
        buf.put_u8(entity);
        self.conn.put_string(&mut buf, name)?;
        if extended {
            self.conn.put_string(&mut buf, skin.unwrap_or(name))?;
        }
        self.conn.put_location(&mut buf, location);
        self.conn.send(buf).await
    }

    async fn move_entity(&mut self, entity: u8, location: Location) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::AbsoluteLocation);
        buf.put_u8(entity);
        self.conn.put_location(&mut buf, location);
        self.conn.send(buf).await?;
        if entity == 255 {
            self.last_location = Some(location);
        }
        Ok(())
    }

    async fn remove_entity(&mut self, entity: u8) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::RemoveEntity);
        buf.put_u8(entity);
        self.conn.send(buf).await
    }

    async fn kick(&mut self, reason: &str) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::Disconnect);
        self.conn.put_string(&mut buf, reason)?;
        self.conn.send(buf).await?;
        self.conn.close();
        Ok(())
    }

    async fn add_player(
        &mut self,
        player: i16,
        name: &str,
        display_name: Option<&str>,
        group: &str,
        rank: Option<u8>,
    ) -> Result<()> {
        if !self.conn.is_alive() || !self.conn.supports(&Extension::EXT_PLAYER_LIST) {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::AddPlayer);
        buf.put_i16(player);
        self.conn.put_string(&mut buf, name)?;
        self.conn.put_string(&mut buf, display_name.unwrap_or(name))?;
        self.conn.put_string(&mut buf, group)?;
        buf.put_u8(rank.unwrap_or(player as u8));
        self.conn.send(buf).await
    }

    async fn remove_player(&mut self, player: i16) -> Result<()> {
        if !self.conn.is_alive() || !self.conn.supports(&Extension::EXT_PLAYER_LIST) {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::RemovePlayer);
        buf.put_i16(player);
        self.conn.send(buf).await
    }

    async fn hold_this(&mut self, block: u8, force: bool) -> Result<()> {
        if !self.conn.is_alive() || !self.conn.supports(&Extension::HELD_BLOCK) {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::HoldThis);
        buf.put_u8(block);
        buf.put_u8(u8::from(force));
        self.conn.send(buf).await
    }

    async fn set_color_code(&mut self, code: u8, r: u8, g: u8, b: u8, a: u8) -> Result<()> {
        if !self.conn.is_alive() || !self.conn.supports(&Extension::TEXT_COLORS) {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::SetTextColor);
        buf.put_u8(r);
        buf.put_u8(g);
        buf.put_u8(b);
        buf.put_u8(a);
        buf.put_u8(code);
        self.conn.send(buf).await
    }

    async fn set_block_permission(
        &mut self,
        block: u8,
        allow_place: bool,
        allow_break: bool,
    ) -> Result<()> {
        if !self.conn.is_alive() || !self.conn.supports(&Extension::BLOCK_PERMISSIONS) {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::SetBlockPermission);
        buf.put_u8(block);
        buf.put_u8(u8::from(allow_place));
        buf.put_u8(u8::from(allow_break));
        self.conn.send(buf).await
    }
}
