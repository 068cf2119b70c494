//! The client endpoint: a session connected to a remote world server.

use classic_core::{
    ClientHandlerFactory, Connection, ExtNegotiation, ServerConnection, SessionInfo, level,
};
use classic_proto::{
    CPE_MAGIC, Extension, LEVEL_CHUNK_BYTES, Location, LocationDelta, Opcode, PROTOCOL_VERSION,
    Position, ProtocolError, Result, text,
};
use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncWrite};

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
                "data frame before server identification: ",
                stringify!($method)
            )
            .to_string())),
        }
    }};
}

/// Our end of a connection to a remote world server.
///
/// Construct one with [`crate::connect`] (or [`Self::new`] over any stream),
/// send the login hello, then drive [`Self::run`] until the session closes.
/// Inbound frames surface on the [`classic_core::ClientHandler`] produced by
/// the factory; outbound operations are the [`ServerConnection`] impl.
pub struct ServerSession<R, W> {
    conn: Connection<R, W>,
    factory: Option<ClientHandlerFactory>,
    handler: Option<Box<dyn classic_core::ClientHandler>>,

    server_name: Option<String>,
    motd: Option<String>,
    operator: bool,
    holding: u8,

    receiving_level: bool,
    level_buffer: Vec<u8>,
    last_location: Option<Location>,
    partial_message: Vec<u8>,
    last_heartbeat: Option<std::time::Instant>,
}

impl<R, W> ServerSession<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Extensions this endpoint announces.
    fn advertised() -> Vec<Extension> {
        vec![
            Extension::ENTITY_POSITIONS,
            Extension::MESSAGE_TYPES,
            Extension::HELD_BLOCK,
            Extension::LONGER_MESSAGES,
            Extension::EXT_PLAYER_LIST,
            Extension::FULL_CP437,
        ]
    }

    /// Build a session over an arbitrary reader/writer pair.
    pub fn new(reader: R, writer: W, factory: ClientHandlerFactory) -> Self {
        let agent = format!("classic-client/{}", env!("CARGO_PKG_VERSION"));
        Self {
            conn: Connection::new(reader, writer, agent, Self::advertised()),
            factory: Some(factory),
            handler: None,
            server_name: None,
            motd: None,
            operator: false,
            holding: 0,
            receiving_level: false,
            level_buffer: Vec::new(),
            last_location: None,
            partial_message: Vec::new(),
            last_heartbeat: None,
        }
    }

    /// The underlying connection (negotiation state, diagnostics).
    pub fn connection(&self) -> &Connection<R, W> {
        &self.conn
    }

    /// Server name from the identification frame, once received.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Server MOTD from the identification frame, once received.
    pub fn motd(&self) -> Option<&str> {
        self.motd.as_deref()
    }

    /// Whether the server granted us operator status.
    pub fn operator(&self) -> bool {
        self.operator
    }

    /// When the last keepalive ping arrived.
    pub fn last_heartbeat(&self) -> Option<std::time::Instant> {
        self.last_heartbeat
    }

    /// Send the login hello: version 7, username, mp-pass, CPE magic.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::Hello);
        buf.put_u8(PROTOCOL_VERSION);
        self.conn.put_string(&mut buf, username)?;
        self.conn.put_string(&mut buf, password)?;
        buf.put_u8(CPE_MAGIC);
        self.conn.send(buf).await
    }

    /// Drive the frame loop until the session closes.
    ///
    /// EOF and connection reset end the loop silently (`Ok`); protocol errors
    /// close the session and are returned. Either way the handler's
    /// `disconnect` upcall is delivered exactly once.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.frame_loop().await;
        self.conn.close();
        if let Some(mut handler) = self.handler.take() {
            handler.disconnect().await;
        }
        match result {
            Err(ProtocolError::ConnectionClosed) => {
                tracing::debug!("server stream closed");
                Ok(())
            },
            Err(err) => {
                tracing::warn!(%err, "session closed on protocol error");
                Err(err)
            },
            Ok(()) => Ok(()),
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
            Some(Opcode::Heartbeat) => {
                self.last_heartbeat = Some(std::time::Instant::now());
                Ok(())
            },
            Some(Opcode::StartLevel) => {
                self.receiving_level = true;
                self.level_buffer.clear();
                Ok(())
            },
            Some(Opcode::LevelChunk) => self.handle_level_chunk().await,
            Some(Opcode::FinishLevel) => self.handle_finish_level().await,
            Some(Opcode::SetBlock) => self.handle_set_block().await,
            Some(Opcode::AddEntity) => self.handle_add_entity().await,
            Some(Opcode::AddEntityExt) => self.handle_add_entity_ext().await,
            Some(Opcode::AbsoluteLocation) => self.handle_move_entity().await,
            Some(Opcode::RelativeLocation) => self.handle_relative_location().await,
            Some(Opcode::RelativePosition) => self.handle_relative_position().await,
            Some(Opcode::RelativeOrientation) => self.handle_relative_orientation().await,
            Some(Opcode::RemoveEntity) => {
                let entity = self.conn.read_u8().await?;
                upcall!(self, remove_entity(entity))
            },
            Some(Opcode::Message) => self.handle_message().await,
            Some(Opcode::Disconnect) => self.handle_kick().await,
            Some(Opcode::AdminStatus) => {
                let status = self.conn.read_u8().await?;
                self.operator = status != 0;
                Ok(())
            },
            Some(Opcode::ExtInfo) => self.conn.handle_ext_info().await,
            Some(Opcode::ExtEntry) => {
                if self.conn.handle_ext_entry().await? == ExtNegotiation::Complete {
                    self.received_extensions().await?;
                }
                Ok(())
            },
            Some(Opcode::HoldThis) => {
                let block = self.conn.read_u8().await?;
                let force = self.conn.read_u8().await?;
                upcall!(self, hold_this(block, force != 0))
            },
            Some(Opcode::AddPlayer) => self.handle_add_player().await,
            Some(Opcode::RemovePlayer) => {
                let player = self.conn.read_i16().await?;
                upcall!(self, remove_player(player))
            },
            Some(Opcode::SetBlockPermission) => {
                let block = self.conn.read_u8().await?;
                let place = self.conn.read_u8().await?;
                let brk = self.conn.read_u8().await?;
                upcall!(self, set_block_permission(block, place != 0, brk != 0))
            },
            Some(Opcode::SetTextColor) => {
                let r = self.conn.read_u8().await?;
                let g = self.conn.read_u8().await?;
                let b = self.conn.read_u8().await?;
                let a = self.conn.read_u8().await?;
                let code = self.conn.read_u8().await?;
                upcall!(self, set_color_code(code, r, g, b, a))
            },
            Some(other) => Err(ProtocolError::ProtocolViolation(format!(
                "client-bound stream carried {other:?}"
            ))),
            None => Err(ProtocolError::ProtocolViolation(format!("unknown opcode {opcode:#04x}"))),
        }
    }

    /// On completion of the server's ext-entry run: reconfigure the codec and
    /// answer with our own announcement.
    async fn received_extensions(&mut self) -> Result<()> {
        self.conn.apply_negotiated();
        self.conn.write_extensions().await
    }

    async fn handle_hello(&mut self) -> Result<()> {
        let version = self.conn.read_u8().await?;
        let name = self.conn.read_string().await?;
        let motd = self.conn.read_string().await?;
        let operator = self.conn.read_u8().await?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch(version));
        }

        self.server_name = Some(name.clone());
        self.motd = Some(motd.clone());
        self.operator = operator != 0;

        if let Some(factory) = self.factory.take() {
            let info = SessionInfo {
                username: None,
                vendor: self.conn.vendor().to_string(),
                extensions: self.conn.extensions().clone(),
            };
            self.handler = Some(factory(&info));
            tracing::debug!(server = %name, "handler installed");
        }
        upcall!(self, world_info(&name, &motd, operator != 0))
    }

    async fn handle_level_chunk(&mut self) -> Result<()> {
        let size = self.conn.read_i16().await?;
        let chunk = self.conn.read_bytes(LEVEL_CHUNK_BYTES).await?;
        let _percent = self.conn.read_u8().await?;
        if self.receiving_level {
            let valid = (size.max(0) as usize).min(LEVEL_CHUNK_BYTES);
            self.level_buffer.extend_from_slice(&chunk[..valid]);
        }
        Ok(())
    }

    async fn handle_finish_level(&mut self) -> Result<()> {
        let spawn = self.conn.read_position().await?;
        if !self.receiving_level {
            return Ok(());
        }
        let data = level::decompress_level(&self.level_buffer)?;
        self.receiving_level = false;
        self.level_buffer = Vec::new();
        tracing::debug!(blocks = data.len(), "level received");
        upcall!(self, send_level(spawn, data))
    }

    async fn handle_set_block(&mut self) -> Result<()> {
        let position = self.conn.read_position().await?;
        let block = self.conn.read_u8().await?;
        upcall!(self, set_block(position, block))
    }

    async fn handle_add_entity(&mut self) -> Result<()> {
        let entity = self.conn.read_u8().await?;
        let name = self.conn.read_string().await?;
        let location = self.conn.read_location().await?;
        upcall!(self, add_entity(entity, &name, &name, location))
    }

    async fn handle_add_entity_ext(&mut self) -> Result<()> {
        let entity = self.conn.read_u8().await?;
        let name = self.conn.read_string().await?;
        let skin = self.conn.read_string().await?;
        let location = self.conn.read_location().await?;
        upcall!(self, add_entity(entity, &name, &skin, location))
    }

    async fn handle_move_entity(&mut self) -> Result<()> {
        let entity = self.conn.read_u8().await?;
        let location = self.conn.read_location().await?;
        upcall!(self, move_entity(entity, location))
    }

    async fn handle_relative_location(&mut self) -> Result<()> {
        let entity = self.conn.read_u8().await?;
        let delta = LocationDelta {
            dx: self.conn.read_i8().await?,
            dy: self.conn.read_i8().await?,
            dz: self.conn.read_i8().await?,
            yaw: self.conn.read_u8().await?,
            pitch: self.conn.read_u8().await?,
        };
        upcall!(self, shift_entity(entity, delta))
    }

    async fn handle_relative_position(&mut self) -> Result<()> {
        let entity = self.conn.read_u8().await?;
        let delta = LocationDelta {
            dx: self.conn.read_i8().await?,
            dy: self.conn.read_i8().await?,
            dz: self.conn.read_i8().await?,
            ..LocationDelta::default()
        };
        upcall!(self, shift_entity(entity, delta))
    }

    async fn handle_relative_orientation(&mut self) -> Result<()> {
        let entity = self.conn.read_u8().await?;
        let delta = LocationDelta {
            yaw: self.conn.read_u8().await?,
            pitch: self.conn.read_u8().await?,
            ..LocationDelta::default()
        };
        upcall!(self, shift_entity(entity, delta))
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
        upcall!(self, send_message(&message))
    }

    async fn handle_kick(&mut self) -> Result<()> {
        let reason = self.conn.read_string().await?;
        tracing::info!(%reason, "kicked by server");
        let result = match self.handler.as_mut() {
            Some(handler) => handler.kick(&reason).await,
            None => Ok(()),
        };
        self.conn.close();
        result
    }

    async fn handle_add_player(&mut self) -> Result<()> {
        let player = self.conn.read_i16().await?;
        let name = self.conn.read_string().await?;
        let display_name = self.conn.read_string().await?;
        let group = self.conn.read_string().await?;
        let rank = self.conn.read_u8().await?;
        let group = if group.is_empty() { None } else { Some(group) };
        upcall!(self, add_player(player, &name, &display_name, group.as_deref(), rank))
    }
}

#[async_trait::async_trait]
impl<R, W> ServerConnection for ServerSession<R, W>
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

    async fn change_block(&mut self, position: Position, placed: bool, holding: u8) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::ChangeBlock);
        position.encode(&mut buf);
        buf.put_u8(u8::from(placed));
        buf.put_u8(holding);
        self.conn.send(buf).await
    }

    async fn set_block(&mut self, position: Position, block: u8) -> Result<()> {
        self.holding = block;
        self.change_block(position, block != 0, block).await
    }

    async fn break_block(&mut self, position: Position, holding: Option<u8>) -> Result<()> {
        if let Some(block) = holding {
            self.holding = block;
        }
        let holding = self.holding;
        self.change_block(position, false, holding).await
    }

    async fn change_location(&mut self, location: Location) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        let mut buf = self.conn.frame(Opcode::AbsoluteLocation);
        buf.put_u8(self.holding);
        self.conn.put_location(&mut buf, location);
        self.conn.send(buf).await?;
        self.last_location = Some(location);
        Ok(())
    }

    async fn change_held(&mut self, block: u8) -> Result<()> {
        self.holding = block;
        if self.conn.supports(&Extension::HELD_BLOCK) {
            if let Some(location) = self.last_location {
                return self.change_location(location).await;
            }
        }
        Ok(())
    }

    async fn submit_message(&mut self, message: &str) -> Result<()> {
        if !self.conn.is_alive() {
            return Ok(());
        }
        self.conn.send_chat(message).await
    }
}
