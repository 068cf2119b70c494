//! Application-facing traits: outbound connections and event handlers.
//!
//! Four traits, two per direction. The outbound pair ([`ClientConnection`],
//! [`ServerConnection`]) is implemented by the session roles and exposes what
//! an endpoint may transmit. The handler pair ([`ServerHandler`],
//! [`ClientHandler`]) is implemented by applications and receives decoded
//! inbound events; every upcall hands back the outbound connection so the
//! application can answer an event in place.
//!
//! Handlers are installed through a factory, invoked exactly once per session
//! when the handshake reaches steady state. A session delivers exactly one
//! `disconnect` upcall when it closes, and outbound calls on a closed session
//! are silent no-ops, so applications can race broadcasts against closure
//! without guarding.

use std::collections::HashSet;

use async_trait::async_trait;
use classic_proto::{Extension, Location, LocationDelta, Position, Result};

/// Handshake-time snapshot handed to a handler factory.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Authenticated username (server side; `None` on the client).
    pub username: Option<String>,
    /// The peer's announced agent string, or a sentinel.
    pub vendor: String,
    /// The peer's announced extension set.
    pub extensions: HashSet<Extension>,
}

/// A decoded `PlayerClick` report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Click {
    /// Mouse button (0 left, 1 right, 2 middle).
    pub button: u8,
    /// 0 on press, 1 on release.
    pub action: u8,
    /// Heading at click time, in 1/65536 turns.
    pub yaw: u16,
    /// Tilt at click time, in 1/65536 turns.
    pub pitch: u16,
    /// Targeted entity id, or 255 for none.
    pub target_entity: u8,
    /// Targeted block.
    pub target: Position,
    /// Targeted block face (0-5, or 255 for none).
    pub face: u8,
}

/// Outbound operations toward a connected client, implemented by the server
/// role's `ClientSession`.
///
/// Extension-gated operations transmit nothing when the gating extension is
/// not negotiated; [`Self::supports`] lets callers observe the gate.
#[async_trait]
pub trait ClientConnection: Send {
    /// Whether the peer negotiated the given extension.
    fn supports(&self, extension: &Extension) -> bool;

    /// Whether the session is still live.
    fn is_alive(&self) -> bool;

    /// Mark the session for closure; the frame loop exits at its next
    /// iteration and delivers the disconnect upcall.
    fn close(&mut self);

    /// Send the server identification: name, MOTD, operator flag.
    async fn world_info(&mut self, name: &str, motd: &str, operator: bool) -> Result<()>;

    /// Transmit a level: start-level, compressed chunk frames, finish-level
    /// with the spawn position.
    async fn send_level(&mut self, spawn: Position, data: &[u8]) -> Result<()>;

    /// Authoritative block update.
    async fn set_block(&mut self, position: Position, block: u8) -> Result<()>;

    /// Plain chat, fragmented into 64-byte fields as needed.
    async fn send_message(&mut self, message: &str) -> Result<()>;

    /// Typed chat (status bars, announcements). Gated on `MessageTypes`.
    async fn set_message(&mut self, message_type: u8, message: &str) -> Result<()>;

    /// Keepalive ping.
    async fn ping(&mut self) -> Result<()>;

    /// Spawn an entity. Uses the extended frame with the skin string when
    /// `ExtPlayerList` is negotiated.
    async fn add_entity(
        &mut self,
        entity: u8,
        name: &str,
        location: Location,
        skin: Option<&str>,
    ) -> Result<()>;

    /// Teleport an entity. Entity 255 is the local player; its location is
    /// cached as the session's last location.
    async fn move_entity(&mut self, entity: u8, location: Location) -> Result<()>;

    /// Despawn an entity.
    async fn remove_entity(&mut self, entity: u8) -> Result<()>;

    /// Disconnect the client with a reason, then close the session.
    async fn kick(&mut self, reason: &str) -> Result<()>;

    /// Player list entry. Gated on `ExtPlayerList`.
    async fn add_player(
        &mut self,
        player: i16,
        name: &str,
        display_name: Option<&str>,
        group: &str,
        rank: Option<u8>,
    ) -> Result<()>;

    /// Player list removal. Gated on `ExtPlayerList`.
    async fn remove_player(&mut self, player: i16) -> Result<()>;

    /// Force the client's held block. Gated on `HeldBlock`.
    async fn hold_this(&mut self, block: u8, force: bool) -> Result<()>;

    /// Define a custom chat color code. Gated on `TextColors`.
    async fn set_color_code(&mut self, code: u8, r: u8, g: u8, b: u8, a: u8) -> Result<()>;

    /// Per-block place/break permission. Gated on `BlockPermissions`.
    async fn set_block_permission(
        &mut self,
        block: u8,
        allow_place: bool,
        allow_break: bool,
    ) -> Result<()>;
}

/// Outbound operations toward a remote server, implemented by the client
/// role's `ServerSession`.
#[async_trait]
pub trait ServerConnection: Send {
    /// Whether the peer negotiated the given extension.
    fn supports(&self, extension: &Extension) -> bool;

    /// Whether the session is still live.
    fn is_alive(&self) -> bool;

    /// Mark the session for closure.
    fn close(&mut self);

    /// Report a block change: placement or breakage with the held block.
    async fn change_block(&mut self, position: Position, placed: bool, holding: u8) -> Result<()>;

    /// Place `block` at `position`, tracking it as held.
    async fn set_block(&mut self, position: Position, block: u8) -> Result<()>;

    /// Break the block at `position`, optionally updating the held block.
    async fn break_block(&mut self, position: Position, holding: Option<u8>) -> Result<()>;

    /// Report the player's absolute location (entity slot 255), with the
    /// currently held block.
    async fn change_location(&mut self, location: Location) -> Result<()>;

    /// Switch the held block, re-reporting the last location when `HeldBlock`
    /// is negotiated.
    async fn change_held(&mut self, block: u8) -> Result<()>;

    /// Send chat, fragmented into 64-byte fields as needed.
    async fn submit_message(&mut self, message: &str) -> Result<()>;
}

/// Server-side application handler: decoded events from one client.
///
/// All methods default to no-ops; implement the ones the application cares
/// about. `ready` fires once when the handshake reaches steady state and is
/// the place to send world info and the level.
#[async_trait]
pub trait ServerHandler: Send {
    /// The handshake (including any CPE negotiation) completed.
    async fn ready(&mut self, _conn: &mut dyn ClientConnection) -> Result<()> {
        Ok(())
    }

    /// The client placed or broke a block.
    async fn change_block(
        &mut self,
        _conn: &mut dyn ClientConnection,
        _position: Position,
        _placed: bool,
        _holding: u8,
    ) -> Result<()> {
        Ok(())
    }

    /// The client moved.
    async fn change_location(
        &mut self,
        _conn: &mut dyn ClientConnection,
        _location: Location,
    ) -> Result<()> {
        Ok(())
    }

    /// The client switched its held block (`HeldBlock` only).
    async fn change_held(&mut self, _conn: &mut dyn ClientConnection, _block: u8) -> Result<()> {
        Ok(())
    }

    /// The client sent a chat message (fully reassembled).
    async fn submit_message(
        &mut self,
        _conn: &mut dyn ClientConnection,
        _message: &str,
    ) -> Result<()> {
        Ok(())
    }

    /// The client reported a raw click (`PlayerClick` only).
    async fn click(&mut self, _conn: &mut dyn ClientConnection, _click: Click) -> Result<()> {
        Ok(())
    }

    /// The session closed. Delivered exactly once; no further upcalls follow.
    async fn disconnect(&mut self) {}
}

/// Client-side application handler: decoded events from the server.
///
/// All methods default to no-ops.
#[async_trait]
pub trait ClientHandler: Send {
    /// Server identification arrived; the session is at steady state.
    async fn world_info(
        &mut self,
        _conn: &mut dyn ServerConnection,
        _name: &str,
        _motd: &str,
        _operator: bool,
    ) -> Result<()> {
        Ok(())
    }

    /// A level finished transferring.
    async fn send_level(
        &mut self,
        _conn: &mut dyn ServerConnection,
        _spawn: Position,
        _data: Vec<u8>,
    ) -> Result<()> {
        Ok(())
    }

    /// Authoritative block update.
    async fn set_block(
        &mut self,
        _conn: &mut dyn ServerConnection,
        _position: Position,
        _block: u8,
    ) -> Result<()> {
        Ok(())
    }

    /// Chat arrived (fully reassembled).
    async fn send_message(&mut self, _conn: &mut dyn ServerConnection, _message: &str) -> Result<()> {
        Ok(())
    }

    /// An entity spawned.
    async fn add_entity(
        &mut self,
        _conn: &mut dyn ServerConnection,
        _entity: u8,
        _name: &str,
        _skin: &str,
        _location: Location,
    ) -> Result<()> {
        Ok(())
    }

    /// An entity teleported.
    async fn move_entity(
        &mut self,
        _conn: &mut dyn ServerConnection,
        _entity: u8,
        _location: Location,
    ) -> Result<()> {
        Ok(())
    }

    /// An entity moved or turned relative to its last location.
    async fn shift_entity(
        &mut self,
        _conn: &mut dyn ServerConnection,
        _entity: u8,
        _delta: LocationDelta,
    ) -> Result<()> {
        Ok(())
    }

    /// An entity despawned.
    async fn remove_entity(&mut self, _conn: &mut dyn ServerConnection, _entity: u8) -> Result<()> {
        Ok(())
    }

    /// Player list entry (`ExtPlayerList` only).
    async fn add_player(
        &mut self,
        _conn: &mut dyn ServerConnection,
        _player: i16,
        _name: &str,
        _display_name: &str,
        _group: Option<&str>,
        _rank: u8,
    ) -> Result<()> {
        Ok(())
    }

    /// Player list removal (`ExtPlayerList` only).
    async fn remove_player(&mut self, _conn: &mut dyn ServerConnection, _player: i16) -> Result<()> {
        Ok(())
    }

    /// The server forced our held block (`HeldBlock` only).
    async fn hold_this(
        &mut self,
        _conn: &mut dyn ServerConnection,
        _block: u8,
        _force: bool,
    ) -> Result<()> {
        Ok(())
    }

    /// Custom chat color definition (`TextColors` only).
    async fn set_color_code(
        &mut self,
        _conn: &mut dyn ServerConnection,
        _code: u8,
        _r: u8,
        _g: u8,
        _b: u8,
        _a: u8,
    ) -> Result<()> {
        Ok(())
    }

    /// Per-block permission update (`BlockPermissions` only).
    async fn set_block_permission(
        &mut self,
        _conn: &mut dyn ServerConnection,
        _block: u8,
        _allow_place: bool,
        _allow_break: bool,
    ) -> Result<()> {
        Ok(())
    }

    /// The server disconnected us with a reason. `disconnect` follows.
    async fn kick(&mut self, _reason: &str) -> Result<()> {
        Ok(())
    }

    /// The session closed. Delivered exactly once; no further upcalls follow.
    async fn disconnect(&mut self) {}
}

/// Factory producing the server-side handler for one accepted client, invoked
/// once when that client's handshake reaches steady state.
pub type ServerHandlerFactory = Box<dyn FnOnce(&SessionInfo) -> Box<dyn ServerHandler> + Send>;

/// Factory producing the client-side handler, invoked once when the server's
/// identification arrives.
pub type ClientHandlerFactory = Box<dyn FnOnce(&SessionInfo) -> Box<dyn ClientHandler> + Send>;
