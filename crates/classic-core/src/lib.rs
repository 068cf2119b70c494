//! Shared session substrate for the Classic protocol endpoints.
//!
//! Both endpoints — [`classic-client`]'s `ServerSession` and
//! [`classic-server`]'s `ClientSession` — are thin role layers over the same
//! three pieces:
//!
//! - [`Connection`]: the primitive codec bound to an async reader/writer
//!   pair, plus the CPE negotiation state it mutates (text encoding, location
//!   axis width, the peer's extension set)
//! - [`level`]: the chunked, gzip-compressed level transfer sub-protocol
//! - the handler traits ([`ServerHandler`], [`ClientHandler`]) and outbound
//!   connection traits ([`ClientConnection`], [`ServerConnection`]) through
//!   which applications react to inbound events and issue outbound ones
//!
//! [`classic-client`]: https://docs.rs/classic-client
//! [`classic-server`]: https://docs.rs/classic-server

#![forbid(unsafe_code)]

mod connection;
mod handler;
pub mod level;

pub use connection::{Connection, ExtNegotiation, NO_VENDOR, UNKNOWN_VENDOR};
pub use handler::{
    Click, ClientConnection, ClientHandler, ClientHandlerFactory, ServerConnection, ServerHandler,
    ServerHandlerFactory, SessionInfo,
};
