//! Sans-IO wire primitives for the Minecraft Classic protocol (version 7).
//!
//! Everything in this crate is pure encode/decode logic with no I/O: the
//! session crates bind these primitives to an async byte stream.
//!
//! # Components
//!
//! - [`Opcode`]: the one-byte frame identifiers
//! - [`Extension`]: CPE extension descriptors and the well-known set
//! - [`text`]: the 64-byte space-padded string codec (ASCII / CP437)
//! - [`Position`] / [`Location`]: block-space and fractional-space
//!   coordinates, the latter with a CPE-renegotiable axis width
//! - [`ProtocolError`]: the error vocabulary shared by both endpoints

#![forbid(unsafe_code)]

mod errors;
mod extension;
mod opcode;
pub mod text;
mod wire;

pub use errors::{ProtocolError, Result};
pub use extension::Extension;
pub use opcode::Opcode;
pub use text::TextEncoding;
pub use wire::{Location, LocationDelta, LocationWidth, Position};

/// Protocol version spoken by both endpoints.
pub const PROTOCOL_VERSION: u8 = 7;

/// Hello trailing byte that advertises CPE support.
pub const CPE_MAGIC: u8 = 0x42;

/// Payload bytes carried by every level-chunk frame. Shorter chunks are
/// padded to this size; the frame's length field marks the valid prefix.
pub const LEVEL_CHUNK_BYTES: usize = 1024;
