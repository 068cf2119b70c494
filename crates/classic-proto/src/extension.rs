//! CPE extension descriptors.
//!
//! During the handshake each endpoint announces a list of (name, version)
//! pairs. Two of them change how the primitive codec reads the rest of the
//! stream (`FullCP437`, `ExtEntityPositions`); the others gate optional
//! frames.

use std::{borrow::Cow, fmt};

/// A Classic Protocol Extension descriptor. Equality is on the full
/// (name, version) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Extension {
    /// Extension name as it appears on the wire.
    pub name: Cow<'static, str>,
    /// Extension version.
    pub version: u32,
}

impl Extension {
    /// Extended player list with group/rank metadata.
    pub const EXT_PLAYER_LIST: Self = Self::well_known("ExtPlayerList", 2);
    /// 32-bit location axes instead of 16-bit.
    pub const ENTITY_POSITIONS: Self = Self::well_known("ExtEntityPositions", 1);
    /// Held-block reporting in movement frames.
    pub const HELD_BLOCK: Self = Self::well_known("HeldBlock", 1);
    /// CP437 text instead of plain ASCII.
    pub const FULL_CP437: Self = Self::well_known("FullCP437", 1);
    /// Typed chat messages (status bars, announcements).
    pub const MESSAGE_TYPES: Self = Self::well_known("MessageTypes", 1);
    /// Multi-fragment chat with a continuation flag.
    pub const LONGER_MESSAGES: Self = Self::well_known("LongerMessages", 1);
    /// Custom chat color codes.
    pub const TEXT_COLORS: Self = Self::well_known("TextColors", 1);
    /// Per-block place/break permissions.
    pub const BLOCK_PERMISSIONS: Self = Self::well_known("BlockPermissions", 1);
    /// Raw click reports from the client.
    pub const PLAYER_CLICK: Self = Self::well_known("PlayerClick", 1);

    const fn well_known(name: &'static str, version: u32) -> Self {
        Self { name: Cow::Borrowed(name), version }
    }

    /// Descriptor for an arbitrary peer-announced extension.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self { name: Cow::Owned(name.into()), version }
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}
