//! Frame opcodes.
//!
//! Every frame on the wire is one opcode byte followed by a payload whose
//! shape is fixed per opcode (with two exceptions that are renegotiated by
//! CPE: string encoding and location axis width). There is no length prefix,
//! so an unknown opcode is unrecoverable — the payload length cannot be
//! guessed and the session must close.

/// One-byte frame identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Client login / server identification.
    Hello = 0x00,
    /// Keepalive ping (server to client).
    Heartbeat = 0x01,
    /// Level transfer begins; no payload.
    StartLevel = 0x02,
    /// One 1024-byte slice of the compressed level payload.
    LevelChunk = 0x03,
    /// Level transfer complete; carries the spawn position.
    FinishLevel = 0x04,
    /// Client placed or broke a block.
    ChangeBlock = 0x05,
    /// Authoritative block update (server to client).
    SetBlock = 0x06,
    /// Entity spawn.
    AddEntity = 0x07,
    /// Absolute entity location; entity 255 is the local player.
    AbsoluteLocation = 0x08,
    /// Relative movement plus orientation deltas.
    RelativeLocation = 0x09,
    /// Relative movement deltas only.
    RelativePosition = 0x0A,
    /// Orientation deltas only.
    RelativeOrientation = 0x0B,
    /// Entity despawn.
    RemoveEntity = 0x0C,
    /// Chat message fragment.
    Message = 0x0D,
    /// Disconnect with a textual reason.
    Disconnect = 0x0E,
    /// Operator status update (server to client).
    AdminStatus = 0x0F,
    /// CPE: vendor string plus the count of ext-entry frames to follow.
    ExtInfo = 0x10,
    /// CPE: one advertised extension (name, version).
    ExtEntry = 0x11,
    /// CPE `HeldBlock`: force the client's held block.
    HoldThis = 0x14,
    /// CPE `ExtPlayerList`: player list entry added.
    AddPlayer = 0x16,
    /// CPE `ExtPlayerList`: player list entry removed.
    RemovePlayer = 0x18,
    /// CPE `BlockPermissions`: per-block place/break permission.
    SetBlockPermission = 0x1C,
    /// CPE `ExtPlayerList`: entity spawn with a skin string.
    AddEntityExt = 0x21,
    /// CPE `PlayerClick`: raw click report (client to server).
    PlayerClick = 0x22,
    /// CPE `TextColors`: custom color code definition.
    SetTextColor = 0x27,
}

impl Opcode {
    /// Look up an opcode by its wire byte. `None` for unassigned values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Hello),
            0x01 => Some(Self::Heartbeat),
            0x02 => Some(Self::StartLevel),
            0x03 => Some(Self::LevelChunk),
            0x04 => Some(Self::FinishLevel),
            0x05 => Some(Self::ChangeBlock),
            0x06 => Some(Self::SetBlock),
            0x07 => Some(Self::AddEntity),
            0x08 => Some(Self::AbsoluteLocation),
            0x09 => Some(Self::RelativeLocation),
            0x0A => Some(Self::RelativePosition),
            0x0B => Some(Self::RelativeOrientation),
            0x0C => Some(Self::RemoveEntity),
            0x0D => Some(Self::Message),
            0x0E => Some(Self::Disconnect),
            0x0F => Some(Self::AdminStatus),
            0x10 => Some(Self::ExtInfo),
            0x11 => Some(Self::ExtEntry),
            0x14 => Some(Self::HoldThis),
            0x16 => Some(Self::AddPlayer),
            0x18 => Some(Self::RemovePlayer),
            0x1C => Some(Self::SetBlockPermission),
            0x21 => Some(Self::AddEntityExt),
            0x22 => Some(Self::PlayerClick),
            0x27 => Some(Self::SetTextColor),
            _ => None,
        }
    }

    /// Wire byte for this opcode.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[Opcode] = &[
        Opcode::Hello,
        Opcode::Heartbeat,
        Opcode::StartLevel,
        Opcode::LevelChunk,
        Opcode::FinishLevel,
        Opcode::ChangeBlock,
        Opcode::SetBlock,
        Opcode::AddEntity,
        Opcode::AbsoluteLocation,
        Opcode::RelativeLocation,
        Opcode::RelativePosition,
        Opcode::RelativeOrientation,
        Opcode::RemoveEntity,
        Opcode::Message,
        Opcode::Disconnect,
        Opcode::AdminStatus,
        Opcode::ExtInfo,
        Opcode::ExtEntry,
        Opcode::HoldThis,
        Opcode::AddPlayer,
        Opcode::RemovePlayer,
        Opcode::SetBlockPermission,
        Opcode::AddEntityExt,
        Opcode::PlayerClick,
        Opcode::SetTextColor,
    ];

    #[test]
    fn wire_byte_round_trip() {
        for &opcode in ALL {
            assert_eq!(Opcode::from_u8(opcode.to_u8()), Some(opcode));
        }
    }

    #[test]
    fn unassigned_bytes_are_unknown() {
        for value in [0x12u8, 0x13, 0x20, 0x50, 0xFF] {
            assert_eq!(Opcode::from_u8(value), None);
        }
    }
}
