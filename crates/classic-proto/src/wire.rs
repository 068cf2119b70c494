//! Spatial wire types.
//!
//! Two coordinate spaces exist on the wire. Block-space positions address
//! whole blocks and are always three unsigned 16-bit axes. Fractional-space
//! locations address 1/32-block units with yaw and pitch appended; their axis
//! width starts at 16 bits and widens to 32 once `ExtEntityPositions`
//! negotiates. All scalars are big-endian.

use bytes::{Buf, BufMut};

/// Block-space position (1 unit per block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// East axis, in blocks.
    pub x: u16,
    /// Height axis, in blocks.
    pub y: u16,
    /// South axis, in blocks.
    pub z: u16,
}

impl Position {
    /// Wire size in bytes; unaffected by CPE.
    pub const WIRE_SIZE: usize = 6;

    /// New block-space position.
    pub fn new(x: u16, y: u16, z: u16) -> Self {
        Self { x, y, z }
    }

    /// Append the wire form to `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.x);
        buf.put_u16(self.y);
        buf.put_u16(self.z);
    }

    /// Read the wire form from `buf`, which must hold at least
    /// [`Self::WIRE_SIZE`] bytes.
    pub fn decode(buf: &mut impl Buf) -> Self {
        Self { x: buf.get_u16(), y: buf.get_u16(), z: buf.get_u16() }
    }
}

/// Axis width for fractional-space locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocationWidth {
    /// Signed 16-bit axes (8-byte location). The protocol default.
    #[default]
    Short,
    /// Signed 32-bit axes (14-byte location), after `ExtEntityPositions`.
    Int,
}

impl LocationWidth {
    /// Wire size of a full location at this width.
    pub fn wire_size(self) -> usize {
        match self {
            Self::Short => 8,
            Self::Int => 14,
        }
    }
}

/// Fractional-space location: 1/32-block units, plus yaw and pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// East axis, in 1/32 blocks.
    pub x: i32,
    /// Height axis, in 1/32 blocks.
    pub y: i32,
    /// South axis, in 1/32 blocks.
    pub z: i32,
    /// Heading, in 1/256 turns.
    pub yaw: u8,
    /// Tilt, in 1/256 turns.
    pub pitch: u8,
}

impl Location {
    /// New fractional-space location.
    pub fn new(x: i32, y: i32, z: i32, yaw: u8, pitch: u8) -> Self {
        Self { x, y, z, yaw, pitch }
    }

    /// Append the wire form at the given axis width. At [`LocationWidth::Short`]
    /// the axes are truncated to 16 bits.
    pub fn encode(&self, buf: &mut impl BufMut, width: LocationWidth) {
        match width {
            LocationWidth::Short => {
                buf.put_i16(self.x as i16);
                buf.put_i16(self.y as i16);
                buf.put_i16(self.z as i16);
            },
            LocationWidth::Int => {
                buf.put_i32(self.x);
                buf.put_i32(self.y);
                buf.put_i32(self.z);
            },
        }
        buf.put_u8(self.yaw);
        buf.put_u8(self.pitch);
    }

    /// Read the wire form at the given axis width from `buf`, which must hold
    /// at least `width.wire_size()` bytes.
    pub fn decode(buf: &mut impl Buf, width: LocationWidth) -> Self {
        let (x, y, z) = match width {
            LocationWidth::Short => {
                (i32::from(buf.get_i16()), i32::from(buf.get_i16()), i32::from(buf.get_i16()))
            },
            LocationWidth::Int => (buf.get_i32(), buf.get_i32(), buf.get_i32()),
        };
        Self { x, y, z, yaw: buf.get_u8(), pitch: buf.get_u8() }
    }
}

/// Relative movement report carried by the relative-location, -position, and
/// -orientation frames. Axes the frame does not carry stay zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocationDelta {
    /// East delta, in 1/32 blocks.
    pub dx: i8,
    /// Height delta, in 1/32 blocks.
    pub dy: i8,
    /// South delta, in 1/32 blocks.
    pub dz: i8,
    /// Heading byte as carried by the frame, in 1/256 turns.
    pub yaw: u8,
    /// Tilt byte as carried by the frame, in 1/256 turns.
    pub pitch: u8,
}
