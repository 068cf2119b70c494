//! The bulk level payload sub-protocol.
//!
//! A level travels between the start-level and finish-level frames as a
//! gzip-compressed blob of `u32 length || raw blocks`, sliced into 1024-byte
//! chunk frames. This module owns the compression leg; the chunk framing
//! lives with the session roles because it is direction-specific.

use std::io::Read;

use classic_proto::{ProtocolError, Result};
use flate2::{
    Compression,
    read::{GzDecoder, GzEncoder},
};

/// Compress a raw level for transmission: the 4-byte big-endian length
/// prefix, then gzip with the fast preset.
pub fn compress_level(data: &[u8]) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(data.len() + 4);
    payload.extend_from_slice(&(data.len() as u32).to_be_bytes());
    payload.extend_from_slice(data);

    let mut encoder = GzEncoder::new(&payload[..], Compression::fast());
    let mut compressed = Vec::new();
    encoder.read_to_end(&mut compressed)?;
    Ok(compressed)
}

/// Decompress a reassembled level payload and strip its length prefix.
///
/// # Errors
///
/// - `ProtocolError::ProtocolViolation` if the blob is not valid gzip or is
///   shorter than its own length header
pub fn decompress_level(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut payload = Vec::new();
    decoder
        .read_to_end(&mut payload)
        .map_err(|_| ProtocolError::ProtocolViolation("corrupt level payload".to_string()))?;

    if payload.len() < 4 {
        return Err(ProtocolError::ProtocolViolation(
            "level payload shorter than its length header".to_string(),
        ));
    }
    Ok(payload.split_off(4))
}
