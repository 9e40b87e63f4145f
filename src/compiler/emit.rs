//! # Binary Unit Writer
//!
//! Packages a compiled [`Unit`] into the in-memory image the loader accepts:
//!
//! ```text
//! offset  size  field
//! 0       4     magic "SRUN"
//! 4       2     format version (u16 LE)
//! 6       2     reserved flags (u16 LE, 0)
//! 8       32    SHA-256 of payload
//! 40      4     payload length (u32 LE)
//! 44      n     payload (JSON-serialized unit)
//! ```

use sha2::{Digest, Sha256};

use super::instruction::Unit;
use crate::{Error, Result};

/// Image magic
pub const MAGIC: [u8; 4] = *b"SRUN";

/// Current image format version
pub const FORMAT_VERSION: u16 = 1;

/// Size of the fixed header preceding the payload
pub const HEADER_LEN: usize = 44;

/// Offset of the payload checksum
pub const CHECKSUM_OFFSET: usize = 8;

/// Offset of the payload length
pub const LENGTH_OFFSET: usize = 40;

/// Serializes a unit into a binary image
pub fn encode(unit: &Unit) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(unit).map_err(|e| Error::Emit(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| Error::Emit(format!("Payload of {} bytes is too large", payload.len())))?;

    let mut image = Vec::with_capacity(HEADER_LEN + payload.len());
    image.extend_from_slice(&MAGIC);
    image.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    image.extend_from_slice(&0u16.to_le_bytes());
    image.extend_from_slice(Sha256::digest(&payload).as_slice());
    image.extend_from_slice(&length.to_le_bytes());
    image.extend_from_slice(&payload);
    Ok(image)
}

/// Hex digest identifying an image by its payload
pub fn image_id(image: &[u8]) -> String {
    image
        .get(CHECKSUM_OFFSET..CHECKSUM_OFFSET + 8)
        .map(hex::encode)
        .unwrap_or_default()
}
