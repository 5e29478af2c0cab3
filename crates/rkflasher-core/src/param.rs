//! Parameter block codec
//!
//! The parameter block holds the kernel command line (including the
//! `mtdparts=` partition table). On flash it occupies one 0x4000-byte block:
//!
//! ```text
//! 0..4        "PARM"
//! 4..8        payload length, little-endian
//! 8..8+n      payload
//! 8+n..12+n   CRC-32 of the payload, little-endian
//! ```
//!
//! The rest of the block is zero. The block is stored at eight replica
//! offsets so the loader can recover from a damaged copy.

use crate::crc::crc32;
use crate::error::{Error, Result};
use crate::protocol::{BLOCK_SIZE, SECTORS_PER_BLOCK};

/// Magic at the start of a parameter block
pub const PARAM_MAGIC: &[u8; 4] = b"PARM";

/// Header plus CRC trailer
const OVERHEAD: usize = 12;

/// Largest payload that fits in one block
pub const MAX_PARAM_LENGTH: usize = BLOCK_SIZE - OVERHEAD;

/// Sector offsets the parameter block is written to
pub const REPLICA_OFFSETS: [u32; 8] = [0x0000, 0x0400, 0x0800, 0x0c00, 0x1000, 0x1400, 0x1800, 0x1c00];

/// Sector the parameter block is read from
pub const READ_OFFSET: u32 = 0;

/// Sectors read or written per replica
pub const PARAM_SECTORS: u32 = SECTORS_PER_BLOCK;

/// Build a parameter block around `payload`
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PARAM_LENGTH {
        return Err(Error::LengthViolation {
            length: payload.len(),
            max: MAX_PARAM_LENGTH,
        });
    }
    let mut block = vec![0u8; BLOCK_SIZE];
    let end = 8 + payload.len();
    block[..4].copy_from_slice(PARAM_MAGIC);
    block[4..8].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    block[8..end].copy_from_slice(payload);
    block[end..end + 4].copy_from_slice(&crc32(payload).to_le_bytes());
    Ok(block)
}

/// Extract and verify the payload of a parameter block
///
/// A missing magic only produces a warning; the length and CRC are still
/// checked.
pub fn decode(block: &[u8]) -> Result<&[u8]> {
    if block.len() < 8 {
        return Err(Error::Protocol(format!(
            "parameter block too short: {} bytes",
            block.len()
        )));
    }
    if &block[..4] != PARAM_MAGIC {
        log::warn!("parameter block has no PARM magic");
    }
    let length = u32::from_le_bytes([block[4], block[5], block[6], block[7]]) as usize;
    if length > MAX_PARAM_LENGTH {
        return Err(Error::LengthViolation {
            length,
            max: MAX_PARAM_LENGTH,
        });
    }
    let end = 8 + length;
    let trailer = block.get(end..end + 4).ok_or(Error::LengthViolation {
        length,
        max: block.len().saturating_sub(OVERHEAD),
    })?;
    let payload = &block[8..end];
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed = crc32(payload);
    if stored != computed {
        return Err(Error::Integrity { stored, computed });
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CMDLINE: &[u8] =
        b"CMDLINE: console=ttyFIQ0 mtdparts=rk29xxnand:0x2000@0x2000(boot),-@0x4000(system)";

    #[test]
    fn test_round_trip() {
        let block = encode(CMDLINE).unwrap();
        assert_eq!(block.len(), BLOCK_SIZE);
        assert_eq!(&block[..4], b"PARM");
        assert_eq!(decode(&block).unwrap(), CMDLINE);
        assert!(block[12 + CMDLINE.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_flipped_byte_is_integrity_error() {
        let block = encode(CMDLINE).unwrap();
        for i in [8, 20, 8 + CMDLINE.len() - 1] {
            let mut bad = block.clone();
            bad[i] ^= 0x01;
            assert!(matches!(decode(&bad), Err(Error::Integrity { .. })));
        }
    }

    #[test]
    fn test_length_boundary() {
        let payload = vec![b'x'; MAX_PARAM_LENGTH];
        let block = encode(&payload).unwrap();
        assert_eq!(decode(&block).unwrap().len(), MAX_PARAM_LENGTH);

        assert!(matches!(
            encode(&vec![b'x'; MAX_PARAM_LENGTH + 1]),
            Err(Error::LengthViolation { .. })
        ));

        let mut bad = block;
        bad[4..8].copy_from_slice(&((MAX_PARAM_LENGTH + 1) as u32).to_le_bytes());
        assert!(matches!(
            decode(&bad),
            Err(Error::LengthViolation { length, .. }) if length == MAX_PARAM_LENGTH + 1
        ));
    }

    #[test]
    fn test_missing_magic_still_decodes() {
        let mut block = encode(b"abc").unwrap();
        block[..4].copy_from_slice(b"XXXX");
        assert_eq!(decode(&block).unwrap(), b"abc");
    }

    #[test]
    fn test_empty_payload() {
        let block = encode(b"").unwrap();
        assert_eq!(decode(&block).unwrap(), b"");
    }

    #[test]
    fn test_replica_offsets() {
        for pair in REPLICA_OFFSETS.windows(2) {
            assert_eq!(pair[1] - pair[0], 0x400);
        }
    }
}
