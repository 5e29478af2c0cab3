//! Rockchip checksums
//!
//! Both checksums are plain MSB-first CRCs without reflection or final XOR.
//! The 16-bit one is CRC-16/CCITT-FALSE (`CRC_16_IBM_3740` in the `crc`
//! crate); the 32-bit one uses the Rockchip polynomial `0x04C10DB7`, which is
//! not in the catalog.

use crc::{Algorithm, Crc, Digest, CRC_16_IBM_3740};

/// CRC-32 variant used by the parameter block
pub const RKCRC32_ALGO: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04c1_0db7,
    init: 0x0000_0000,
    refin: false,
    refout: false,
    xorout: 0x0000_0000,
    check: 0x889a_9615,
    residue: 0x0000_0000,
};

static RKCRC32: Crc<u32> = Crc::<u32>::new(&RKCRC32_ALGO);
static RKCRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// CRC-32 of a complete buffer, as stored in the parameter block trailer
pub fn crc32(data: &[u8]) -> u32 {
    RKCRC32.checksum(data)
}

/// CRC-16 of a complete buffer, as appended to mask ROM uploads
pub fn crc16(data: &[u8]) -> u16 {
    RKCRC16.checksum(data)
}

/// Running CRC-16 over a loader image that is sent in several pieces
pub struct Crc16Stream {
    digest: Digest<'static, u16>,
}

impl Crc16Stream {
    /// Start a new checksum (initial value 0xFFFF)
    pub fn new() -> Self {
        Self {
            digest: RKCRC16.digest(),
        }
    }

    /// Feed the next piece of the image
    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    /// Final checksum over everything fed so far
    pub fn finalize(self) -> u16 {
        self.digest.finalize()
    }
}

impl Default for Crc16Stream {
    fn default() -> Self {
        Self::new()
    }
}
