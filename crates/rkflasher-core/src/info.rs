//! Device information replies
//!
//! Decoders for the replies to `ReadFlashId`, `ReadFlashInfo` and
//! `ReadChipInfo`.

use std::fmt;

use crate::error::{Error, Result};
use crate::protocol::{CHIP_INFO_LEN, FLASH_ID_LEN};

/// NAND manufacturers, indexed by the manufacturer byte of the flash info
const MANUFACTURERS: [&str; 9] = [
    "Samsung", "Toshiba", "Hynix", "Infineon", "Micron", "Renesas", "Intel", "UNKNOWN", "SanDisk",
];

/// Decoded flash info block
///
/// Sizes are in 512-byte sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NandInfo {
    /// Total flash size in sectors
    pub flash_size: u32,
    /// Erase block size in sectors
    pub block_size: u16,
    /// Page size in sectors
    pub page_size: u8,
    /// ECC strength in bits
    pub ecc_bits: u8,
    /// Access time setting
    pub access_time: u8,
    /// Index into the manufacturer table
    pub manufacturer_id: u8,
    /// Bit mask of populated chip selects
    pub chip_select: u8,
}

impl NandInfo {
    const MIN_LEN: usize = 11;

    /// Decode the flash info reply
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_LEN {
            return Err(Error::Protocol(format!(
                "flash info too short: {} bytes",
                data.len()
            )));
        }
        Ok(Self {
            flash_size: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            block_size: u16::from_le_bytes([data[4], data[5]]),
            page_size: data[6],
            ecc_bits: data[7],
            access_time: data[8],
            manufacturer_id: data[9],
            chip_select: data[10],
        })
    }

    /// Encode into a flash info reply (used by emulators)
    pub fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.flash_size.to_le_bytes());
        out[4..6].copy_from_slice(&self.block_size.to_le_bytes());
        out[6] = self.page_size;
        out[7] = self.ecc_bits;
        out[8] = self.access_time;
        out[9] = self.manufacturer_id;
        out[10] = self.chip_select;
    }

    /// Manufacturer name, or "Unknown" for ids outside the table
    pub fn manufacturer(&self) -> &'static str {
        MANUFACTURERS
            .get(self.manufacturer_id as usize)
            .copied()
            .unwrap_or("Unknown")
    }

    /// Populated chip selects (0..=3)
    pub fn chip_selects(&self) -> impl Iterator<Item = u8> + '_ {
        (0..4u8).filter(move |&cs| self.chip_select & (1 << cs) != 0)
    }
}

impl fmt::Display for NandInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Flash Info:")?;
        writeln!(
            f,
            "\tManufacturer: {} ({})",
            self.manufacturer(),
            self.manufacturer_id
        )?;
        writeln!(f, "\tFlash Size: {}MB", self.flash_size >> 11)?;
        writeln!(f, "\tBlock Size: {}KB", self.block_size >> 1)?;
        writeln!(f, "\tPage Size: {}KB", self.page_size >> 1)?;
        writeln!(f, "\tECC Bits: {}", self.ecc_bits)?;
        writeln!(f, "\tAccess Time: {}", self.access_time)?;
        write!(f, "\tFlash CS:")?;
        for cs in self.chip_selects() {
            write!(f, " <{}>", cs)?;
        }
        Ok(())
    }
}

/// Raw NAND flash ID bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashId(pub [u8; FLASH_ID_LEN]);

impl FlashId {
    /// Decode the flash ID reply
    pub fn parse(data: &[u8]) -> Result<Self> {
        let bytes = data
            .get(..FLASH_ID_LEN)
            .ok_or_else(|| Error::Protocol(format!("flash ID too short: {} bytes", data.len())))?;
        let mut id = [0u8; FLASH_ID_LEN];
        id.copy_from_slice(bytes);
        Ok(Self(id))
    }
}

impl fmt::Display for FlashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e] = self.0;
        write!(f, "{:02x} {:02x} {:02x} {:02x} {:02x}", a, b, c, d, e)
    }
}

/// Chip version reply
///
/// Sixteen ASCII bytes in four little-endian groups of four.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipVersion(pub [u8; CHIP_INFO_LEN]);

impl ChipVersion {
    /// Decode the chip info reply
    pub fn parse(data: &[u8]) -> Result<Self> {
        let bytes = data.get(..CHIP_INFO_LEN).ok_or_else(|| {
            Error::Protocol(format!("chip info too short: {} bytes", data.len()))
        })?;
        let mut raw = [0u8; CHIP_INFO_LEN];
        raw.copy_from_slice(bytes);
        Ok(Self(raw))
    }

    /// The four groups with their byte order restored
    pub fn groups(&self) -> [String; 4] {
        let group = |i: usize| {
            self.0[i * 4..i * 4 + 4]
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        };
        [group(0), group(1), group(2), group(3)]
    }
}

impl fmt::Display for ChipVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.groups();
        let major: String = c.chars().take(2).collect();
        let minor: String = c.chars().skip(2).collect();
        write!(f, "{}-{}.{}.{}-{}", a, b, major, minor, d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nand_info_parse() {
        let mut raw = [0u8; 512];
        raw[0..4].copy_from_slice(&0x0040_0000u32.to_le_bytes());
        raw[4..6].copy_from_slice(&512u16.to_le_bytes());
        raw[6] = 8;
        raw[7] = 40;
        raw[8] = 32;
        raw[9] = 2;
        raw[10] = 0b0101;

        let info = NandInfo::parse(&raw).unwrap();
        assert_eq!(info.flash_size, 0x0040_0000);
        assert_eq!(info.block_size, 512);
        assert_eq!(info.page_size, 8);
        assert_eq!(info.manufacturer(), "Hynix");
        assert_eq!(info.chip_selects().collect::<Vec<_>>(), vec![0, 2]);

        let text = info.to_string();
        assert!(text.contains("Flash Size: 2048MB"));
        assert!(text.contains("Block Size: 256KB"));
        assert!(text.contains("Flash CS: <0> <2>"));
    }

    #[test]
    fn test_nand_info_encode_round_trip() {
        let info = NandInfo {
            flash_size: 0x1234,
            block_size: 0x200,
            page_size: 4,
            ecc_bits: 24,
            access_time: 40,
            manufacturer_id: 42,
            chip_select: 1,
        };
        let mut raw = [0u8; 512];
        info.encode(&mut raw);
        let parsed = NandInfo::parse(&raw).unwrap();
        assert_eq!(parsed, info);
        assert_eq!(parsed.manufacturer(), "Unknown");
    }

    #[test]
    fn test_short_replies() {
        assert!(NandInfo::parse(&[0u8; 4]).is_err());
        assert!(FlashId::parse(&[0u8; 4]).is_err());
        assert!(ChipVersion::parse(&[0u8; 15]).is_err());
    }

    #[test]
    fn test_flash_id_display() {
        let id = FlashId::parse(&[0xad, 0xde, 0x94, 0xda, 0x74, 0xff]).unwrap();
        assert_eq!(id.to_string(), "ad de 94 da 74");
    }

    #[test]
    fn test_chip_version_display() {
        let raw = *b"8813\x20\x20\x20\x20\x30\x31\x30\x32\x33\x30\x32\x31";
        let version = ChipVersion::parse(&raw).unwrap();
        assert_eq!(version.groups()[0], "3188");
        assert_eq!(version.to_string(), "3188-    .20.10-1203");
    }
}
