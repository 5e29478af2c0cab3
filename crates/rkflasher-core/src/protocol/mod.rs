//! Rockusb protocol constants and command catalog
//!
//! The bootloader speaks a variant of the USB mass storage bulk-only
//! transport: every request starts with a 31-byte command block wrapper
//! (CBW), is optionally followed by a data stage, and ends with a 13-byte
//! command status wrapper (CSW). Bytes 12..16 of the CBW (flags, LUN,
//! CDB length, CDB[0]) are treated as a single big-endian opcode.

mod frame;

pub use frame::{CommandFrame, StatusCheck, StatusFrame, CBW_LEN, CSW_LEN};

/// Sector size used by all LBA addressed commands
pub const SECTOR_SIZE: usize = 512;

/// Size of one flash transfer window in bytes (must be a multiple of 512)
pub const BLOCK_SIZE: usize = 0x4000;

/// Sectors per flash transfer window
pub const SECTORS_PER_BLOCK: u32 = (BLOCK_SIZE / SECTOR_SIZE) as u32;

/// Payload bytes in one ID block sector
pub const IDB_DATA_SIZE: usize = 0x200;

/// Bytes per ID block sector on the wire (data plus spare area)
pub const IDB_SECTOR_SIZE: usize = 0x210;

/// ID block sectors per read window
pub const IDB_READ_WINDOW: u32 = 0x20;

/// SDRAM base address; RAM commands take offsets relative to it
pub const SDRAM_BASE_ADDRESS: u32 = 0x6000_0000;

/// Size of the flash info reply
pub const FLASH_INFO_LEN: usize = 512;

/// Size of the flash ID reply
pub const FLASH_ID_LEN: usize = 5;

/// Size of the chip info reply
pub const CHIP_INFO_LEN: usize = 16;

/// Vendor request used for mask ROM code upload
pub const LOADER_REQUEST: u8 = 12;

/// Chunk size for mask ROM code upload
pub const LOADER_CHUNK_SIZE: usize = 4096;

/// Rockusb commands
///
/// Read commands have bit 31 set (direction IN); the low byte is the CDB
/// opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Probe whether the bootloader is ready
    TestUnitReady,
    /// Read the 5-byte NAND flash ID
    ReadFlashId,
    /// Read the 512-byte flash info block
    ReadFlashInfo,
    /// Read the 16-byte chip version
    ReadChipInfo,
    /// Reset the device; the mode flag selects the reboot mode
    ResetDevice,
    /// Read ID block sectors (with spare bytes)
    ReadSector,
    /// Write ID block sectors (with spare bytes)
    WriteSector,
    /// Read 512-byte sectors by LBA
    ReadLba,
    /// Write 512-byte sectors by LBA
    WriteLba,
    /// Read SDRAM bytes
    ReadSdram,
    /// Write SDRAM bytes
    WriteSdram,
    /// Jump to code in SDRAM
    ExecuteSdram,
}

/// Which CBW fields a command fills in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFields {
    /// Opcode (and mode flag) only
    None,
    /// 32-bit offset at byte 17 and 16-bit length at byte 22
    OffsetLength,
    /// 32-bit kernel address at byte 17 and 32-bit parameter address at byte 22
    OffsetAddress,
}

impl Command {
    /// All commands, in opcode order
    pub const ALL: [Command; 12] = [
        Command::TestUnitReady,
        Command::ReadFlashId,
        Command::ReadFlashInfo,
        Command::ReadChipInfo,
        Command::ResetDevice,
        Command::ReadSector,
        Command::WriteSector,
        Command::ReadLba,
        Command::WriteLba,
        Command::ReadSdram,
        Command::WriteSdram,
        Command::ExecuteSdram,
    ];

    /// 32-bit opcode written big-endian at CBW byte 12
    pub const fn opcode(self) -> u32 {
        match self {
            Command::TestUnitReady => 0x8000_0600,
            Command::ReadFlashId => 0x8000_0601,
            Command::ReadFlashInfo => 0x8000_061a,
            Command::ReadChipInfo => 0x8000_061b,
            Command::ResetDevice => 0x0000_06ff,
            Command::ReadSector => 0x8000_0a04,
            Command::WriteSector => 0x0000_0a05,
            Command::ReadLba => 0x8000_0a14,
            Command::WriteLba => 0x0000_0a15,
            Command::ReadSdram => 0x8000_0a17,
            Command::WriteSdram => 0x0000_0a18,
            Command::ExecuteSdram => 0x0000_0a19,
        }
    }

    /// Frame fields used by this command
    pub const fn fields(self) -> FrameFields {
        match self {
            Command::TestUnitReady
            | Command::ReadFlashId
            | Command::ReadFlashInfo
            | Command::ReadChipInfo
            | Command::ResetDevice => FrameFields::None,
            Command::ReadSector
            | Command::WriteSector
            | Command::ReadLba
            | Command::WriteLba
            | Command::ReadSdram
            | Command::WriteSdram => FrameFields::OffsetLength,
            Command::ExecuteSdram => FrameFields::OffsetAddress,
        }
    }

    /// Look a command up by opcode
    pub fn from_opcode(opcode: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.opcode() == opcode)
    }

    /// Whether the data stage (if any) flows from device to host
    pub const fn is_read(self) -> bool {
        self.opcode() & 0x8000_0000 != 0
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} (0x{:08x})", self, self.opcode())
    }
}
