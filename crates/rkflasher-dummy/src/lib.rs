//! rkflasher-dummy - In-memory rockusb bootloader emulator for testing
//!
//! This crate provides a dummy device that answers rockusb command frames
//! from memory: LBA flash, the ID block area, SDRAM, the info queries and
//! mask ROM loader uploads. It's useful for testing and development without
//! real hardware.

use std::collections::VecDeque;

use rkflasher_core::crc::crc16;
use rkflasher_core::info::NandInfo;
use rkflasher_core::param;
use rkflasher_core::protocol::{
    Command, CommandFrame, StatusFrame, CBW_LEN, CHIP_INFO_LEN, FLASH_ID_LEN, FLASH_INFO_LEN,
    IDB_SECTOR_SIZE, LOADER_REQUEST, SECTOR_SIZE,
};
use rkflasher_core::{Error, Result, Transport};

/// Status byte for a failed command
const STATUS_FAILED: u8 = 1;

/// Configuration for the dummy device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Flash size in 512-byte sectors
    pub flash_sectors: u32,
    /// ID block area size in sectors
    pub idb_sectors: u32,
    /// SDRAM size in bytes
    pub sdram_size: usize,
    /// Flash ID reply
    pub flash_id: [u8; FLASH_ID_LEN],
    /// Chip info reply
    pub chip_info: [u8; CHIP_INFO_LEN],
    /// NAND manufacturer index
    pub manufacturer_id: u8,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            flash_sectors: 0x4000,
            idb_sectors: 0x100,
            sdram_size: 1024 * 1024,
            flash_id: [0xad, 0xde, 0x94, 0xda, 0x74],
            chip_info: *b"8813    01023021",
            manufacturer_id: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Flash,
    Idb,
    Sdram,
}

/// Data stage the device is waiting for
#[derive(Debug)]
struct PendingWrite {
    frame: CommandFrame,
    region: Region,
    start: usize,
    expected: usize,
    data: Vec<u8>,
}

/// Dummy rockusb device
///
/// Emulates a bootloader in memory for testing purposes. Erased flash reads
/// back as 0xFF.
pub struct DummyDevice {
    config: DummyConfig,
    flash: Vec<u8>,
    idb: Vec<u8>,
    sdram: Vec<u8>,
    outbox: VecDeque<Vec<u8>>,
    pending: Option<PendingWrite>,
    uploads: Vec<(u16, Vec<u8>)>,
    commands: Vec<Command>,
    reboot_flag: Option<u8>,
    executed: Option<(u32, u32)>,
    close_count: usize,
}

impl DummyDevice {
    /// Create a new dummy device with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            flash: vec![0xff; config.flash_sectors as usize * SECTOR_SIZE],
            idb: vec![0xff; config.idb_sectors as usize * IDB_SECTOR_SIZE],
            sdram: vec![0; config.sdram_size],
            config,
            outbox: VecDeque::new(),
            pending: None,
            uploads: Vec::new(),
            commands: Vec::new(),
            reboot_flag: None,
            executed: None,
            close_count: 0,
        }
    }

    /// Create a new dummy device with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a device with `cmdline` already stored as parameter block
    pub fn with_parameters(config: DummyConfig, cmdline: &str) -> Result<Self> {
        let mut device = Self::new(config);
        let block = param::encode(cmdline.as_bytes())?;
        for offset in param::REPLICA_OFFSETS {
            device.write_flash(offset, &block)?;
        }
        Ok(device)
    }

    /// Store `data` at sector `offset`
    pub fn write_flash(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        let start = offset as usize * SECTOR_SIZE;
        let dest = self
            .flash
            .get_mut(start..start + data.len())
            .ok_or_else(|| Error::InvalidArgument(format!("sector 0x{:x} out of range", offset)))?;
        dest.copy_from_slice(data);
        Ok(())
    }

    /// Flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// ID block area contents, 0x210 bytes per sector
    pub fn idb(&self) -> &[u8] {
        &self.idb
    }

    /// SDRAM contents
    pub fn sdram(&self) -> &[u8] {
        &self.sdram
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Commands received, in order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Mode flag of the last reset command
    pub fn reboot_flag(&self) -> Option<u8> {
        self.reboot_flag
    }

    /// Relative kernel and parameter addresses of the last exec command
    pub fn executed(&self) -> Option<(u32, u32)> {
        self.executed
    }

    /// How often the transport was closed
    pub fn close_count(&self) -> usize {
        self.close_count
    }

    /// Control transfer payloads received for `index`, in order
    pub fn uploads(&self, index: u16) -> Vec<&[u8]> {
        self.uploads
            .iter()
            .filter(|(i, _)| *i == index)
            .map(|(_, data)| data.as_slice())
            .collect()
    }

    /// Reassembled loader image for `index`, if its trailing CRC-16 matches
    pub fn loader_image(&self, index: u16) -> Option<Vec<u8>> {
        let stream: Vec<u8> = self.uploads(index).concat();
        let split = stream.len().checked_sub(2)?;
        let (image, crc) = stream.split_at(split);
        (crc16(image).to_be_bytes()[..] == *crc).then(|| image.to_vec())
    }

    fn nand_info(&self) -> NandInfo {
        NandInfo {
            flash_size: self.config.flash_sectors,
            block_size: 0x200,
            page_size: 4,
            ecc_bits: 40,
            access_time: 32,
            manufacturer_id: self.config.manufacturer_id,
            chip_select: 0x01,
        }
    }

    fn region(&self, region: Region) -> &[u8] {
        match region {
            Region::Flash => &self.flash,
            Region::Idb => &self.idb,
            Region::Sdram => &self.sdram,
        }
    }

    fn region_mut(&mut self, region: Region) -> &mut [u8] {
        match region {
            Region::Flash => &mut self.flash,
            Region::Idb => &mut self.idb,
            Region::Sdram => &mut self.sdram,
        }
    }

    fn reply(&mut self, frame: &CommandFrame, status: u8) {
        self.outbox
            .push_back(StatusFrame::reply(frame, status).encode().to_vec());
    }

    /// Queue `len` bytes of `region` from `start`; out-of-range bytes read 0xFF
    fn reply_data(&mut self, frame: &CommandFrame, region: Region, start: usize, len: usize) {
        let memory = self.region(region);
        let mut data = vec![0xff; len];
        let in_range = memory.len().saturating_sub(start).min(len);
        if in_range > 0 {
            data[..in_range].copy_from_slice(&memory[start..start + in_range]);
        }
        self.outbox.push_back(data);
        let status = if in_range == len { 0 } else { STATUS_FAILED };
        self.reply(frame, status);
    }

    fn handle_frame(&mut self, frame: CommandFrame) -> Result<()> {
        let cmd = frame.command().ok_or_else(|| {
            Error::Protocol(format!("unknown opcode 0x{:08x}", frame.opcode))
        })?;
        log::trace!("dummy: {} offset=0x{:x} length=0x{:x}", cmd, frame.offset, frame.length);
        self.commands.push(cmd);

        let offset = frame.offset as usize;
        let length = frame.length as usize;
        match cmd {
            Command::TestUnitReady => self.reply(&frame, 0),
            Command::ReadFlashId => {
                self.outbox.push_back(self.config.flash_id.to_vec());
                self.reply(&frame, 0);
            }
            Command::ReadFlashInfo => {
                let mut info = vec![0u8; FLASH_INFO_LEN];
                self.nand_info().encode(&mut info);
                self.outbox.push_back(info);
                self.reply(&frame, 0);
            }
            Command::ReadChipInfo => {
                self.outbox.push_back(self.config.chip_info.to_vec());
                self.reply(&frame, 0);
            }
            Command::ResetDevice => {
                self.reboot_flag = Some(frame.flag);
                self.reply(&frame, 0);
            }
            Command::ExecuteSdram => {
                self.executed = Some((frame.offset, frame.length));
                self.reply(&frame, 0);
            }
            Command::ReadLba => {
                self.reply_data(&frame, Region::Flash, offset * SECTOR_SIZE, length * SECTOR_SIZE)
            }
            Command::ReadSector => self.reply_data(
                &frame,
                Region::Idb,
                offset * IDB_SECTOR_SIZE,
                length * IDB_SECTOR_SIZE,
            ),
            Command::ReadSdram => self.reply_data(&frame, Region::Sdram, offset, length),
            Command::WriteLba | Command::WriteSector | Command::WriteSdram => {
                let (region, unit) = match cmd {
                    Command::WriteLba => (Region::Flash, SECTOR_SIZE),
                    Command::WriteSector => (Region::Idb, IDB_SECTOR_SIZE),
                    _ => (Region::Sdram, 1),
                };
                self.pending = Some(PendingWrite {
                    frame,
                    region,
                    start: offset * unit,
                    expected: length * unit,
                    data: Vec::with_capacity(length * unit),
                });
            }
        }
        Ok(())
    }

    fn handle_data(&mut self, data: &[u8]) -> Result<()> {
        let Some(mut pending) = self.pending.take() else {
            return Err(Error::Protocol(format!(
                "unexpected {} byte bulk transfer",
                data.len()
            )));
        };
        pending.data.extend_from_slice(data);
        if pending.data.len() < pending.expected {
            self.pending = Some(pending);
            return Ok(());
        }

        let memory = self.region_mut(pending.region);
        let end = pending.start + pending.expected;
        let status = match memory.get_mut(pending.start..end) {
            Some(dest) => {
                dest.copy_from_slice(&pending.data[..pending.expected]);
                0
            }
            None => STATUS_FAILED,
        };
        self.reply(&pending.frame, status);
        Ok(())
    }
}

impl Transport for DummyDevice {
    fn bulk_send(&mut self, data: &[u8]) -> Result<usize> {
        if self.pending.is_none() && data.len() == CBW_LEN {
            self.handle_frame(CommandFrame::decode(data)?)?;
        } else {
            self.handle_data(data)?;
        }
        Ok(data.len())
    }

    fn bulk_recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(mut packet) = self.outbox.pop_front() else {
            return Ok(0);
        };
        let n = packet.len().min(buf.len());
        buf[..n].copy_from_slice(&packet[..n]);
        if n < packet.len() {
            self.outbox.push_front(packet.split_off(n));
        }
        Ok(n)
    }

    fn control_send(&mut self, request: u8, index: u16, data: &[u8]) -> Result<usize> {
        if request != LOADER_REQUEST {
            return Err(Error::Protocol(format!("unexpected control request {}", request)));
        }
        self.uploads.push((index, data.to_vec()));
        Ok(data.len())
    }

    fn close(&mut self) -> Result<()> {
        self.close_count += 1;
        Ok(())
    }
}
