//! Per-invocation state machine
//!
//! A [`Session`] owns the transport for exactly one [`Action`]. It walks
//! through
//!
//! ```text
//! Idle -> DeviceReady -> [PartitionResolving] -> Executing -> Done
//!                                  |
//!                                  +-> Aborted
//! Idle -> Streaming -> Done                    (mask ROM loader upload)
//! ```
//!
//! and releases the transport exactly once on the way out, whichever path
//! was taken.

use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use crate::crc::Crc16Stream;
use crate::error::{Error, Result};
use crate::info::{ChipVersion, FlashId, NandInfo};
use crate::param;
use crate::partition::{self, PartitionError, PartitionSize};
use crate::protocol::{
    Command, StatusCheck, CHIP_INFO_LEN, FLASH_ID_LEN, FLASH_INFO_LEN, LOADER_CHUNK_SIZE,
    LOADER_REQUEST,
};
use crate::transfer::{fill_from, Engine, TransferKind, TransferProgress, WriteOutcome};
use crate::transport::Transport;

/// Mask ROM upload stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderStage {
    /// DDR initialisation blob
    DdrInit,
    /// USB loader proper
    UsbLoader,
}

impl LoaderStage {
    /// Control transfer index selecting the stage
    pub const fn index(self) -> u16 {
        match self {
            LoaderStage::DdrInit => 0x471,
            LoaderStage::UsbLoader => 0x472,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LoaderStage::DdrInit => "DDR init",
            LoaderStage::UsbLoader => "USB loader",
        }
    }
}

/// Flash region addressed by sector range or by partition name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashTarget {
    /// Explicit start sector and sector count
    Range {
        /// Start sector
        offset: u32,
        /// Sector count
        count: u32,
    },
    /// Partition looked up in the parameter block
    Partition(String),
}

impl FlashTarget {
    /// Target a named partition
    pub fn partition(name: impl Into<String>) -> Self {
        FlashTarget::Partition(name.into())
    }
}

/// What a session does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Reset the device, `flag` selects the reboot mode
    Reboot {
        /// Mode flag
        flag: u8,
    },
    /// Upload a loader stage in mask ROM mode
    LoadLoader(LoaderStage),
    /// Query the chip version
    ChipVersion,
    /// Query the flash ID and NAND info
    NandInfo,
    /// Read ID block sectors (with spare bytes)
    ReadIdb {
        /// Start sector
        offset: u32,
        /// Sector count
        count: u32,
    },
    /// Write ID block sectors
    WriteIdb {
        /// Start sector
        offset: u32,
        /// Sector count
        count: u32,
    },
    /// Read SDRAM
    ReadRam {
        /// Absolute start address
        address: u32,
        /// Byte count
        length: u32,
    },
    /// Write SDRAM
    WriteRam {
        /// Absolute start address
        address: u32,
        /// Byte count
        length: u32,
    },
    /// Jump to a kernel in SDRAM
    ExecRam {
        /// Absolute kernel address
        kernel: u32,
        /// Absolute parameter address
        params: u32,
    },
    /// Read flash sectors
    ReadFlash(FlashTarget),
    /// Write flash sectors
    WriteFlash(FlashTarget),
    /// Erase flash sectors
    Erase(FlashTarget),
    /// Read the parameter block payload
    ReadParams,
    /// Write a new parameter block
    WriteParams,
}

impl Action {
    fn target(&self) -> Option<&FlashTarget> {
        match self {
            Action::ReadFlash(t) | Action::WriteFlash(t) | Action::Erase(t) => Some(t),
            _ => None,
        }
    }
}

/// Session tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay after the readiness probe
    pub settle: Duration,
    /// Status wrapper checking policy
    pub status_check: StatusCheck,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(20),
            status_check: StatusCheck::default(),
        }
    }
}

/// Result of a completed action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The action ran to completion
    Completed,
    /// A write stopped early because the input ended
    InputExhausted {
        /// Units written
        written: u32,
        /// Units not written
        remaining: u32,
    },
    /// Chip version reply
    ChipVersion(ChipVersion),
    /// Flash ID and NAND info replies
    NandInfo {
        /// Flash ID bytes
        flash_id: FlashId,
        /// Decoded info block
        info: NandInfo,
    },
    /// Loader upload finished
    Uploaded {
        /// Image bytes sent (without the CRC)
        bytes: u64,
        /// CRC-16 appended to the image
        crc: u16,
    },
}

impl From<WriteOutcome> for Outcome {
    fn from(outcome: WriteOutcome) -> Self {
        match outcome {
            WriteOutcome::Complete => Outcome::Completed,
            WriteOutcome::Exhausted { written, remaining } => {
                Outcome::InputExhausted { written, remaining }
            }
        }
    }
}

/// How a session ended, short of a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// The action ran
    Done(Outcome),
    /// Partition lookup failed; no mutating command was sent
    Aborted(PartitionError),
}

/// Payload streams and progress sink for one session
pub struct Streams<'a> {
    /// Payload source for write actions
    pub input: &'a mut dyn Read,
    /// Payload sink for read actions
    pub output: &'a mut dyn Write,
    /// Progress reporter
    pub progress: &'a mut dyn TransferProgress,
}

impl<'a> Streams<'a> {
    /// Bundle the streams
    pub fn new(
        input: &'a mut dyn Read,
        output: &'a mut dyn Write,
        progress: &'a mut dyn TransferProgress,
    ) -> Self {
        Self {
            input,
            output,
            progress,
        }
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Streaming(LoaderStage),
    DeviceReady,
    PartitionResolving(String),
    Executing(Option<(u32, u32)>),
    Done(Outcome),
    Aborted(PartitionError),
}

/// One action against one device
pub struct Session<T: Transport> {
    engine: Engine<T>,
    action: Action,
    config: SessionConfig,
}

impl<T: Transport> Session<T> {
    /// Prepare `action` on an open transport
    pub fn new(transport: T, action: Action, config: SessionConfig) -> Self {
        let flag = match action {
            Action::Reboot { flag } => flag,
            _ => 0,
        };
        Self {
            engine: Engine::new(transport, config.status_check).with_flag(flag),
            action,
            config,
        }
    }

    /// Run the action and release the transport
    pub fn run(mut self, mut streams: Streams<'_>) -> Result<Report> {
        let result = self.drive(&mut streams);
        let closed = self.engine.close();
        let report = result?;
        closed?;
        Ok(report)
    }

    fn drive(&mut self, streams: &mut Streams<'_>) -> Result<Report> {
        let mut state = State::Idle;
        loop {
            log::trace!("session state: {:?}", state);
            state = match state {
                State::Idle => self.on_idle()?,
                State::Streaming(stage) => self.on_streaming(stage, streams)?,
                State::DeviceReady => self.on_device_ready(),
                State::PartitionResolving(name) => self.on_partition_resolving(&name, streams)?,
                State::Executing(extent) => self.on_executing(extent, streams)?,
                State::Done(outcome) => return Ok(Report::Done(outcome)),
                State::Aborted(err) => return Ok(Report::Aborted(err)),
            };
        }
    }

    fn on_idle(&mut self) -> Result<State> {
        if let Action::LoadLoader(stage) = self.action {
            return Ok(State::Streaming(stage));
        }
        self.engine.simple(Command::TestUnitReady)?;
        if !self.config.settle.is_zero() {
            thread::sleep(self.config.settle);
        }
        Ok(State::DeviceReady)
    }

    fn on_streaming(&mut self, stage: LoaderStage, streams: &mut Streams<'_>) -> Result<State> {
        log::info!("load {}", stage.label());
        let outcome = upload_loader(
            self.engine.transport_mut(),
            stage,
            streams.input,
            streams.progress,
        )?;
        Ok(State::Done(outcome))
    }

    fn on_device_ready(&mut self) -> State {
        match self.action.target() {
            Some(FlashTarget::Partition(name)) => State::PartitionResolving(name.clone()),
            Some(FlashTarget::Range { offset, count }) => State::Executing(Some((*offset, *count))),
            None => State::Executing(None),
        }
    }

    fn on_partition_resolving(&mut self, name: &str, streams: &mut Streams<'_>) -> Result<State> {
        let block = self.read_param_block(streams)?;
        let payload = param::decode(&block)?;
        let cmdline = String::from_utf8_lossy(payload);

        if let Ok(table) = partition::find_table(&cmdline) {
            log::info!("found {}", table.trim_end());
        }
        let spec = match partition::resolve(&cmdline, name) {
            Ok(spec) => spec,
            Err(err) => return Ok(State::Aborted(err)),
        };
        let count = match spec.size {
            PartitionSize::Explicit(size) => size,
            PartitionSize::ToEnd => spec.sectors(self.nand_info()?.flash_size),
        };
        log::info!(
            "partition '{}': offset 0x{:08x}, {} sectors",
            name,
            spec.offset,
            count
        );
        Ok(State::Executing(Some((spec.offset, count))))
    }

    fn on_executing(
        &mut self,
        extent: Option<(u32, u32)>,
        streams: &mut Streams<'_>,
    ) -> Result<State> {
        let range = || {
            extent.ok_or_else(|| Error::Protocol("flash action without a resolved extent".into()))
        };

        let action = self.action.clone();
        let outcome = match &action {
            Action::Reboot { flag } => {
                log::info!("rebooting device (mode {})", flag);
                self.engine.simple(Command::ResetDevice)?;
                Outcome::Completed
            }
            Action::LoadLoader(_) => {
                return Err(Error::Protocol(
                    "loader upload outside of mask ROM streaming".into(),
                ))
            }
            Action::ChipVersion => {
                let reply = self.engine.query(Command::ReadChipInfo, CHIP_INFO_LEN)?;
                Outcome::ChipVersion(ChipVersion::parse(&reply)?)
            }
            Action::NandInfo => {
                let reply = self.engine.query(Command::ReadFlashId, FLASH_ID_LEN)?;
                let flash_id = FlashId::parse(&reply)?;
                let info = self.nand_info()?;
                Outcome::NandInfo { flash_id, info }
            }
            Action::ReadIdb { offset, count } => {
                let (offset, count) = (*offset, *count);
                self.engine.read_loop(
                    &TransferKind::IDB,
                    offset,
                    count,
                    streams.output,
                    streams.progress,
                )?;
                Outcome::Completed
            }
            Action::WriteIdb { offset, count } => {
                let (offset, count) = (*offset, *count);
                self.engine
                    .write_loop(
                        &TransferKind::IDB,
                        offset,
                        count,
                        streams.input,
                        streams.progress,
                    )?
                    .into()
            }
            Action::ReadRam { address, length } => {
                let (address, length) = (*address, *length);
                self.engine.read_loop(
                    &TransferKind::RAM,
                    address,
                    length,
                    streams.output,
                    streams.progress,
                )?;
                Outcome::Completed
            }
            Action::WriteRam { address, length } => {
                let (address, length) = (*address, *length);
                self.engine
                    .write_loop(
                        &TransferKind::RAM,
                        address,
                        length,
                        streams.input,
                        streams.progress,
                    )?
                    .into()
            }
            Action::ExecRam { kernel, params } => {
                log::info!("booting kernel...");
                let (kernel, params) = (*kernel, *params);
                self.engine.exec(kernel, params)?;
                Outcome::Completed
            }
            Action::ReadFlash(_) => {
                let (offset, count) = range()?;
                self.engine.read_loop(
                    &TransferKind::FLASH,
                    offset,
                    count,
                    streams.output,
                    streams.progress,
                )?;
                Outcome::Completed
            }
            Action::WriteFlash(_) => {
                let (offset, count) = range()?;
                self.engine
                    .write_loop(
                        &TransferKind::FLASH,
                        offset,
                        count,
                        streams.input,
                        streams.progress,
                    )?
                    .into()
            }
            Action::Erase(_) => {
                let (offset, count) = range()?;
                self.engine.erase(offset, count, streams.progress)?;
                Outcome::Completed
            }
            Action::ReadParams => {
                let block = self.read_param_block(streams)?;
                let payload = param::decode(&block)?;
                log::info!("parameter length: 0x{:08x}", payload.len());
                streams
                    .output
                    .write_all(payload)
                    .and_then(|()| streams.output.flush())
                    .map_err(|source| Error::Output {
                        transferred: 0,
                        source,
                    })?;
                Outcome::Completed
            }
            Action::WriteParams => {
                let mut payload = vec![0u8; param::MAX_PARAM_LENGTH + 1];
                let n = fill_from(streams.input, &mut payload)?;
                let block = param::encode(&payload[..n])?;
                for offset in param::REPLICA_OFFSETS {
                    self.engine.write_loop(
                        &TransferKind::FLASH,
                        offset,
                        param::PARAM_SECTORS,
                        &mut block.as_slice(),
                        streams.progress,
                    )?;
                }
                Outcome::Completed
            }
        };
        Ok(State::Done(outcome))
    }

    fn read_param_block(&mut self, streams: &mut Streams<'_>) -> Result<Vec<u8>> {
        log::info!("reading parameters at offset 0x{:08x}", param::READ_OFFSET);
        let mut block = Vec::with_capacity(crate::protocol::BLOCK_SIZE);
        self.engine.read_loop(
            &TransferKind::FLASH,
            param::READ_OFFSET,
            param::PARAM_SECTORS,
            &mut block,
            streams.progress,
        )?;
        Ok(block)
    }

    fn nand_info(&mut self) -> Result<NandInfo> {
        let reply = self.engine.query(Command::ReadFlashInfo, FLASH_INFO_LEN)?;
        NandInfo::parse(&reply)
    }
}

/// Stream a loader image to the mask ROM
///
/// The image goes out in 4096-byte vendor control transfers. The CRC-16 of
/// the whole image is appended, high byte first, to the final short chunk,
/// which may consist of the CRC alone.
pub fn upload_loader<T: Transport + ?Sized>(
    transport: &mut T,
    stage: LoaderStage,
    input: &mut dyn Read,
    progress: &mut dyn TransferProgress,
) -> Result<Outcome> {
    let mut crc = Crc16Stream::new();
    let mut chunk = vec![0u8; LOADER_CHUNK_SIZE + 2];
    let mut bytes = 0u64;

    progress.start(stage.label(), 0);
    let result = loop {
        let n = match fill_from(input, &mut chunk[..LOADER_CHUNK_SIZE]) {
            Ok(n) => n,
            Err(e) => break Err(e),
        };
        crc.update(&chunk[..n]);
        bytes += n as u64;

        if n < LOADER_CHUNK_SIZE {
            let crc = crc.finalize();
            chunk[n..n + 2].copy_from_slice(&crc.to_be_bytes());
            break send_control(transport, stage, &chunk[..n + 2]).map(|()| crc);
        }
        if let Err(e) = send_control(transport, stage, &chunk[..n]) {
            break Err(e);
        }
        progress.window(bytes as u32, bytes);
    };
    progress.finish();

    let crc = result?;
    log::debug!("{} uploaded: {} bytes, crc 0x{:04x}", stage.label(), bytes, crc);
    Ok(Outcome::Uploaded { bytes, crc })
}

fn send_control<T: Transport + ?Sized>(
    transport: &mut T,
    stage: LoaderStage,
    data: &[u8],
) -> Result<()> {
    let n = transport.control_send(LOADER_REQUEST, stage.index(), data)?;
    if n != data.len() {
        return Err(Error::ShortTransfer {
            expected: data.len(),
            actual: n,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;
    use crate::protocol::{BLOCK_SIZE, SECTOR_SIZE};
    use crate::transfer::NoProgress;
    use crate::transport::mock::MockTransport;

    const CMDLINE: &[u8] =
        b"CMDLINE:mtdparts=rk29xxnand:0x2000@0x2000(boot),0x4000@0x4000(kernel),-@0x8000(system)";

    fn config() -> SessionConfig {
        SessionConfig {
            settle: Duration::ZERO,
            status_check: StatusCheck::Strict,
        }
    }

    fn run(mock: &mut MockTransport, action: Action, input: &[u8]) -> Result<(Report, Vec<u8>)> {
        let mut input = input;
        let mut output = Vec::new();
        let report = Session::new(mock, action, config()).run(Streams::new(
            &mut input,
            &mut output,
            &mut NoProgress,
        ))?;
        Ok((report, output))
    }

    fn flash_info(flash_size: u32) -> Vec<u8> {
        let mut raw = vec![0u8; FLASH_INFO_LEN];
        NandInfo {
            flash_size,
            block_size: 0x200,
            page_size: 4,
            ecc_bits: 40,
            access_time: 32,
            manufacturer_id: 1,
            chip_select: 1,
        }
        .encode(&mut raw);
        raw
    }

    #[test]
    fn test_reboot() {
        let mut mock = MockTransport::new();
        let (report, _) = run(&mut mock, Action::Reboot { flag: 3 }, b"").unwrap();
        assert_eq!(report, Report::Done(Outcome::Completed));
        assert_eq!(
            mock.commands(),
            vec![Command::TestUnitReady, Command::ResetDevice]
        );
        assert_eq!(mock.frames[1].flag, 3);
        assert_eq!(mock.closed, 1);
    }

    #[test]
    fn test_loader_upload_chunks_and_crc() {
        let image: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        let mut mock = MockTransport::new();
        let (report, _) = run(&mut mock, Action::LoadLoader(LoaderStage::UsbLoader), &image).unwrap();

        let crc = crc16(&image);
        assert_eq!(
            report,
            Report::Done(Outcome::Uploaded { bytes: 5000, crc })
        );
        assert!(mock.frames.is_empty());
        assert_eq!(mock.controls.len(), 2);
        assert_eq!(mock.controls[0].0, 12);
        assert_eq!(mock.controls[0].1, 0x472);
        assert_eq!(mock.controls[0].2.len(), 4096);
        let last = &mock.controls[1].2;
        assert_eq!(last.len(), 5000 - 4096 + 2);
        assert_eq!(last[last.len() - 2], (crc >> 8) as u8);
        assert_eq!(last[last.len() - 1], crc as u8);
        assert_eq!(mock.closed, 1);
    }

    #[test]
    fn test_loader_upload_exact_multiple() {
        let image = vec![0u8; 4096];
        let mut mock = MockTransport::new();
        run(&mut mock, Action::LoadLoader(LoaderStage::DdrInit), &image).unwrap();

        assert_eq!(mock.controls.len(), 2);
        assert_eq!(mock.controls[1].1, 0x471);
        assert_eq!(mock.controls[1].2, 0xefdfu16.to_be_bytes().to_vec());
    }

    #[test]
    fn test_chip_version() {
        let mut mock = MockTransport::new().with_read_data(b"8813    01023021".to_vec());
        let (report, _) = run(&mut mock, Action::ChipVersion, b"").unwrap();
        match report {
            Report::Done(Outcome::ChipVersion(version)) => {
                assert_eq!(version.to_string(), "3188-    .20.10-1203")
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn test_nand_info() {
        let mut mock = MockTransport::new()
            .with_read_data(vec![0xad, 0xde, 0x94, 0xda, 0x74])
            .with_read_data(flash_info(0x0040_0000));
        let (report, _) = run(&mut mock, Action::NandInfo, b"").unwrap();
        match report {
            Report::Done(Outcome::NandInfo { flash_id, info }) => {
                assert_eq!(flash_id.to_string(), "ad de 94 da 74");
                assert_eq!(info.manufacturer(), "Toshiba");
            }
            other => panic!("unexpected report {:?}", other),
        }
        assert_eq!(
            mock.commands(),
            vec![
                Command::TestUnitReady,
                Command::ReadFlashId,
                Command::ReadFlashInfo
            ]
        );
    }

    #[test]
    fn test_partition_abort_sends_no_writes() {
        let block = param::encode(b"console=ttyS2 root=/dev/mmcblk0p7").unwrap();
        let mut mock = MockTransport::new().with_read_data(block);
        let (report, _) = run(&mut mock, Action::Erase(FlashTarget::partition("boot")), b"").unwrap();

        assert_eq!(report, Report::Aborted(PartitionError::TableNotFound));
        assert_eq!(mock.commands(), vec![Command::TestUnitReady, Command::ReadLba]);
        assert_eq!(mock.closed, 1);
    }

    #[test]
    fn test_partition_not_found() {
        let block = param::encode(CMDLINE).unwrap();
        let mut mock = MockTransport::new().with_read_data(block);
        let (report, _) = run(
            &mut mock,
            Action::WriteFlash(FlashTarget::partition("recovery")),
            &[0u8; 512],
        )
        .unwrap();
        assert_eq!(
            report,
            Report::Aborted(PartitionError::NotFound("recovery".into()))
        );
        assert!(mock.payloads.is_empty());
    }

    #[test]
    fn test_partition_to_end_queries_flash_size() {
        let block = param::encode(CMDLINE).unwrap();
        let mut mock = MockTransport::new()
            .with_read_data(block)
            .with_read_data(flash_info(0x8040));
        let (report, _) = run(&mut mock, Action::Erase(FlashTarget::partition("system")), b"").unwrap();

        assert_eq!(report, Report::Done(Outcome::Completed));
        assert_eq!(
            mock.commands(),
            vec![
                Command::TestUnitReady,
                Command::ReadLba,
                Command::ReadFlashInfo,
                Command::WriteLba,
                Command::WriteLba
            ]
        );
        assert_eq!(mock.frames[3].offset, 0x8000);
        assert_eq!(mock.frames[4].offset, 0x8020);
    }

    #[test]
    fn test_partition_read_uses_resolved_extent() {
        let table = b"mtdparts=nand:0x20@0x40(misc),0x40@0x80(boot)";
        let mut mock = MockTransport::new()
            .with_read_data(param::encode(table).unwrap())
            .with_read_data(vec![1; BLOCK_SIZE])
            .with_read_data(vec![2; BLOCK_SIZE]);
        let (_, output) = run(&mut mock, Action::ReadFlash(FlashTarget::partition("boot")), b"").unwrap();

        assert_eq!(output.len(), 0x40 * SECTOR_SIZE);
        let reads: Vec<_> = mock.frames[2..].iter().map(|f| (f.offset, f.length)).collect();
        assert_eq!(reads, vec![(0x80, 32), (0xa0, 32)]);
    }

    #[test]
    fn test_bad_parameter_crc_is_fatal() {
        let mut block = param::encode(CMDLINE).unwrap();
        block[20] ^= 0xff;
        let mut mock = MockTransport::new().with_read_data(block);
        let err = run(&mut mock, Action::ReadFlash(FlashTarget::partition("boot")), b"").unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
        assert_eq!(mock.closed, 1);
    }

    #[test]
    fn test_read_params() {
        let mut mock = MockTransport::new().with_read_data(param::encode(CMDLINE).unwrap());
        let (_, output) = run(&mut mock, Action::ReadParams, b"").unwrap();
        assert_eq!(output, CMDLINE);
    }

    #[test]
    fn test_write_params_replicas() {
        let mut mock = MockTransport::new();
        run(&mut mock, Action::WriteParams, CMDLINE).unwrap();

        let offsets: Vec<_> = mock.frames[1..].iter().map(|f| f.offset).collect();
        assert_eq!(offsets, param::REPLICA_OFFSETS.to_vec());
        let expected = param::encode(CMDLINE).unwrap();
        assert_eq!(mock.payloads.len(), 8);
        assert!(mock.payloads.iter().all(|p| *p == expected));
    }

    #[test]
    fn test_write_params_too_long() {
        let mut mock = MockTransport::new();
        let payload = vec![b'x'; param::MAX_PARAM_LENGTH + 1];
        let err = run(&mut mock, Action::WriteParams, &payload).unwrap_err();
        assert!(matches!(err, Error::LengthViolation { .. }));
        assert!(mock.payloads.is_empty());
        assert_eq!(mock.closed, 1);
    }

    #[test]
    fn test_transport_failure_still_closes() {
        let mut mock = MockTransport::new();
        mock.fail_on = Some(Command::ReadChipInfo);
        let err = run(&mut mock, Action::ChipVersion, b"").unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(mock.closed, 1);
    }

    #[test]
    fn test_write_exhaustion_is_not_fatal() {
        let mut mock = MockTransport::new();
        let input = vec![0u8; 3 * BLOCK_SIZE];
        let (report, _) = run(
            &mut mock,
            Action::WriteFlash(FlashTarget::Range {
                offset: 0,
                count: 128,
            }),
            &input,
        )
        .unwrap();
        assert_eq!(
            report,
            Report::Done(Outcome::InputExhausted {
                written: 96,
                remaining: 32
            })
        );
        assert_eq!(mock.closed, 1);
    }

    #[test]
    fn test_ram_and_exec() {
        let mut mock = MockTransport::new().with_read_data(vec![7; 0x10]);
        let (_, output) = run(
            &mut mock,
            Action::ReadRam {
                address: 0x6000_1000,
                length: 0x10,
            },
            b"",
        )
        .unwrap();
        assert_eq!(output, vec![7; 0x10]);
        assert_eq!(mock.frames[1].offset, 0x1000);

        let mut mock = MockTransport::new();
        run(
            &mut mock,
            Action::ExecRam {
                kernel: 0x6000_8000,
                params: 0x6010_0000,
            },
            b"",
        )
        .unwrap();
        assert_eq!(mock.frames[1].offset, 0x8000);
        assert_eq!(mock.frames[1].length, 0x0010_0000);
    }

    #[test]
    fn test_range_target_carries_extent() {
        let mut mock = MockTransport::new();
        let action = Action::Erase(FlashTarget::Range {
            offset: 0x40,
            count: 0x20,
        });
        let mut session = Session::new(&mut mock, action, config());
        assert!(matches!(
            session.on_device_ready(),
            State::Executing(Some((0x40, 0x20)))
        ));
    }

    #[test]
    fn test_flash_action_without_extent_is_rejected() {
        let mut mock = MockTransport::new();
        let mut input: &[u8] = b"";
        let mut output = Vec::new();
        let mut progress = NoProgress;
        let mut streams = Streams::new(&mut input, &mut output, &mut progress);

        for action in [
            Action::Erase(FlashTarget::partition("boot")),
            Action::LoadLoader(LoaderStage::DdrInit),
        ] {
            let mut session = Session::new(&mut mock, action, config());
            let err = session.on_executing(None, &mut streams).unwrap_err();
            assert!(matches!(err, Error::Protocol(_)));
        }

        assert!(mock.frames.is_empty());
    }
}
