//! Windowed block transfer engine
//!
//! Every bulk operation follows the same pattern: split the request into
//! windows, send one command frame per window, move the window's data on the
//! bulk endpoints and read back the status wrapper. The three memory kinds
//! differ only in their opcodes, unit size and window size, captured by
//! [`TransferKind`].

use std::io::{self, Read, Write};

use crate::error::{Error, Result};
use crate::protocol::{
    Command, CommandFrame, StatusCheck, BLOCK_SIZE, CSW_LEN, IDB_DATA_SIZE, IDB_READ_WINDOW,
    IDB_SECTOR_SIZE, SDRAM_BASE_ADDRESS, SECTORS_PER_BLOCK, SECTOR_SIZE,
};
use crate::transport::Transport;

/// Byte used to pad partial units and ID block spare areas, and to erase
pub const FILL_BYTE: u8 = 0xff;

/// Per-window progress callbacks
///
/// Offsets and byte counts passed to [`window`](Self::window) never
/// decrease within one operation.
pub trait TransferProgress {
    /// An operation is starting
    fn start(&mut self, label: &str, total_bytes: u64);

    /// A window at `offset` has been transferred; `bytes_done` is cumulative
    fn window(&mut self, offset: u32, bytes_done: u64);

    /// The operation ended, successfully or not
    fn finish(&mut self);
}

/// A no-op progress reporter
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn start(&mut self, _label: &str, _total_bytes: u64) {}
    fn window(&mut self, _offset: u32, _bytes_done: u64) {}
    fn finish(&mut self) {}
}

/// Opcodes and geometry of one addressable memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferKind {
    /// Short name used in log messages
    pub name: &'static str,
    /// Read opcode
    pub read: Command,
    /// Write opcode
    pub write: Command,
    /// Bytes per addressed unit on the wire
    pub unit_size: usize,
    /// Bytes per unit taken from the input stream on write
    pub data_size: usize,
    /// Units per read window
    pub read_window: u32,
    /// Units per write window
    pub write_window: u32,
    /// Subtracted from offsets before framing
    pub base: u32,
}

impl TransferKind {
    /// 512-byte flash sectors, 32 per window
    pub const FLASH: TransferKind = TransferKind {
        name: "flash",
        read: Command::ReadLba,
        write: Command::WriteLba,
        unit_size: SECTOR_SIZE,
        data_size: SECTOR_SIZE,
        read_window: SECTORS_PER_BLOCK,
        write_window: SECTORS_PER_BLOCK,
        base: 0,
    };

    /// SDRAM bytes, one block per window, addressed from the SDRAM base
    pub const RAM: TransferKind = TransferKind {
        name: "memory",
        read: Command::ReadSdram,
        write: Command::WriteSdram,
        unit_size: 1,
        data_size: 1,
        read_window: BLOCK_SIZE as u32,
        write_window: BLOCK_SIZE as u32,
        base: SDRAM_BASE_ADDRESS,
    };

    /// ID block sectors with spare bytes
    pub const IDB: TransferKind = TransferKind {
        name: "IDB flash",
        read: Command::ReadSector,
        write: Command::WriteSector,
        unit_size: IDB_SECTOR_SIZE,
        data_size: IDB_DATA_SIZE,
        read_window: IDB_READ_WINDOW,
        write_window: 1,
        base: 0,
    };

    /// Same kind with both windows set to `units`
    pub const fn with_window(mut self, units: u32) -> Self {
        self.read_window = units;
        self.write_window = units;
        self
    }
}

/// How a write loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every requested unit was written
    Complete,
    /// The input ran dry before the requested count was reached
    Exhausted {
        /// Units written
        written: u32,
        /// Units still outstanding
        remaining: u32,
    },
}

/// Command/status exchange and windowed transfers over a [`Transport`]
pub struct Engine<T> {
    transport: T,
    flag: u8,
    status_check: StatusCheck,
    buf: Vec<u8>,
}

impl<T: Transport> Engine<T> {
    /// Wrap an open transport
    pub fn new(transport: T, status_check: StatusCheck) -> Self {
        Self {
            transport,
            flag: 0,
            status_check,
            buf: Vec::with_capacity(BLOCK_SIZE),
        }
    }

    /// Set the mode flag carried in every command frame
    pub fn with_flag(mut self, flag: u8) -> Self {
        self.flag = flag;
        self
    }

    /// Access the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport
    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }

    /// Frame for `cmd` carrying this engine's mode flag
    pub fn frame(&self, cmd: Command) -> CommandFrame {
        CommandFrame::new(cmd).with_flag(self.flag)
    }

    /// Send a command frame
    pub fn send_frame(&mut self, frame: &CommandFrame) -> Result<()> {
        log::trace!(
            "CBW opcode=0x{:08x} offset=0x{:08x} length=0x{:x}",
            frame.opcode,
            frame.offset,
            frame.length
        );
        send_all(&mut self.transport, &frame.encode())
    }

    /// Receive the status wrapper for `frame` and apply the status policy
    pub fn recv_status(&mut self, frame: &CommandFrame) -> Result<()> {
        let mut csw = [0u8; CSW_LEN];
        let n = self.transport.bulk_recv(&mut csw)?;
        self.status_check.apply(frame, &csw[..n])
    }

    /// Run a command without a data stage
    pub fn simple(&mut self, cmd: Command) -> Result<()> {
        let frame = self.frame(cmd);
        self.send_frame(&frame)?;
        self.recv_status(&frame)
    }

    /// Run a read command with a fixed-size reply
    pub fn query(&mut self, cmd: Command, len: usize) -> Result<Vec<u8>> {
        let frame = self.frame(cmd);
        self.send_frame(&frame)?;
        let mut reply = vec![0u8; len];
        recv_exact(&mut self.transport, &mut reply)?;
        self.recv_status(&frame)?;
        Ok(reply)
    }

    /// Jump to the kernel at `kernel` with parameters at `params`
    ///
    /// Both are absolute SDRAM addresses.
    pub fn exec(&mut self, kernel: u32, params: u32) -> Result<()> {
        let frame = self
            .frame(Command::ExecuteSdram)
            .with_offset(kernel.wrapping_sub(SDRAM_BASE_ADDRESS))
            .with_length(params.wrapping_sub(SDRAM_BASE_ADDRESS));
        self.send_frame(&frame)?;
        self.recv_status(&frame)
    }

    /// Read `count` units starting at `offset` into `output`
    ///
    /// Returns the number of bytes forwarded.
    pub fn read_loop(
        &mut self,
        kind: &TransferKind,
        offset: u32,
        count: u32,
        output: &mut dyn Write,
        progress: &mut dyn TransferProgress,
    ) -> Result<u64> {
        progress.start(kind.name, count as u64 * kind.unit_size as u64);
        let result = self.read_windows(kind, offset, count, output, progress);
        progress.finish();

        let done = result?;
        output.flush().map_err(|source| Error::Output {
            transferred: done,
            source,
        })?;
        Ok(done)
    }

    fn read_windows(
        &mut self,
        kind: &TransferKind,
        mut offset: u32,
        mut count: u32,
        output: &mut dyn Write,
        progress: &mut dyn TransferProgress,
    ) -> Result<u64> {
        let mut done = 0u64;
        while count > 0 {
            let units = count.min(kind.read_window);
            let bytes = units as usize * kind.unit_size;
            log::debug!("reading {} at offset 0x{:08x}", kind.name, offset);

            let frame = self
                .frame(kind.read)
                .with_offset(offset.wrapping_sub(kind.base))
                .with_length(units);
            self.send_frame(&frame)?;
            self.buf.resize(bytes, 0);
            recv_exact(&mut self.transport, &mut self.buf)?;
            self.recv_status(&frame)?;

            output.write_all(&self.buf).map_err(|source| Error::Output {
                transferred: done,
                source,
            })?;

            done += bytes as u64;
            offset = offset.wrapping_add(units);
            count -= units;
            progress.window(offset, done);
        }
        Ok(done)
    }

    /// Write `count` units starting at `offset` from `input`
    ///
    /// A short read from `input` ends the loop after padding and writing
    /// whatever partial window it produced.
    pub fn write_loop(
        &mut self,
        kind: &TransferKind,
        offset: u32,
        count: u32,
        input: &mut dyn Read,
        progress: &mut dyn TransferProgress,
    ) -> Result<WriteOutcome> {
        progress.start(kind.name, count as u64 * kind.unit_size as u64);
        let result = self.write_windows(kind, offset, count, input, progress);
        progress.finish();

        let written = result?;
        if written < count {
            log::info!("premature end of input");
            Ok(WriteOutcome::Exhausted {
                written,
                remaining: count - written,
            })
        } else {
            Ok(WriteOutcome::Complete)
        }
    }

    /// Returns the number of units written
    fn write_windows(
        &mut self,
        kind: &TransferKind,
        mut offset: u32,
        mut count: u32,
        input: &mut dyn Read,
        progress: &mut dyn TransferProgress,
    ) -> Result<u32> {
        let mut written = 0u32;
        let mut done = 0u64;
        while count > 0 {
            let units = count.min(kind.write_window);
            let wanted = units as usize * kind.data_size;
            let mut data = vec![FILL_BYTE; wanted];
            let got = fill_from(input, &mut data)?;
            if got == 0 {
                break;
            }

            let units = got.div_ceil(kind.data_size) as u32;
            self.buf.clear();
            if kind.unit_size == kind.data_size {
                self.buf
                    .extend_from_slice(&data[..units as usize * kind.data_size]);
            } else {
                for chunk in data.chunks(kind.data_size).take(units as usize) {
                    self.buf.extend_from_slice(chunk);
                    self.buf
                        .resize(self.buf.len() + kind.unit_size - kind.data_size, FILL_BYTE);
                }
            }
            log::debug!("writing {} at offset 0x{:08x}", kind.name, offset);

            let frame = self
                .frame(kind.write)
                .with_offset(offset.wrapping_sub(kind.base))
                .with_length(units);
            self.send_frame(&frame)?;
            send_all(&mut self.transport, &self.buf)?;
            self.recv_status(&frame)?;

            done += self.buf.len() as u64;
            written += units;
            offset = offset.wrapping_add(units);
            count -= units;
            progress.window(offset, done);

            if got < wanted {
                break;
            }
        }
        Ok(written)
    }

    /// Fill `count` flash sectors at `offset` with [`FILL_BYTE`]
    pub fn erase(
        &mut self,
        offset: u32,
        count: u32,
        progress: &mut dyn TransferProgress,
    ) -> Result<()> {
        let kind = TransferKind {
            name: "erase",
            ..TransferKind::FLASH
        };
        self.write_loop(&kind, offset, count, &mut io::repeat(FILL_BYTE), progress)
            .map(|_| ())
    }
}

/// Send `data` in one bulk transfer, failing on a short send
pub(crate) fn send_all<T: Transport + ?Sized>(transport: &mut T, data: &[u8]) -> Result<()> {
    let n = transport.bulk_send(data)?;
    if n != data.len() {
        return Err(Error::ShortTransfer {
            expected: data.len(),
            actual: n,
        });
    }
    Ok(())
}

/// Receive exactly `buf.len()` bytes
pub(crate) fn recv_exact<T: Transport + ?Sized>(transport: &mut T, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = transport.bulk_recv(&mut buf[filled..])?;
        if n == 0 {
            return Err(Error::ShortTransfer {
                expected: buf.len(),
                actual: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

/// Read from `input` until `buf` is full or the input ends
pub(crate) fn fill_from(input: &mut dyn Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Input(e)),
        }
    }
    Ok(filled)
}
