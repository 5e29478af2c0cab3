//! Command and status wrapper codec
//!
//! CBW layout (31 bytes):
//!
//! | Bytes  | Field                                         |
//! |--------|-----------------------------------------------|
//! | 0..4   | signature `USBC`                              |
//! | 4..8   | tag, big-endian                               |
//! | 12..16 | opcode, big-endian                            |
//! | 16     | mode flag (reboot mode)                       |
//! | 17..21 | offset, big-endian                            |
//! | 22..24 | length, big-endian (22..26 for exec)          |
//!
//! Zero-valued fields are simply left as zero. CSW layout (13 bytes):
//! signature `USBS`, tag echo, little-endian residue, status byte.

use std::str::FromStr;

use crate::error::{Error, Result};

use super::{Command, FrameFields};

/// Length of a command block wrapper
pub const CBW_LEN: usize = 31;

/// Length of a command status wrapper
pub const CSW_LEN: usize = 13;

const CBW_SIGNATURE: &[u8; 4] = b"USBC";
const CSW_SIGNATURE: &[u8; 4] = b"USBS";

const TAG_OFFSET: usize = 4;
const OPCODE_OFFSET: usize = 12;
const FLAG_OFFSET: usize = 16;
const ADDR_OFFSET: usize = 17;
const LENGTH_OFFSET: usize = 22;

/// An outbound command block wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    /// Random nonce echoed back in the status wrapper
    pub tag: u32,
    /// Command opcode
    pub opcode: u32,
    /// Sector, byte or kernel address, depending on the command
    pub offset: u32,
    /// Transfer length; for `ExecuteSdram` the parameter address
    pub length: u32,
    /// Mode flag (only meaningful for reboot)
    pub flag: u8,
}

impl CommandFrame {
    /// Create a frame for `cmd` with a fresh random tag
    pub fn new(cmd: Command) -> Self {
        Self {
            tag: rand::random(),
            opcode: cmd.opcode(),
            offset: 0,
            length: 0,
            flag: 0,
        }
    }

    /// Set the offset field
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Set the length field
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    /// Set the mode flag
    pub fn with_flag(mut self, flag: u8) -> Self {
        self.flag = flag;
        self
    }

    /// The catalogued command for this frame's opcode, if any
    pub fn command(&self) -> Option<Command> {
        Command::from_opcode(self.opcode)
    }

    fn wide_length(opcode: u32) -> bool {
        matches!(
            Command::from_opcode(opcode).map(Command::fields),
            Some(FrameFields::OffsetAddress)
        )
    }

    /// Encode the wrapper
    ///
    /// No range checking is done: a length that does not fit the 16-bit field
    /// is truncated.
    pub fn encode(&self) -> [u8; CBW_LEN] {
        let mut cbw = [0u8; CBW_LEN];
        cbw[..4].copy_from_slice(CBW_SIGNATURE);

        if self.tag != 0 {
            cbw[TAG_OFFSET..TAG_OFFSET + 4].copy_from_slice(&self.tag.to_be_bytes());
        }
        if self.offset != 0 {
            cbw[ADDR_OFFSET..ADDR_OFFSET + 4].copy_from_slice(&self.offset.to_be_bytes());
        }
        if self.length != 0 {
            if Self::wide_length(self.opcode) {
                cbw[LENGTH_OFFSET..LENGTH_OFFSET + 4].copy_from_slice(&self.length.to_be_bytes());
            } else {
                cbw[LENGTH_OFFSET..LENGTH_OFFSET + 2]
                    .copy_from_slice(&(self.length as u16).to_be_bytes());
            }
        }
        if self.opcode != 0 {
            cbw[OPCODE_OFFSET..OPCODE_OFFSET + 4].copy_from_slice(&self.opcode.to_be_bytes());
        }
        if self.flag != 0 {
            cbw[FLAG_OFFSET] = self.flag;
        }

        cbw
    }

    /// Decode a wrapper received by a device
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < CBW_LEN {
            return Err(Error::Protocol(format!(
                "command wrapper too short: {} bytes",
                data.len()
            )));
        }
        if &data[..4] != CBW_SIGNATURE {
            return Err(Error::Protocol("bad command wrapper signature".into()));
        }

        let be32 = |at: usize| u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let opcode = be32(OPCODE_OFFSET);
        let length = if Self::wide_length(opcode) {
            be32(LENGTH_OFFSET)
        } else {
            u16::from_be_bytes([data[LENGTH_OFFSET], data[LENGTH_OFFSET + 1]]) as u32
        };

        Ok(Self {
            tag: be32(TAG_OFFSET),
            opcode,
            offset: be32(ADDR_OFFSET),
            length,
            flag: data[FLAG_OFFSET],
        })
    }
}

/// A command status wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFrame {
    /// Tag echoed from the command
    pub tag: u32,
    /// Bytes not transferred
    pub residue: u32,
    /// Status byte (0 = success)
    pub status: u8,
}

impl StatusFrame {
    /// Status wrapper answering `frame`
    pub fn reply(frame: &CommandFrame, status: u8) -> Self {
        Self {
            tag: frame.tag,
            residue: 0,
            status,
        }
    }

    /// Encode the wrapper
    pub fn encode(&self) -> [u8; CSW_LEN] {
        let mut csw = [0u8; CSW_LEN];
        csw[..4].copy_from_slice(CSW_SIGNATURE);
        csw[4..8].copy_from_slice(&self.tag.to_be_bytes());
        csw[8..12].copy_from_slice(&self.residue.to_le_bytes());
        csw[12] = self.status;
        csw
    }

    /// Parse a received wrapper
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CSW_LEN {
            return Err(Error::Protocol(format!(
                "status wrapper too short: {} bytes",
                data.len()
            )));
        }
        if &data[..4] != CSW_SIGNATURE {
            return Err(Error::Protocol("bad status wrapper signature".into()));
        }
        Ok(Self {
            tag: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            residue: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            status: data[12],
        })
    }

    /// Check that this wrapper answers `frame` successfully
    pub fn verify(&self, frame: &CommandFrame) -> Result<()> {
        if self.tag != frame.tag {
            return Err(Error::Protocol(format!(
                "status tag 0x{:08x} does not match command tag 0x{:08x}",
                self.tag, frame.tag
            )));
        }
        if self.status != 0 {
            return Err(Error::Protocol(format!(
                "command 0x{:08x} failed with status {}",
                frame.opcode, self.status
            )));
        }
        Ok(())
    }
}

/// How strictly status wrappers are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusCheck {
    /// Receive and discard
    Ignore,
    /// Log a warning on a bad signature, tag mismatch or failure status
    #[default]
    Warn,
    /// Fail the operation on a bad signature, tag mismatch or failure status
    Strict,
}

impl FromStr for StatusCheck {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" | "off" => Ok(StatusCheck::Ignore),
            "warn" => Ok(StatusCheck::Warn),
            "strict" => Ok(StatusCheck::Strict),
            _ => Err(Error::InvalidArgument(format!("status check mode: {}", s))),
        }
    }
}

impl StatusCheck {
    /// Apply this policy to a received status wrapper
    pub fn apply(self, frame: &CommandFrame, received: &[u8]) -> Result<()> {
        if self == StatusCheck::Ignore {
            return Ok(());
        }
        let result = StatusFrame::parse(received).and_then(|csw| csw.verify(frame));
        match (self, result) {
            (_, Ok(())) => Ok(()),
            (StatusCheck::Strict, Err(e)) => Err(e),
            (_, Err(e)) => {
                log::warn!("{}", e);
                Ok(())
            }
        }
    }
}
