//! CLI argument parsing

use crate::devices;
use clap::{Parser, Subcommand};
use rkflasher_core::protocol::StatusCheck;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let value = parse_hex_u32(s)?;
    u8::try_from(value).map_err(|_| format!("Value out of range: {}", s))
}

fn parse_status_check(s: &str) -> Result<StatusCheck, String> {
    s.parse().map_err(|e: rkflasher_core::Error| e.to_string())
}

/// Generate dynamic help text for the device argument
fn device_help() -> String {
    format!(
        "Device to use, as name[:key=value,...] [available: {}]",
        devices::device_names_short()
    )
}

#[derive(Parser, Debug)]
#[command(name = "rkflasher")]
#[command(author, version, about = "Rockchip rockusb flashing tool", long_about = None)]
#[command(after_help = "Payloads are read from stdin and written to stdout.\n\
    Offsets and sizes are in sectors for flash and IDB, bytes for RAM.")]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[arg(short, long, global = true, default_value = "usb", help = device_help())]
    pub device: String,

    /// How to treat bad status replies: ignore, warn or strict
    #[arg(long, global = true, default_value = "warn", value_parser = parse_status_check)]
    pub status_check: StatusCheck,

    /// Delay after the readiness probe, in milliseconds
    #[arg(long, global = true, default_value_t = 20)]
    pub settle_ms: u64,

    #[command(subcommand)]
    pub command: Commands,
}

/// Start/count pair
#[derive(clap::Args, Debug, Clone, Copy)]
pub struct Extent {
    /// Start (hex with 0x prefix, or decimal)
    #[arg(value_parser = parse_hex_u32)]
    pub offset: u32,

    /// Count (hex with 0x prefix, or decimal)
    #[arg(value_parser = parse_hex_u32)]
    pub count: u32,
}

/// Flash target: a partition name or an offset/count pair
#[derive(clap::Args, Debug, Clone)]
pub struct TargetArgs {
    /// PARTITION, or OFFSET COUNT in sectors
    #[arg(required = true, num_args = 1..=2, value_name = "PARTITION | OFFSET COUNT")]
    pub target: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reboot the device
    #[command(visible_alias = "b")]
    Reboot {
        /// Reboot mode flag
        #[arg(value_parser = parse_hex_u8, default_value = "0")]
        flag: u8,
    },

    /// Load a DDR init blob in mask ROM mode
    #[command(visible_alias = "l")]
    LoadDdr,

    /// Load a USB loader in mask ROM mode
    #[command(visible_alias = "L")]
    LoadLoader,

    /// Show the chip version
    #[command(visible_alias = "v")]
    Version,

    /// Show the flash ID and NAND info
    #[command(visible_alias = "n")]
    NandInfo,

    /// Read ID block sectors (0x210 bytes each)
    #[command(visible_alias = "i")]
    ReadIdb(Extent),

    /// Write ID block sectors (0x200 bytes each from input)
    #[command(visible_alias = "j")]
    WriteIdb(Extent),

    /// Read SDRAM
    #[command(visible_alias = "m")]
    ReadRam(Extent),

    /// Write SDRAM
    #[command(visible_alias = "M")]
    WriteRam(Extent),

    /// Boot a kernel from SDRAM
    #[command(visible_alias = "B")]
    ExecRam {
        /// Kernel address
        #[arg(value_parser = parse_hex_u32)]
        kernel: u32,

        /// Parameter address
        #[arg(value_parser = parse_hex_u32)]
        params: u32,
    },

    /// Read flash
    #[command(visible_alias = "r")]
    Read(TargetArgs),

    /// Write flash
    #[command(visible_alias = "w")]
    Write(TargetArgs),

    /// Erase flash
    #[command(visible_alias = "e")]
    Erase(TargetArgs),

    /// Read the parameter block
    #[command(visible_alias = "p")]
    ReadParams,

    /// Write the parameter block
    #[command(visible_alias = "P")]
    WriteParams,

    /// List supported devices and connected Rockchip boards
    ListDevices,
}

impl TargetArgs {
    /// Turn the raw arguments into a partition name or a sector range
    pub fn resolve(&self) -> Result<rkflasher_core::session::FlashTarget, String> {
        use rkflasher_core::session::FlashTarget;

        match self.target.as_slice() {
            [name] => Ok(FlashTarget::Partition(name.clone())),
            [offset, count] => Ok(FlashTarget::Range {
                offset: parse_hex_u32(offset)?,
                count: parse_hex_u32(count)?,
            }),
            _ => Err("expected a partition name or an offset and a count".into()),
        }
    }
}
