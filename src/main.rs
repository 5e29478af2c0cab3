//! rkflasher - Rockchip flashing tool
//!
//! Talks to Rockchip SoCs in rockusb (bootloader) or mask ROM mode and
//! reads or writes NAND/eMMC flash, the ID block, SDRAM and the parameter
//! block. Payloads stream through stdin and stdout, everything meant for a
//! human goes to stderr.
//!
//! # Architecture
//!
//! - `rkflasher-core` holds the protocol, the transfer engine and the
//!   per-invocation session state machine
//! - `rkflasher-usb` is the real transport (nusb)
//! - `rkflasher-dummy` is an in-memory bootloader for testing without
//!   hardware
//!
//! This binary only parses arguments, opens the selected device and hands
//! one action to a session.

mod cli;
mod commands;
mod devices;
mod progress;

use std::process::ExitCode;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::Parser;
use cli::{Cli, Commands};
use rkflasher_core::session::SessionConfig;

/// Default log filter for a `-v` count; `RUST_LOG` still takes precedence
fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.verbose)),
    )
    .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::ListDevices = cli.command {
        return devices::list_devices();
    }

    let Some(action) = commands::action_for(&cli.command)? else {
        return Ok(());
    };

    let config = SessionConfig {
        settle: Duration::from_millis(cli.settle_ms),
        status_check: cli.status_check,
    };

    let transport = devices::open_device(&cli.device)?;
    commands::run_action(transport, action, config, cli.quiet)
}
