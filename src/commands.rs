//! Command implementations on top of a rockusb session

use std::io::{self, BufWriter, Read, Write};

use rkflasher_core::session::{
    Action, LoaderStage, Outcome, Report, Session, SessionConfig, Streams,
};
use rkflasher_core::transfer::{NoProgress, TransferProgress};
use rkflasher_core::Transport;

use crate::cli::Commands;
use crate::progress::IndicatifProgress;

/// Translate a parsed subcommand into a session action
///
/// Returns `Ok(None)` for commands that do not talk to a device.
pub fn action_for(command: &Commands) -> Result<Option<Action>, String> {
    let action = match command {
        Commands::Reboot { flag } => Action::Reboot { flag: *flag },
        Commands::LoadDdr => Action::LoadLoader(LoaderStage::DdrInit),
        Commands::LoadLoader => Action::LoadLoader(LoaderStage::UsbLoader),
        Commands::Version => Action::ChipVersion,
        Commands::NandInfo => Action::NandInfo,
        Commands::ReadIdb(e) => Action::ReadIdb {
            offset: e.offset,
            count: e.count,
        },
        Commands::WriteIdb(e) => Action::WriteIdb {
            offset: e.offset,
            count: e.count,
        },
        Commands::ReadRam(e) => Action::ReadRam {
            address: e.offset,
            length: e.count,
        },
        Commands::WriteRam(e) => Action::WriteRam {
            address: e.offset,
            length: e.count,
        },
        Commands::ExecRam { kernel, params } => Action::ExecRam {
            kernel: *kernel,
            params: *params,
        },
        Commands::Read(t) => Action::ReadFlash(t.resolve()?),
        Commands::Write(t) => Action::WriteFlash(t.resolve()?),
        Commands::Erase(t) => Action::Erase(t.resolve()?),
        Commands::ReadParams => Action::ReadParams,
        Commands::WriteParams => Action::WriteParams,
        Commands::ListDevices => return Ok(None),
    };
    Ok(Some(action))
}

/// Run `action` against `transport` with the given streams
pub fn run_session<T: Transport>(
    transport: T,
    action: Action,
    config: SessionConfig,
    input: &mut dyn Read,
    output: &mut dyn Write,
    progress: &mut dyn TransferProgress,
) -> rkflasher_core::Result<Report> {
    log::debug!("running {:?}", action);
    Session::new(transport, action, config).run(Streams::new(input, output, progress))
}

/// Run `action` with stdin/stdout as payload streams and report the result
pub fn run_action<T: Transport>(
    transport: T,
    action: Action,
    config: SessionConfig,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut input = stdin.lock();
    let mut output = BufWriter::new(stdout.lock());

    let mut bars = IndicatifProgress::new();
    let mut silent = NoProgress;
    let progress: &mut dyn TransferProgress = if quiet { &mut silent } else { &mut bars };

    let report = run_session(transport, action, config, &mut input, &mut output, progress)?;
    output.flush()?;

    print_report(&report);
    Ok(())
}

/// Print the human-readable part of a session result on stderr
pub fn print_report(report: &Report) {
    match report {
        Report::Aborted(e) => log::error!("{}", e),
        Report::Done(outcome) => match outcome {
            Outcome::Completed => log::debug!("done"),
            Outcome::InputExhausted { written, remaining } => {
                log::info!("premature end-of-file reached ({} written, {} left)", written, remaining)
            }
            Outcome::ChipVersion(version) => eprintln!("chip version: {}", version),
            Outcome::NandInfo { flash_id, info } => {
                eprintln!("Flash ID: {}", flash_id);
                eprintln!("{}", info);
            }
            Outcome::Uploaded { bytes, crc } => {
                log::info!("uploaded {} bytes (crc 0x{:04x})", bytes, crc)
            }
        },
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::cli::{Extent, TargetArgs};
    use rkflasher_core::partition::PartitionError;
    use rkflasher_core::session::FlashTarget;
    use rkflasher_dummy::DummyDevice;

    fn run(device: &mut DummyDevice, action: Action, input: &[u8]) -> (Report, Vec<u8>) {
        let mut input = input;
        let mut output = Vec::new();
        let config = SessionConfig {
            settle: std::time::Duration::ZERO,
            ..SessionConfig::default()
        };
        let report = run_session(device, action, config, &mut input, &mut output, &mut NoProgress)
            .unwrap();
        (report, output)
    }

    #[test]
    fn test_action_mapping() {
        let extent = Extent {
            offset: 0x60000000,
            count: 0x100,
        };
        assert_eq!(
            action_for(&Commands::WriteRam(extent)).unwrap(),
            Some(Action::WriteRam {
                address: 0x60000000,
                length: 0x100
            })
        );
        assert_eq!(
            action_for(&Commands::LoadDdr).unwrap(),
            Some(Action::LoadLoader(LoaderStage::DdrInit))
        );
        assert_eq!(action_for(&Commands::ListDevices).unwrap(), None);

        let target = TargetArgs {
            target: vec!["0x10".into(), "boot".into()],
        };
        assert!(action_for(&Commands::Read(target)).is_err());
    }

    #[test]
    fn test_ram_round_trip_on_dummy() {
        let mut device = DummyDevice::new_default();
        let payload: Vec<u8> = (0..=255u8).collect();

        let (report, _) = run(
            &mut device,
            Action::WriteRam {
                address: 0x60000100,
                length: 256,
            },
            &payload,
        );
        assert_eq!(report, Report::Done(Outcome::Completed));

        let (report, output) = run(
            &mut device,
            Action::ReadRam {
                address: 0x60000100,
                length: 256,
            },
            &[],
        );
        assert_eq!(report, Report::Done(Outcome::Completed));
        assert_eq!(output, payload);
    }

    #[test]
    fn test_missing_partition_table_aborts() {
        let mut device =
            DummyDevice::with_parameters(Default::default(), "console=ttyS2 root=/dev/mmcblk0p7")
                .unwrap();
        let before = device.flash().to_vec();
        let (report, output) = run(
            &mut device,
            Action::Erase(FlashTarget::partition("boot")),
            &[],
        );
        assert_eq!(report, Report::Aborted(PartitionError::TableNotFound));
        assert!(output.is_empty());
        assert_eq!(device.flash(), &before[..]);
    }
}
