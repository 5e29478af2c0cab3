//! rkflasher-core - Rockusb bootloader protocol library
//!
//! This crate implements the host side of the Rockchip "rockusb" bootloader
//! protocol: a 31-byte command wrapper sent over a bulk OUT endpoint, data
//! stages on the bulk endpoints, and a 13-byte status wrapper read back from
//! the bulk IN endpoint. Mask ROM code upload uses vendor control transfers
//! instead.
//!
//! The crate never touches USB directly. Everything talks to a
//! [`Transport`](transport::Transport), which is implemented by
//! `rkflasher-usb` for real hardware and by `rkflasher-dummy` for testing.
//!
//! # Layers
//!
//! - [`crc`] - the two checksums used by the loader upload and parameter block
//! - [`protocol`] - command catalog, command/status frame codec
//! - [`info`] - decoding of the NAND info, flash ID and chip version replies
//! - [`param`] - parameter block encode/decode
//! - [`partition`] - `mtdparts=` partition lookup
//! - [`transfer`] - windowed block transfer engine
//! - [`session`] - the per-invocation state machine
//!
//! # Example
//!
//! ```ignore
//! use rkflasher_core::session::{Action, FlashTarget, Session, SessionConfig, Streams};
//!
//! let session = Session::new(transport, Action::ReadFlash(FlashTarget::partition("boot")), SessionConfig::default());
//! let report = session.run(Streams::new(&mut stdin, &mut stdout, &mut progress))?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod crc;
pub mod error;
pub mod info;
pub mod param;
pub mod partition;
pub mod protocol;
pub mod session;
pub mod transfer;
pub mod transport;

pub use error::{Error, Result};
pub use transport::Transport;
