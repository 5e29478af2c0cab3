//! rkflasher-usb - rockusb transport over USB
//!
//! Finds a Rockchip device (vendor 0x2207) with a known product ID, claims
//! interface 0 (detaching a kernel driver if one is bound) and exposes the
//! bulk endpoints 0x01/0x81 and vendor control transfers through
//! [`rkflasher_core::Transport`].
//!
//! # Configuration Options
//!
//! - `index=N` or `device=N`: Select the Nth matching device (0-indexed)
//! - `pid=XXXX`: Only accept this product ID (hex); also allows product IDs
//!   missing from the built-in table
//! - `timeout=MS`: Per-transfer timeout in milliseconds, 0 waits forever
//!
//! # Example
//!
//! ```no_run
//! use rkflasher_usb::{parse_options, RockusbDevice};
//!
//! let config = parse_options(&[("pid", "320a")])?;
//! let device = RockusbDevice::open_with_config(config)?;
//! println!("{:?}", device.info());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;
mod protocol;

pub use device::{parse_options, RockusbDevice, RockusbDeviceInfo, UsbConfig};
pub use error::{Result, UsbError};
pub use protocol::{chip_name, PRODUCTS, ROCKCHIP_VENDOR_ID};
