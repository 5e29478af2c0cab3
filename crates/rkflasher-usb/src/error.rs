//! Error types for the USB transport

use thiserror::Error;

/// Result type for USB operations
pub type Result<T> = std::result::Result<T, UsbError>;

/// Errors that can occur when talking to a rockusb device
#[derive(Debug, Error)]
pub enum UsbError {
    /// No matching device on the bus
    #[error("cannot open device: no Rockchip device (VID:2207) found")]
    DeviceNotFound,

    /// Enumeration or open failed
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// The interface is held by someone else
    #[error("cannot claim interface (busy?): {0}")]
    ClaimFailed(String),

    /// A bulk or control transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// The transport was used after close
    #[error("device already closed")]
    Closed,

    /// Bad device option
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<UsbError> for rkflasher_core::Error {
    fn from(e: UsbError) -> Self {
        rkflasher_core::Error::Transport(e.to_string())
    }
}

impl From<nusb::Error> for UsbError {
    fn from(e: nusb::Error) -> Self {
        UsbError::TransferFailed(e.to_string())
    }
}
