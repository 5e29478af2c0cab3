//! Error types for rkflasher-core
//!
//! Every variant of [`Error`] is fatal for the current invocation. Partition
//! lookup failures are not errors in this sense: they abort the operation
//! without touching the device and are reported through
//! [`PartitionError`](crate::partition::PartitionError) instead.

use std::io;

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// A transport call failed
    #[error("USB transfer failed: {0}")]
    Transport(String),

    /// The transport moved fewer bytes than requested
    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        /// Bytes requested
        expected: usize,
        /// Bytes actually moved
        actual: usize,
    },

    /// The device answered with something that is not a valid reply
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Parameter block length is outside `0..=MAX_PARAM_LENGTH`
    #[error("bad parameter length: {length} (maximum {max})")]
    LengthViolation {
        /// Length found in the header or supplied by the caller
        length: usize,
        /// Largest allowed length
        max: usize,
    },

    /// Parameter block CRC does not match its payload
    #[error("bad CRC! ({stored:#x}, should be {computed:#x})")]
    Integrity {
        /// CRC stored in the block
        stored: u32,
        /// CRC computed over the payload
        computed: u32,
    },

    /// Reading the input stream failed
    #[error("read error: {0}")]
    Input(#[source] io::Error),

    /// Writing the output stream failed
    #[error("write error after {transferred} bytes (disk full?): {source}")]
    Output {
        /// Bytes successfully forwarded before the failure
        transferred: u64,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A caller-supplied value cannot be encoded
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;
