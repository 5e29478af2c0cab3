//! Transport abstraction
//!
//! A [`Transport`] moves raw bytes to and from an opened, claimed bootloader
//! interface. Device discovery and claiming happen when the transport is
//! constructed; the session only ever sees an open handle.

use crate::error::Result;

/// Byte-level access to a rockusb device
pub trait Transport {
    /// Send `data` on the bulk OUT endpoint, returning the bytes accepted
    fn bulk_send(&mut self, data: &[u8]) -> Result<usize>;

    /// Receive up to `buf.len()` bytes from the bulk IN endpoint
    fn bulk_recv(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Vendor control transfer (device recipient, value 0) carrying `data`
    fn control_send(&mut self, request: u8, index: u16, data: &[u8]) -> Result<usize>;

    /// Release the interface
    ///
    /// Called exactly once at the end of every session.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn bulk_send(&mut self, data: &[u8]) -> Result<usize> {
        (**self).bulk_send(data)
    }

    fn bulk_recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).bulk_recv(buf)
    }

    fn control_send(&mut self, request: u8, index: u16, data: &[u8]) -> Result<usize> {
        (**self).control_send(request, index, data)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn bulk_send(&mut self, data: &[u8]) -> Result<usize> {
        (**self).bulk_send(data)
    }

    fn bulk_recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).bulk_recv(buf)
    }

    fn control_send(&mut self, request: u8, index: u16, data: &[u8]) -> Result<usize> {
        (**self).control_send(request, index, data)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
