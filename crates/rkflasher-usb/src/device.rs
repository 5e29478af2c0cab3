//! Rockusb device over nusb

use std::time::Duration;

use nusb::transfer::{Buffer, Bulk, ControlOut, ControlType, In, Out, Recipient};
use nusb::{DeviceInfo, Endpoint, Interface, MaybeFuture};
use rkflasher_core::{Result as CoreResult, Transport};

use crate::error::{Result, UsbError};
use crate::protocol::*;

/// Stand-in for "no timeout"; nusb always wants a deadline
const FOREVER: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration options for opening a rockusb device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbConfig {
    /// Index among the matching devices
    pub device_index: usize,
    /// Only accept this product ID (any known Rockchip product otherwise)
    pub product_id: Option<u16>,
    /// Per-transfer timeout; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            product_id: None,
            timeout: timeout_from_ms(DEFAULT_TIMEOUT_MS),
        }
    }
}

fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Parse options from key=value pairs
pub fn parse_options(options: &[(&str, &str)]) -> Result<UsbConfig> {
    let mut config = UsbConfig::default();

    for (key, value) in options {
        match *key {
            "device" | "index" => {
                config.device_index = value
                    .parse()
                    .map_err(|_| UsbError::InvalidParameter(format!("index: {}", value)))?;
            }
            "pid" => {
                config.product_id = Some(
                    parse_product_id(value)
                        .ok_or_else(|| UsbError::InvalidParameter(format!("pid: {}", value)))?,
                );
            }
            "timeout" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| UsbError::InvalidParameter(format!("timeout: {}", value)))?;
                config.timeout = timeout_from_ms(ms);
            }
            _ => {
                return Err(UsbError::InvalidParameter(format!(
                    "unknown option: {}",
                    key
                )));
            }
        }
    }

    Ok(config)
}

/// Summary of a device found on the bus
#[derive(Debug, Clone)]
pub struct RockusbDeviceInfo {
    /// Bus identifier
    pub bus: String,
    /// Device address
    pub address: u8,
    /// USB product ID
    pub product_id: u16,
    /// SoC name, if the product ID is known
    pub chip: Option<&'static str>,
    /// Whether the device is running the mask ROM loader
    pub mask_rom: bool,
}

impl From<&DeviceInfo> for RockusbDeviceInfo {
    fn from(d: &DeviceInfo) -> Self {
        Self {
            bus: d.bus_id().to_string(),
            address: d.device_address(),
            product_id: d.product_id(),
            chip: chip_name(d.product_id()),
            mask_rom: d.usb_version() == MASK_ROM_USB_VERSION,
        }
    }
}

struct Handles {
    // endpoints must go before the interface they were opened on
    ep_in: Endpoint<Bulk, In>,
    ep_out: Endpoint<Bulk, Out>,
    interface: Interface,
}

/// A claimed rockusb interface
pub struct RockusbDevice {
    handles: Option<Handles>,
    info: RockusbDeviceInfo,
    timeout: Duration,
}

impl RockusbDevice {
    /// Open the first Rockchip device in rockusb mode
    pub fn open() -> Result<Self> {
        Self::open_with_config(UsbConfig::default())
    }

    /// Open a device with the specified configuration
    pub fn open_with_config(config: UsbConfig) -> Result<Self> {
        let devices: Vec<_> = nusb::list_devices()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?
            .filter(|d| is_candidate(d.vendor_id(), d.product_id(), config.product_id))
            .collect();

        let device_info = devices
            .get(config.device_index)
            .ok_or(UsbError::DeviceNotFound)?;

        Self::try_open_device(device_info, &config)
    }

    fn try_open_device(device_info: &DeviceInfo, config: &UsbConfig) -> Result<Self> {
        let info = RockusbDeviceInfo::from(device_info);
        match info.chip {
            Some(chip) => log::info!(
                "Detected {} (bus {} address {})",
                chip,
                info.bus,
                info.address
            ),
            None => log::info!(
                "Detected unknown Rockchip device 0x{:04x} (bus {} address {})",
                info.product_id,
                info.bus,
                info.address
            ),
        }
        if info.mask_rom {
            log::info!("Device is in MASK ROM MODE");
        }

        let device = device_info
            .open()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?;
        let interface = device
            .detach_and_claim_interface(INTERFACE)
            .wait()
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;
        log::debug!("interface claimed");

        let ep_in = interface
            .endpoint::<Bulk, In>(BULK_IN_EP)
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;
        let ep_out = interface
            .endpoint::<Bulk, Out>(BULK_OUT_EP)
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        Ok(Self {
            handles: Some(Handles {
                ep_in,
                ep_out,
                interface,
            }),
            info,
            timeout: config.timeout.unwrap_or(FOREVER),
        })
    }

    /// List connected Rockchip devices
    pub fn list_devices() -> Result<Vec<RockusbDeviceInfo>> {
        let devices = nusb::list_devices()
            .wait()
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?
            .filter(|d| is_candidate(d.vendor_id(), d.product_id(), None))
            .map(|d| RockusbDeviceInfo::from(&d))
            .collect();
        Ok(devices)
    }

    /// Information about the opened device
    pub fn info(&self) -> &RockusbDeviceInfo {
        &self.info
    }

    fn handles(&mut self) -> Result<&mut Handles> {
        self.handles.as_mut().ok_or(UsbError::Closed)
    }

    fn bulk_write(&mut self, data: &[u8]) -> Result<usize> {
        let timeout = self.timeout;
        let ep = &mut self.handles()?.ep_out;

        let mut buf = Buffer::new(data.len());
        buf.extend_from_slice(data);

        ep.transfer_blocking(buf, timeout)
            .into_result()
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;
        Ok(data.len())
    }

    fn bulk_read(&mut self, out: &mut [u8]) -> Result<usize> {
        let timeout = self.timeout;
        let ep = &mut self.handles()?.ep_in;

        let max_packet_size = ep.max_packet_size();
        let request_len = out.len().div_ceil(max_packet_size) * max_packet_size;
        let mut buf = Buffer::new(request_len);
        buf.set_requested_len(request_len);

        let data = ep
            .transfer_blocking(buf, timeout)
            .into_result()
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        let len = data.len().min(out.len());
        out[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn control_write(&mut self, request: u8, index: u16, data: &[u8]) -> Result<usize> {
        let timeout = self.timeout;
        self.handles()?
            .interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value: 0,
                    index,
                    data,
                },
                timeout,
            )
            .wait()
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;
        Ok(data.len())
    }
}

fn is_candidate(vendor_id: u16, product_id: u16, wanted: Option<u16>) -> bool {
    vendor_id == ROCKCHIP_VENDOR_ID
        && match wanted {
            Some(pid) => product_id == pid,
            None => chip_name(product_id).is_some(),
        }
}

impl Transport for RockusbDevice {
    fn bulk_send(&mut self, data: &[u8]) -> CoreResult<usize> {
        Ok(self.bulk_write(data)?)
    }

    fn bulk_recv(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        Ok(self.bulk_read(buf)?)
    }

    fn control_send(&mut self, request: u8, index: u16, data: &[u8]) -> CoreResult<usize> {
        Ok(self.control_write(request, index, data)?)
    }

    fn close(&mut self) -> CoreResult<()> {
        if self.handles.take().is_some() {
            log::debug!("interface released");
        }
        Ok(())
    }
}

impl std::fmt::Debug for RockusbDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RockusbDevice")
            .field("info", &self.info)
            .field("open", &self.handles.is_some())
            .finish()
    }
}
