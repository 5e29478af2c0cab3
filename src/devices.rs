//! Device registration and dispatch
//!
//! Maps `--device name[:key=value,...]` to a boxed [`Transport`]. Backends
//! are included according to the enabled cargo features.

use std::collections::HashMap;

use rkflasher_core::Transport;

/// Information about a device backend
pub struct DeviceInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available backends (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    #[cfg(feature = "usb")]
    devices.push(DeviceInfo {
        name: "usb",
        aliases: &["rockusb"],
        description: "Rockchip board in rockusb or mask ROM mode (index=<n>,pid=<hex>,timeout=<ms>)",
    });

    #[cfg(feature = "dummy")]
    devices.push(DeviceInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory bootloader emulator (size=<sectors>,idb=<sectors>,ram=<bytes>)",
    });

    devices
}

/// Generate a short list of backend names for CLI help
pub fn device_names_short() -> String {
    let devices = available_devices();
    let names: Vec<&str> = devices.iter().map(|d| d.name).collect();
    names.join(", ")
}

/// Parsed device specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParams {
    pub name: String,
    pub params: HashMap<String, String>,
}

/// Canonical backend name for `name` or one of its aliases
pub fn find_device(name: &str) -> Option<&'static str> {
    available_devices()
        .into_iter()
        .find(|d| d.name == name || d.aliases.iter().any(|a| *a == name))
        .map(|d| d.name)
}

/// Parse a device string such as `usb:pid=320a,index=1`
///
/// Empty names, options without `=` and repeated keys are rejected.
pub fn parse_device_params(s: &str) -> Result<DeviceParams, Box<dyn std::error::Error>> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Missing device name in '{}'", s).into());
    }

    let mut params = HashMap::new();
    for opt in opts_str.split(',').filter(|o| !o.is_empty()) {
        let Some((key, value)) = opt.split_once('=') else {
            return Err(format!("Invalid parameter format: '{}' (expected key=value)", opt).into());
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Missing parameter name in '{}'", opt).into());
        }
        if params.insert(key.to_string(), value.trim().to_string()).is_some() {
            return Err(format!("Parameter '{}' given more than once", key).into());
        }
    }

    Ok(DeviceParams {
        name: name.to_string(),
        params,
    })
}

/// Open the device named by `device`
pub fn open_device(device: &str) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    let params = parse_device_params(device)?;
    let name = find_device(&params.name)
        .ok_or_else(|| format!("Unknown device: {}", params.name))?;

    match name {
        #[cfg(feature = "usb")]
        "usb" => open_usb(&params),

        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(&params),

        _ => Err(format!("Unknown device: {}", params.name).into()),
    }
}

#[cfg(feature = "usb")]
fn open_usb(params: &DeviceParams) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    use rkflasher_usb::{parse_options, RockusbDevice};

    let options: Vec<(&str, &str)> = params
        .params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let config = parse_options(&options)?;

    let device = RockusbDevice::open_with_config(config)?;
    Ok(Box::new(device))
}

#[cfg(feature = "dummy")]
fn open_dummy(params: &DeviceParams) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    use rkflasher_dummy::{DummyConfig, DummyDevice};

    let mut config = DummyConfig::default();
    for (key, value) in &params.params {
        let invalid = || format!("Invalid dummy parameter: {}={}", key, value);
        match key.as_str() {
            "size" => config.flash_sectors = parse_number(value).ok_or_else(invalid)?,
            "idb" => config.idb_sectors = parse_number(value).ok_or_else(invalid)?,
            "ram" => config.sdram_size = parse_number(value).ok_or_else(invalid)? as usize,
            _ => return Err(format!("Unknown dummy parameter: {}", key).into()),
        }
    }

    log::info!(
        "Opening dummy device ({} flash sectors, {} IDB sectors, {} bytes SDRAM)",
        config.flash_sectors,
        config.idb_sectors,
        config.sdram_size
    );
    Ok(Box::new(DummyDevice::new(config)))
}

#[cfg(feature = "dummy")]
fn parse_number(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Print the compiled-in backends and any connected Rockchip boards
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    println!("Available devices:");
    for d in available_devices() {
        println!("  {:8} - {}", d.name, d.description);
    }

    #[cfg(feature = "usb")]
    {
        let boards = rkflasher_usb::RockusbDevice::list_devices()?;
        println!();
        if boards.is_empty() {
            println!("No Rockchip boards connected");
        }
        for (index, b) in boards.iter().enumerate() {
            println!(
                "  [{}] bus {} address {}: {} (0x{:04x}){}",
                index,
                b.bus,
                b.address,
                b.chip.unwrap_or("unknown"),
                b.product_id,
                if b.mask_rom { " [mask ROM]" } else { "" }
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_params() {
        let params = parse_device_params("usb:pid=320a,index=1").unwrap();
        assert_eq!(params.name, "usb");
        assert_eq!(params.params.get("pid").map(String::as_str), Some("320a"));
        assert_eq!(params.params.get("index").map(String::as_str), Some("1"));

        let params = parse_device_params("dummy").unwrap();
        assert_eq!(params.name, "dummy");
        assert!(params.params.is_empty());
    }

    #[test]
    fn test_parse_device_params_invalid() {
        assert!(parse_device_params("usb:pid").is_err());
        assert!(parse_device_params("").is_err());
        assert!(parse_device_params(":pid=320a").is_err());
        assert!(parse_device_params("usb:=320a").is_err());
        assert!(parse_device_params("usb:pid=320a,pid=310b").is_err());
    }

    #[test]
    fn test_parse_device_params_trailing_comma() {
        let params = parse_device_params("usb:pid=320a,").unwrap();
        assert_eq!(params.params.len(), 1);
    }

    #[test]
    fn test_find_device_aliases() {
        assert_eq!(find_device("jtag"), None);
        #[cfg(feature = "usb")]
        {
            assert_eq!(find_device("usb"), Some("usb"));
            assert_eq!(find_device("rockusb"), Some("usb"));
        }
        #[cfg(feature = "dummy")]
        assert_eq!(find_device("dummy"), Some("dummy"));
    }

    #[test]
    fn test_unknown_device() {
        assert!(open_device("jtag").is_err());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_open_dummy() {
        assert!(open_device("dummy:size=0x100,ram=4096").is_ok());
        assert!(open_device("dummy:size=lots").is_err());
        assert!(open_device("dummy:color=red").is_err());
    }
}
