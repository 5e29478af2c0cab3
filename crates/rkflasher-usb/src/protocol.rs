//! Rockchip USB identifiers

/// Rockchip vendor ID
pub const ROCKCHIP_VENDOR_ID: u16 = 0x2207;

/// Bulk IN endpoint (device to host)
pub const BULK_IN_EP: u8 = 0x81;

/// Bulk OUT endpoint (host to device)
pub const BULK_OUT_EP: u8 = 0x01;

/// Interface carrying the rockusb endpoints
pub const INTERFACE: u8 = 0;

/// bcdUSB reported by the mask ROM loader
pub const MASK_ROM_USB_VERSION: u16 = 0x0200;

/// Default per-transfer timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 0;

/// Known product IDs and the SoC they belong to
pub const PRODUCTS: &[(u16, &str)] = &[
    (0x281a, "RK2818"),
    (0x290a, "RK2918"),
    (0x292a, "RK2928"),
    (0x292c, "RK3026"),
    (0x300a, "RK3066"),
    (0x300b, "RK3168"),
    (0x301a, "RK3036"),
    (0x310a, "RK3066B"),
    (0x310b, "RK3188"),
    (0x310c, "RK312X"),
    (0x310d, "RK3126"),
    (0x320a, "RK3288"),
    (0x320b, "RK322X"),
    (0x330a, "RK3368"),
    (0x330c, "RK3399"),
];

/// SoC name for a product ID
pub fn chip_name(product_id: u16) -> Option<&'static str> {
    PRODUCTS
        .iter()
        .find(|(pid, _)| *pid == product_id)
        .map(|(_, name)| *name)
}

/// Parse a product ID, with or without `0x` prefix (always hex)
pub fn parse_product_id(s: &str) -> Option<u16> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chip_name() {
        assert_eq!(chip_name(0x310b), Some("RK3188"));
        assert_eq!(chip_name(0x330c), Some("RK3399"));
        assert_eq!(chip_name(0x281a), Some("RK2818"));
        assert_eq!(chip_name(0x1234), None);
    }

    #[test]
    fn test_product_table_unique() {
        for (i, (pid, _)) in PRODUCTS.iter().enumerate() {
            assert!(PRODUCTS[i + 1..].iter().all(|(other, _)| other != pid));
        }
    }

    #[test]
    fn test_parse_product_id() {
        assert_eq!(parse_product_id("0x320a"), Some(0x320a));
        assert_eq!(parse_product_id("330C"), Some(0x330c));
        assert_eq!(parse_product_id("rk3288"), None);
        assert_eq!(parse_product_id("0x12345"), None);
    }
}
