//! `mtdparts=` partition lookup
//!
//! Partitions are named inside the kernel command line stored in the
//! parameter block, e.g.
//!
//! ```text
//! mtdparts=rk29xxnand:0x2000@0x2000(boot),0x4000@0x4000(kernel),-@0x8000(system)
//! ```
//!
//! Each entry is `size@offset(name)` in sectors. The first entry follows the
//! `:`, later ones follow a `,`, and a size of `-` means "up to the end of
//! the flash". Lookup works on the prefix of the clause that ends right
//! before `(name)`, so a name that is a substring of a sibling's name never
//! picks up the sibling's numbers.

use thiserror::Error;

/// Start of the partition table clause
pub const MTDPARTS: &str = "mtdparts=";

/// Partition lookup failures
///
/// These abort the current operation before any mutating command is sent,
/// but they are not fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    /// The command line has no `mtdparts=` clause
    #[error("'mtdparts' not found in command line")]
    TableNotFound,

    /// The requested partition is not listed
    #[error("partition '{0}' not found")]
    NotFound(String),

    /// The entry for the partition is malformed
    #[error("partition syntax error: {0}")]
    Syntax(&'static str),
}

/// Size part of a partition entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionSize {
    /// Explicit size in sectors
    Explicit(u32),
    /// `-`: everything from the offset to the end of the flash
    ToEnd,
}

/// A resolved partition entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSpec {
    /// Start sector
    pub offset: u32,
    /// Size in sectors
    pub size: PartitionSize,
}

impl PartitionSpec {
    /// Sector count, given the total flash size for `ToEnd` entries
    pub fn sectors(&self, flash_size: u32) -> u32 {
        match self.size {
            PartitionSize::Explicit(size) => size,
            PartitionSize::ToEnd => flash_size.saturating_sub(self.offset),
        }
    }
}

/// Extract the `mtdparts=` clause from a command line
///
/// The clause runs to the end of the text or the first NUL.
pub fn find_table(cmdline: &str) -> Result<&str, PartitionError> {
    let start = cmdline.find(MTDPARTS).ok_or(PartitionError::TableNotFound)?;
    let clause = &cmdline[start..];
    Ok(clause.split('\0').next().unwrap_or(clause))
}

/// Look up `name` in the partition table of `cmdline`
///
/// The size is taken from the text before the last `@` preceding the name.
/// Any `-` in that text marks the partition as running to the end of flash,
/// so a hyphen in an earlier partition's name (`(u-boot)`) turns every later
/// partition into a to-end one. Otherwise the last `,` and then the last `:`
/// delimit the size.
pub fn resolve(cmdline: &str, name: &str) -> Result<PartitionSpec, PartitionError> {
    let table = find_table(cmdline)?;
    let token = format!("({})", name);
    let end = table
        .find(&token)
        .ok_or_else(|| PartitionError::NotFound(name.to_string()))?;
    let prefix = &table[..end];

    let at = prefix
        .rfind('@')
        .ok_or(PartitionError::Syntax("no '@' before partition name"))?;
    let offset = parse_number(&prefix[at + 1..]).ok_or(PartitionError::Syntax("bad offset"))?;

    let head = &prefix[..at];
    let size = if head.rfind('-').is_some() {
        PartitionSize::ToEnd
    } else if let Some(comma) = head.rfind(',') {
        PartitionSize::Explicit(
            parse_number(&head[comma + 1..]).ok_or(PartitionError::Syntax("bad size"))?,
        )
    } else if let Some(colon) = head.rfind(':') {
        PartitionSize::Explicit(
            parse_number(&head[colon + 1..]).ok_or(PartitionError::Syntax("bad size"))?,
        )
    } else {
        return Err(PartitionError::Syntax("no size before '@'"));
    };

    Ok(PartitionSpec { offset, size })
}

/// Parse a number the way `strtoul(s, NULL, 0)` does for hex and decimal
///
/// Leading whitespace is skipped, `0x`/`0X` selects hex, digits are consumed
/// until the first non-digit. Returns `None` when there are no digits.
/// Values wrap at 32 bits.
pub fn parse_number(s: &str) -> Option<u32> {
    let s = s.trim_start();
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    let mut value: u32 = 0;
    let mut seen = false;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        value = value.wrapping_mul(radix).wrapping_add(d);
        seen = true;
    }
    if seen {
        Some(value)
    } else if radix == 16 {
        // "0x" with nothing after it parses as the leading zero
        Some(0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str =
        "mtdparts=rk29xxnand:0x2000@0x2000(boot),0x4000@0x4000(kernel),-@0x8000(system)";

    #[test]
    fn test_comma_form() {
        let spec = resolve(TABLE, "kernel").unwrap();
        assert_eq!(spec.offset, 0x4000);
        assert_eq!(spec.size, PartitionSize::Explicit(0x4000));
    }

    #[test]
    fn test_colon_form() {
        let spec = resolve(TABLE, "boot").unwrap();
        assert_eq!(spec.offset, 0x2000);
        assert_eq!(spec.size, PartitionSize::Explicit(0x2000));
    }

    #[test]
    fn test_to_end_form() {
        let spec = resolve(TABLE, "system").unwrap();
        assert_eq!(spec.offset, 0x8000);
        assert_eq!(spec.size, PartitionSize::ToEnd);
        assert_eq!(spec.sectors(0x0010_0000), 0x0010_0000 - 0x8000);
    }

    #[test]
    fn test_not_found() {
        assert_eq!(
            resolve(TABLE, "missing"),
            Err(PartitionError::NotFound("missing".into()))
        );
        // Only the exact bracketed token matches
        assert!(matches!(resolve(TABLE, "boo"), Err(PartitionError::NotFound(_))));
    }

    #[test]
    fn test_table_not_found() {
        assert_eq!(
            resolve("console=ttyS0 root=/dev/mtdblock3", "boot"),
            Err(PartitionError::TableNotFound)
        );
    }

    #[test]
    fn test_full_command_line() {
        let cmdline = "FIRMWARE_VER:4.4.4\nCMDLINE:console=ttyFIQ0 initrd=0x62000000 \
                       mtdparts=rk29xxnand:0x00002000@0x00002000(misc),0x00004000@0x00004000(kernel),\
                       0x00008000@0x00008000(boot),-@0x00010000(user)\n";
        assert_eq!(
            resolve(cmdline, "boot").unwrap(),
            PartitionSpec {
                offset: 0x8000,
                size: PartitionSize::Explicit(0x8000)
            }
        );
        assert_eq!(resolve(cmdline, "user").unwrap().size, PartitionSize::ToEnd);
    }

    #[test]
    fn test_clause_stops_at_nul() {
        let text = "mtdparts=rk29xxnand:0x2000@0x2000(boot)\0garbage(kernel)";
        assert!(resolve(text, "boot").is_ok());
        assert!(matches!(resolve(text, "kernel"), Err(PartitionError::NotFound(_))));
    }

    #[test]
    fn test_sibling_substring_names() {
        let table = "mtdparts=nand:0x100@0x100(backup),0x200@0x200(up)";
        let spec = resolve(table, "up").unwrap();
        assert_eq!(spec.offset, 0x200);
        assert_eq!(spec.size, PartitionSize::Explicit(0x200));
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(
            resolve("mtdparts=nand:0x100(boot)", "boot"),
            Err(PartitionError::Syntax("no '@' before partition name"))
        );
        assert_eq!(
            resolve("mtdparts=nand:0x100@(boot)", "boot"),
            Err(PartitionError::Syntax("bad offset"))
        );
        assert_eq!(
            resolve("mtdparts=nand:0x100@0x10(a),@0x200(boot)", "boot"),
            Err(PartitionError::Syntax("bad size"))
        );
        assert_eq!(
            resolve("mtdparts=0x100@0x200(boot)", "boot"),
            Err(PartitionError::Syntax("no size before '@'"))
        );
    }

    #[test]
    fn test_hyphen_in_earlier_name_means_to_end() {
        let cmdline = "mtdparts=nand:0x2000@0x2000(u-boot),0x4000@0x4000(kernel)";
        let spec = resolve(cmdline, "kernel").unwrap();
        assert_eq!(spec.offset, 0x4000);
        assert_eq!(spec.size, PartitionSize::ToEnd);

        let spec = resolve(cmdline, "u-boot").unwrap();
        assert_eq!(spec.size, PartitionSize::Explicit(0x2000));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0x2000"), Some(0x2000));
        assert_eq!(parse_number("  4096("), Some(4096));
        assert_eq!(parse_number("0XfF,"), Some(0xff));
        assert_eq!(parse_number("12abc"), Some(12));
        assert_eq!(parse_number("0x"), Some(0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("(boot)"), None);
    }
}
