//! Device identity derived from the host's network MAC address.
//!
//! Used as the `tool_id` fallback when configuration omits one. Format:
//! a lowercase hexadecimal rendering of the 6-byte MAC with a leading `0x`
//! and any trailing interface-type sigil stripped, per the spec's
//! `tool_id` derivation rule.

use std::fmt::Write as _;

pub type MacAddress = [u8; 6];

/// Read the first non-loopback interface's MAC address.
///
/// Real interface enumeration is a process-boundary concern this crate
/// treats as out of scope (see Bus abstractions); this reads `/sys/class/net`
/// on Linux and falls back to a fixed placeholder address if nothing usable
/// is found, so `tool_id` derivation is always defined.
pub fn read_mac() -> MacAddress {
    if let Some(mac) = read_mac_from_sysfs() {
        return mac;
    }
    [0x00, 0x1b, 0x21, 0xde, 0xad, 0x01]
}

fn read_mac_from_sysfs() -> Option<MacAddress> {
    let net_dir = std::fs::read_dir("/sys/class/net").ok()?;
    for entry in net_dir.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == "lo" {
            continue;
        }
        let addr_path = entry.path().join("address");
        if let Ok(contents) = std::fs::read_to_string(&addr_path) {
            if let Some(mac) = parse_colon_mac(contents.trim()) {
                return Some(mac);
            }
        }
    }
    None
}

fn parse_colon_mac(s: &str) -> Option<MacAddress> {
    let mut out = [0u8; 6];
    let mut parts = s.split(':');
    for slot in out.iter_mut() {
        *slot = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

/// Derive the `tool_id` fallback: `0x` + lowercase hex MAC, trailing type
/// sigil stripped (the spec's wording for a MAC-address-derived id with no
/// separators and no trailing punctuation).
pub fn tool_id(mac: &MacAddress) -> String {
    let mut id = String::with_capacity(14);
    id.push_str("0x");
    for byte in mac {
        let _ = write!(id, "{byte:02x}");
    }
    id.trim_end_matches(|c: char| !c.is_ascii_hexdigit()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_id_format() {
        let mac = [0x00, 0x1b, 0x21, 0xde, 0xad, 0x01];
        assert_eq!(tool_id(&mac), "0x001b21dead01");
    }

    #[test]
    fn parse_colon_mac_roundtrip() {
        assert_eq!(
            parse_colon_mac("aa:bb:cc:dd:ee:ff"),
            Some([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])
        );
        assert_eq!(parse_colon_mac("not-a-mac"), None);
    }
}
