//! Common types and wire constants shared by the controllers.
//!
//! Field widths must match the P4 program exactly, otherwise the device
//! rejects the table entries that carry them.

use crate::error::Error;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a forwarding device within the switch.
pub type DeviceId = u64;

/// Rank of this controller among concurrent controllers. Higher wins.
pub type ElectionId = u64;

/// Device specific configuration blob pushed verbatim with the pipeline.
pub type DeviceConfig = bytes::Bytes;

/// Width of a MAC address field.
pub const MAC_ADDR_BYTES: usize = 6;
pub type MacAddr = u64;

/// Width of a port field. Only the lower 9 bits are used.
pub const PORT_BYTES: usize = 2;
pub type Port = u32;

pub const ISD_BYTES: usize = 2;
pub type IsdAddr = u16;

pub const AS_BYTES: usize = 6;
pub type AsAddr = u64;

pub const FLAG_BYTES: usize = 1;
pub type Flag = u8;

pub const NODE_ID_BYTES: usize = 4;
pub type NodeId = u32;

pub const LINK_UTIL_BYTES: usize = 4;
pub type LinkUtil = u32;

/// Broadcast MAC address.
pub const BROADCAST_MAC: MacAddr = 0xffff_ffff_ffff;

const AS_MASK: u64 = 0xffff_ffff_ffff;

/// An ISD-AS pair in the `<isd>-<as>` notation, e.g. `1-ff00:0:110`.
///
/// The ISD is a hexadecimal number. The AS is written as colon separated
/// 16-bit hexadecimal groups which are concatenated big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IsdAs {
    pub isd: IsdAddr,
    pub asn: AsAddr,
}

impl IsdAs {
    pub fn new(isd: IsdAddr, asn: AsAddr) -> Self {
        Self {
            isd,
            asn: asn & AS_MASK,
        }
    }

    /// Pack into a single 64-bit value with the ISD in the upper 16 bits.
    pub fn to_u64(self) -> u64 {
        ((self.isd as u64) << 48) | self.asn
    }

    /// Inverse of [`IsdAs::to_u64`].
    pub fn from_u64(value: u64) -> Self {
        Self::new((value >> 48) as IsdAddr, value)
    }
}

impl FromStr for IsdAs {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (isd, asn) = s
            .split_once('-')
            .ok_or_else(|| Error::Config(format!("Invalid ISD-AS address '{}'", s)))?;

        let isd = IsdAddr::from_str_radix(isd, 16)
            .map_err(|e| Error::Config(format!("Invalid ISD in '{}': {}", s, e)))?;

        let mut value: u64 = 0;
        for group in asn.split(':') {
            let group = u16::from_str_radix(group, 16)
                .map_err(|e| Error::Config(format!("Invalid AS in '{}': {}", s, e)))?;
            value = (value << 16) | group as u64;
        }

        Ok(Self::new(isd, value))
    }
}

impl fmt::Display for IsdAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:x}-{:x}:{:x}:{:x}",
            self.isd,
            (self.asn >> 32) & 0xffff,
            (self.asn >> 16) & 0xffff,
            self.asn & 0xffff
        )
    }
}

/// Split an `"ip.address:port"` string into address and port.
///
/// An empty string yields an empty address and port 0.
pub fn split_ip_address(address: &str) -> Result<(String, u16)> {
    if address.is_empty() {
        return Ok((String::new(), 0));
    }

    let mut parts = address.split(':');
    let ip = parts.next().unwrap_or_default().to_string();
    let port = parts
        .next()
        .ok_or_else(|| Error::Config(format!("Missing port in address '{}'", address)))?
        .parse::<u16>()
        .map_err(|e| Error::Config(format!("Invalid port in address '{}': {}", address, e)))?;

    Ok((ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_isd_as() {
        let addr: IsdAs = "fa-ff00:0:100".parse().unwrap();
        assert_eq!(addr.isd, 0xfa);
        assert_eq!(addr.asn, 0xff00_0000_0100);
        assert_eq!(addr.to_string(), "fa-ff00:0:100");

        let addr: IsdAs = "1-ff00:ff:300".parse().unwrap();
        assert_eq!(addr.to_u64(), 0x0001_ff00_00ff_0300);
        assert_eq!(IsdAs::from_u64(addr.to_u64()), addr);
    }

    #[test]
    fn test_parse_isd_as_errors() {
        assert!(matches!("".parse::<IsdAs>(), Err(Error::Config(_))));
        assert!("ff00:0:100".parse::<IsdAs>().is_err());
        assert!("1-ff00:xyz:100".parse::<IsdAs>().is_err());
    }

    #[test]
    fn test_split_ip_address() {
        assert_eq!(split_ip_address("").unwrap(), (String::new(), 0));
        assert_eq!(
            split_ip_address("255.127.63.31:54321").unwrap(),
            ("255.127.63.31".to_string(), 54321)
        );
        assert!(split_ip_address("10.0.0.1").is_err());
        assert!(split_ip_address("10.0.0.1:70000").is_err());
    }
}
