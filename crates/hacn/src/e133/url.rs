// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! E1.33 SLP URLs.
//!
//! E1.33 components advertise themselves through SLP with URLs of the form
//! `service:e133.esta://<dotted-quad>/<manufacturer>:<device>` where the
//! trailing path is the 48 bit RDM UID in lowercase hex (`xxxx:xxxxxxxx`).

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// The E1.33 SLP service type.
pub const E133_SERVICE: &str = "service:e133.esta";

/// A 48 bit RDM unique identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UID {
    pub manufacturer: u16,
    pub device: u32,
}

impl UID {
    pub fn new(manufacturer: u16, device: u32) -> Self {
        UID {
            manufacturer,
            device,
        }
    }
}

impl fmt::Display for UID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:08x}", self.manufacturer, self.device)
    }
}

/// Error from [`parse_e133_url`] or the [`UID`] parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum E133UrlError {
    /// The URL does not start with `service:e133.esta://`.
    WrongService,
    /// The host part is not a dotted-quad IPv4 address.
    BadAddress,
    /// The path is not a `xxxx:xxxxxxxx` UID.
    BadUid,
}

impl fmt::Display for E133UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongService => write!(f, "not an e133.esta URL"),
            Self::BadAddress => write!(f, "invalid IPv4 address in URL"),
            Self::BadUid => write!(f, "invalid UID in URL"),
        }
    }
}

impl std::error::Error for E133UrlError {}

impl FromStr for UID {
    type Err = E133UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (manufacturer, device) = s.split_once(':').ok_or(E133UrlError::BadUid)?;
        if manufacturer.len() != 4 || device.len() != 8 {
            return Err(E133UrlError::BadUid);
        }
        Ok(UID {
            manufacturer: u16::from_str_radix(manufacturer, 16)
                .map_err(|_| E133UrlError::BadUid)?,
            device: u32::from_str_radix(device, 16).map_err(|_| E133UrlError::BadUid)?,
        })
    }
}

/// Format the SLP URL an E1.33 component advertises.
pub fn format_e133_url(address: Ipv4Addr, uid: UID) -> String {
    format!("{}://{}/{}", E133_SERVICE, address, uid)
}

/// Parse an advertised E1.33 URL back into its ACN endpoint identity.
pub fn parse_e133_url(url: &str) -> Result<(Ipv4Addr, UID), E133UrlError> {
    let prefix = format!("{}://", E133_SERVICE);
    let rest = url.strip_prefix(&prefix).ok_or(E133UrlError::WrongService)?;
    let (host, path) = rest.split_once('/').ok_or(E133UrlError::BadUid)?;
    let address: Ipv4Addr = host.parse().map_err(|_| E133UrlError::BadAddress)?;
    let uid: UID = path.parse()?;
    Ok((address, uid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let url = format_e133_url(Ipv4Addr::new(192, 168, 0, 12), UID::new(0x7a70, 0x1234_5678));
        assert_eq!(url, "service:e133.esta://192.168.0.12/7a70:12345678");
    }

    #[test]
    fn test_round_trip() {
        let address = Ipv4Addr::new(10, 0, 0, 3);
        let uid = UID::new(0x0102, 0xdead_beef);
        let (parsed_address, parsed_uid) = parse_e133_url(&format_e133_url(address, uid)).unwrap();
        assert_eq!(parsed_address, address);
        assert_eq!(parsed_uid, uid);
    }

    #[test]
    fn test_rejects_wrong_service() {
        assert_eq!(
            parse_e133_url("service:printer://10.0.0.1/x"),
            Err(E133UrlError::WrongService)
        );
    }

    #[test]
    fn test_rejects_bad_address() {
        assert_eq!(
            parse_e133_url("service:e133.esta://999.0.0.1/7a70:12345678"),
            Err(E133UrlError::BadAddress)
        );
    }

    #[test]
    fn test_rejects_bad_uid() {
        assert_eq!(
            parse_e133_url("service:e133.esta://10.0.0.1/7a70"),
            Err(E133UrlError::BadUid)
        );
        assert_eq!(
            parse_e133_url("service:e133.esta://10.0.0.1/7a7:012345678"),
            Err(E133UrlError::BadUid)
        );
        assert_eq!("zzzz:00000000".parse::<UID>(), Err(E133UrlError::BadUid));
    }
}
