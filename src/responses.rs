use crate::error::Error;
use atat::atat_derive::AtatResp;
use core::str::FromStr;
use embedded_nal::{Ipv4Addr, Ipv6Addr};
use heapless::String;

/// Commands which gets just responded by OK
#[derive(Clone, AtatResp)]
pub struct NoResponse;

/// Prefix of the join status line, followed by SSID, BSSID, channel and RSSI
const JOIN_STATUS_PREFIX: &[u8] = b"+CWJAP:";

/// Prefix of a single address line of the CIFSR command
const ADDRESS_PREFIX: &[u8] = b"+CIFSR:";

/// Returns true if the reply lines of a join status query name an access point.
/// ESP-AT answers with `No AP` if the station is not joined.
pub(crate) fn is_joined<'a>(mut lines: impl Iterator<Item = &'a [u8]>) -> bool {
    lines.any(|line| line.starts_with(JOIN_STATUS_PREFIX))
}

/// Local IP and MAC addresses
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct LocalAddress {
    /// Local IPv4 address if assigned
    pub ipv4: Option<Ipv4Addr>,

    /// Local MAC address
    pub mac: Option<String<17>>,

    /// Link local IPv6 address if assigned
    pub ipv6_link_local: Option<Ipv6Addr>,

    /// Global IPv6 address if assigned
    pub ipv6_global: Option<Ipv6Addr>,
}

impl LocalAddress {
    /// Parses the reply lines of the CIFSR command, e.g. `+CIFSR:STAIP,"10.0.0.181"`.
    /// Lines of other address types (e.g. of SoftAP mode) are ignored.
    pub(crate) fn from_lines<'a>(lines: impl Iterator<Item = &'a [u8]>) -> Result<Self, Error> {
        let mut data = Self::default();

        for line in lines {
            let Some(entry) = line.strip_prefix(ADDRESS_PREFIX) else {
                continue;
            };

            let (address_type, address) = split_entry(entry)?;

            match address_type {
                b"STAIP" => data.ipv4 = Some(Ipv4Addr::from_str(address).map_err(|_| Error::Malformed)?),
                b"STAIP6LL" => data.ipv6_link_local = Some(Ipv6Addr::from_str(address).map_err(|_| Error::Malformed)?),
                b"STAIP6GL" => data.ipv6_global = Some(Ipv6Addr::from_str(address).map_err(|_| Error::Malformed)?),
                b"STAMAC" => data.mac = Some(String::from_str(address).map_err(|_| Error::Malformed)?),
                &_ => {}
            }
        }

        Ok(data)
    }
}

/// Splits `STAIP,"10.0.0.181"` in type and unquoted address
fn split_entry(entry: &[u8]) -> Result<(&[u8], &str), Error> {
    let separator = entry.iter().position(|byte| *byte == b',').ok_or(Error::Malformed)?;
    let address = &entry[separator + 1..];
    let address = address
        .strip_prefix(b"\"")
        .and_then(|address| address.strip_suffix(b"\""))
        .unwrap_or(address);

    let address = core::str::from_utf8(address).map_err(|_| Error::Malformed)?;
    Ok((&entry[..separator], address))
}
