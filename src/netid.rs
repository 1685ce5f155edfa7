// adsprobe - Native Rust ADS client for Beckhoff TwinCAT PLCs.
// Copyright 2025 - adsprobe contributors

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::client::AdsError;

/// ### AMS Net ID
///
/// Six octets identifying an ADS router, written as `a.b.c.d.e.f`.
/// By convention it is the IPv4 address of the machine followed by `.1.1`,
/// but TwinCAT lets you pick any value, so never assume it.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AmsNetId(pub [u8; 6]);

impl AmsNetId {
    /// ### Builds the conventional Net ID for an IPv4 address (`ip.1.1`).
    pub fn from_ip(ip: Ipv4Addr) -> Self {
        let [a, b, c, d] = ip.octets();
        AmsNetId([a, b, c, d, 1, 1])
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for AmsNetId {
    type Err = AdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AdsError::InvalidNetId(s.to_string());

        let mut octets = [0u8; 6];
        let mut parts = s.trim().split('.');

        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            *octet = part.parse::<u8>().map_err(|_| invalid())?;
        }

        // Seven parts or more
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(AmsNetId(octets))
    }
}

impl fmt::Display for AmsNetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{}.{}.{}.{}.{}.{}", a, b, c, d, e, g)
    }
}

/// ### AMS address: a Net ID plus an AMS port
///
/// The AMS port selects the service inside the target router:
/// 801 is the first TwinCAT 2 PLC runtime, 851 the first TwinCAT 3 one,
/// 10000 the system service.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AmsAddr {
    pub net_id: AmsNetId,
    pub port: u16,
}

impl AmsAddr {
    pub fn new(net_id: AmsNetId, port: u16) -> Self {
        AmsAddr { net_id, port }
    }

    /// Writes the 8 byte wire form (Net ID + port LE) into `buf`.
    pub(crate) fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.net_id.0);
        buf.extend_from_slice(&self.port.to_le_bytes());
    }
}

impl fmt::Display for AmsAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.net_id, self.port)
    }
}
