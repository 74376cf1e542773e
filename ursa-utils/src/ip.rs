//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::{Ipv4Network, Ipv6Network};
use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

// Address Family identifier.
//
// IANA registry:
// http://www.iana.org/assignments/address-family-numbers
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum AddressFamily {
    Ipv4 = 1,
    Ipv6 = 2,
}

// Extension methods for IpAddr.
pub trait IpAddrExt {
    // Returns the address family of the IP address.
    fn address_family(&self) -> AddressFamily;

    // Returns an unspecified address of the given address family.
    fn unspecified(af: AddressFamily) -> IpAddr;
}

// Extension methods for Ipv4Addr.
pub trait Ipv4AddrExt {
    const LENGTH: usize;
}

// Extension methods for Ipv6Addr.
pub trait Ipv6AddrExt {
    const LENGTH: usize;
}

// Extension methods for Ipv4Network.
pub trait Ipv4NetworkExt {
    const MAX_PREFIXLEN: u8;

    // Apply mask to prefix.
    #[must_use]
    fn apply_mask(&self) -> Ipv4Network;

    // Returns true if this is a routable network.
    fn is_routable(&self) -> bool;
}

// Extension methods for Ipv6Network.
pub trait Ipv6NetworkExt {
    const MAX_PREFIXLEN: u8;

    // Apply mask to prefix.
    #[must_use]
    fn apply_mask(&self) -> Ipv6Network;

    // Returns true if this is a routable network.
    fn is_routable(&self) -> bool;
}

// ===== impl AddressFamily =====

impl AddressFamily {
    pub fn addr_len(&self) -> usize {
        match self {
            AddressFamily::Ipv4 => Ipv4Addr::LENGTH,
            AddressFamily::Ipv6 => Ipv6Addr::LENGTH,
        }
    }

    pub fn max_prefixlen(&self) -> u8 {
        match self {
            AddressFamily::Ipv4 => Ipv4Network::MAX_PREFIXLEN,
            AddressFamily::Ipv6 => Ipv6Network::MAX_PREFIXLEN,
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "IPv4"),
            AddressFamily::Ipv6 => write!(f, "IPv6"),
        }
    }
}

// ===== impl IpAddr =====

impl IpAddrExt for IpAddr {
    fn address_family(&self) -> AddressFamily {
        match self {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    fn unspecified(af: AddressFamily) -> IpAddr {
        match af {
            AddressFamily::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }
}

// ===== impl Ipv4Addr =====

impl Ipv4AddrExt for Ipv4Addr {
    const LENGTH: usize = 4;
}

// ===== impl Ipv6Addr =====

impl Ipv6AddrExt for Ipv6Addr {
    const LENGTH: usize = 16;
}

// ===== impl Ipv4Network =====

impl Ipv4NetworkExt for Ipv4Network {
    const MAX_PREFIXLEN: u8 = 32;

    fn apply_mask(&self) -> Ipv4Network {
        // The prefix length was already validated, hence the unwrap is safe.
        Ipv4Network::new(self.network(), self.prefix()).unwrap()
    }

    fn is_routable(&self) -> bool {
        let addr = self.ip();
        !addr.is_loopback() && !addr.is_broadcast() && !addr.is_multicast()
    }
}

// ===== impl Ipv6Network =====

impl Ipv6NetworkExt for Ipv6Network {
    const MAX_PREFIXLEN: u8 = 128;

    fn apply_mask(&self) -> Ipv6Network {
        // The prefix length was already validated, hence the unwrap is safe.
        Ipv6Network::new(self.network(), self.prefix()).unwrap()
    }

    fn is_routable(&self) -> bool {
        let addr = self.ip();
        !addr.is_loopback() && !addr.is_multicast()
    }
}
