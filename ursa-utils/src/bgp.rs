//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! BGP value types shared between the protocol engine and its consumers.

use std::net::Ipv4Addr;

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

// Configurable (AFI,SAFI) tuples.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AfiSafi {
    Ipv4Unicast,
    Ipv6Unicast,
    Ipv4Vpn,
    Ipv6Vpn,
    Ipv4LabeledUnicast,
    Ipv6LabeledUnicast,
    RouteTargetConstrain,
}

// BGP route origin.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

// Standard community (RFC 1997).
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Comm(pub u32);

// Extended community (RFC 4360).
//
// The variant is selected by the type-high octet with the transitive bit
// masked out. Sub-type and transitivity are retained so that re-encoding a
// decoded community is byte-exact.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum ExtComm {
    TwoOctetAsSpecific {
        transitive: bool,
        sub_type: u8,
        asn: u16,
        local: u32,
    },
    Ipv4AddressSpecific {
        transitive: bool,
        sub_type: u8,
        addr: Ipv4Addr,
        local: u16,
    },
    FourOctetAsSpecific {
        transitive: bool,
        sub_type: u8,
        asn: u32,
        local: u16,
    },
    Opaque {
        transitive: bool,
        sub_type: u8,
        value: [u8; 6],
    },
    Unknown([u8; 8]),
}

// Extended community type-high values (transitive bit masked out).
pub const EXT_COMM_TYPE_TWO_OCTET_AS: u8 = 0x00;
pub const EXT_COMM_TYPE_IPV4_ADDRESS: u8 = 0x01;
pub const EXT_COMM_TYPE_FOUR_OCTET_AS: u8 = 0x02;
pub const EXT_COMM_TYPE_OPAQUE: u8 = 0x03;
pub const EXT_COMM_NON_TRANSITIVE: u8 = 0x40;

// ===== impl AfiSafi =====

impl std::fmt::Display for AfiSafi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AfiSafi::Ipv4Unicast => write!(f, "ipv4-unicast"),
            AfiSafi::Ipv6Unicast => write!(f, "ipv6-unicast"),
            AfiSafi::Ipv4Vpn => write!(f, "ipv4-vpn"),
            AfiSafi::Ipv6Vpn => write!(f, "ipv6-vpn"),
            AfiSafi::Ipv4LabeledUnicast => write!(f, "ipv4-labeled-unicast"),
            AfiSafi::Ipv6LabeledUnicast => write!(f, "ipv6-labeled-unicast"),
            AfiSafi::RouteTargetConstrain => {
                write!(f, "route-target-constrain")
            }
        }
    }
}

// ===== impl ExtComm =====

impl ExtComm {
    pub const LENGTH: usize = 8;

    /// Returns the raw octets of the extended community.
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0; 8];
        match self {
            ExtComm::TwoOctetAsSpecific {
                transitive,
                sub_type,
                asn,
                local,
            } => {
                bytes[0] = EXT_COMM_TYPE_TWO_OCTET_AS
                    | Self::transitive_bit(*transitive);
                bytes[1] = *sub_type;
                bytes[2..4].copy_from_slice(&asn.to_be_bytes());
                bytes[4..8].copy_from_slice(&local.to_be_bytes());
            }
            ExtComm::Ipv4AddressSpecific {
                transitive,
                sub_type,
                addr,
                local,
            } => {
                bytes[0] = EXT_COMM_TYPE_IPV4_ADDRESS
                    | Self::transitive_bit(*transitive);
                bytes[1] = *sub_type;
                bytes[2..6].copy_from_slice(&addr.octets());
                bytes[6..8].copy_from_slice(&local.to_be_bytes());
            }
            ExtComm::FourOctetAsSpecific {
                transitive,
                sub_type,
                asn,
                local,
            } => {
                bytes[0] = EXT_COMM_TYPE_FOUR_OCTET_AS
                    | Self::transitive_bit(*transitive);
                bytes[1] = *sub_type;
                bytes[2..6].copy_from_slice(&asn.to_be_bytes());
                bytes[6..8].copy_from_slice(&local.to_be_bytes());
            }
            ExtComm::Opaque {
                transitive,
                sub_type,
                value,
            } => {
                bytes[0] =
                    EXT_COMM_TYPE_OPAQUE | Self::transitive_bit(*transitive);
                bytes[1] = *sub_type;
                bytes[2..8].copy_from_slice(value);
            }
            ExtComm::Unknown(raw) => {
                bytes.copy_from_slice(raw);
            }
        }
        bytes
    }

    /// Parses an extended community from its raw octets.
    pub fn from_bytes(bytes: [u8; 8]) -> ExtComm {
        let transitive = bytes[0] & EXT_COMM_NON_TRANSITIVE == 0;
        let sub_type = bytes[1];
        match bytes[0] & !EXT_COMM_NON_TRANSITIVE {
            EXT_COMM_TYPE_TWO_OCTET_AS => ExtComm::TwoOctetAsSpecific {
                transitive,
                sub_type,
                asn: u16::from_be_bytes([bytes[2], bytes[3]]),
                local: u32::from_be_bytes([
                    bytes[4], bytes[5], bytes[6], bytes[7],
                ]),
            },
            EXT_COMM_TYPE_IPV4_ADDRESS => ExtComm::Ipv4AddressSpecific {
                transitive,
                sub_type,
                addr: Ipv4Addr::new(bytes[2], bytes[3], bytes[4], bytes[5]),
                local: u16::from_be_bytes([bytes[6], bytes[7]]),
            },
            EXT_COMM_TYPE_FOUR_OCTET_AS => ExtComm::FourOctetAsSpecific {
                transitive,
                sub_type,
                asn: u32::from_be_bytes([
                    bytes[2], bytes[3], bytes[4], bytes[5],
                ]),
                local: u16::from_be_bytes([bytes[6], bytes[7]]),
            },
            EXT_COMM_TYPE_OPAQUE => {
                let mut value = [0; 6];
                value.copy_from_slice(&bytes[2..8]);
                ExtComm::Opaque {
                    transitive,
                    sub_type,
                    value,
                }
            }
            _ => ExtComm::Unknown(bytes),
        }
    }

    fn transitive_bit(transitive: bool) -> u8 {
        if transitive { 0 } else { EXT_COMM_NON_TRANSITIVE }
    }
}
