//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ipnetwork::{Ipv4Network, Ipv6Network};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use ursa_utils::bgp::ExtComm;
use ursa_utils::bytes::{BytesExt, BytesMutExt};
use ursa_utils::ip::{
    Ipv4AddrExt, Ipv4NetworkExt, Ipv6AddrExt, Ipv6NetworkExt,
};

use crate::packet::consts::RdType;
use crate::packet::error::{DecodeResult, UpdateMessageError};
use crate::packet::message::prefix_wire_len;

//
// Route Distinguisher (RFC 4364).
//
// Encoding format:
//
// +-------------------------------+
// |    Type Field  (2 octets)     |
// +-------------------------------+
// |    Value Field (6 octets)     |
// +-------------------------------+
//
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum RouteDistinguisher {
    TwoOctetAs { admin: u16, assigned: u32 },
    Ipv4Address { admin: Ipv4Addr, assigned: u16 },
    FourOctetAs { admin: u32, assigned: u16 },
    Unknown([u8; 8]),
}

//
// MPLS label stack.
//
// Each entry is a 20-bit label packed into 3 octets with the bottom-of-stack
// bit in the low bit of the last octet.
//
#[derive(Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LabelStack(pub Vec<u32>);

// Labeled VPN prefix: label stack + Route Distinguisher + address.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct VpnPrefix<N> {
    pub rd: RouteDistinguisher,
    pub labels: LabelStack,
    pub prefix: N,
}

// Labeled prefix: label stack + address.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LabeledPrefix<N> {
    pub labels: LabelStack,
    pub prefix: N,
}

//
// Route Target membership NLRI (RFC 4684).
//
// The default route is encoded with a zero prefix length and carries neither
// an origin AS nor a route target.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RouteTargetNlri {
    pub origin_as: u32,
    pub target: Option<ExtComm>,
}

// Prefix length of a non-default Route Target membership NLRI, in bits.
const RTC_NLRI_PLEN: u8 = 96;

// ===== impl RouteDistinguisher =====

impl RouteDistinguisher {
    pub const LEN: usize = 8;

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            RouteDistinguisher::TwoOctetAs { admin, assigned } => {
                buf.put_u16(RdType::TwoOctetAs as u16);
                buf.put_u16(*admin);
                buf.put_u32(*assigned);
            }
            RouteDistinguisher::Ipv4Address { admin, assigned } => {
                buf.put_u16(RdType::Ipv4Address as u16);
                buf.put_ipv4(admin);
                buf.put_u16(*assigned);
            }
            RouteDistinguisher::FourOctetAs { admin, assigned } => {
                buf.put_u16(RdType::FourOctetAs as u16);
                buf.put_u32(*admin);
                buf.put_u16(*assigned);
            }
            RouteDistinguisher::Unknown(raw) => {
                buf.put_slice(raw);
            }
        }
    }

    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::LEN {
            return Err(UpdateMessageError::InvalidNetworkField.into());
        }

        let mut raw = [0; Self::LEN];
        raw.copy_from_slice(&buf[..Self::LEN]);

        let rd_type = buf.get_u16();
        let rd = match RdType::from_u16(rd_type) {
            Some(RdType::TwoOctetAs) => {
                let admin = buf.get_u16();
                let assigned = buf.get_u32();
                RouteDistinguisher::TwoOctetAs { admin, assigned }
            }
            Some(RdType::Ipv4Address) => {
                let admin = buf.get_ipv4();
                let assigned = buf.get_u16();
                RouteDistinguisher::Ipv4Address { admin, assigned }
            }
            Some(RdType::FourOctetAs) => {
                let admin = buf.get_u32();
                let assigned = buf.get_u16();
                RouteDistinguisher::FourOctetAs { admin, assigned }
            }
            None => {
                buf.advance(Self::LEN - 2);
                RouteDistinguisher::Unknown(raw)
            }
        };

        Ok(rd)
    }
}

// ===== impl LabelStack =====

impl LabelStack {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let last = self.0.len().saturating_sub(1);
        for (pos, label) in self.0.iter().enumerate() {
            let mut group = label << 4;
            if pos == last {
                group |= 1;
            }
            buf.put_u24(group);
        }
    }

    // Consumes successive 3-octet groups until the bottom-of-stack bit is
    // seen. If the bit is never seen within `max_len` octets, nothing is
    // consumed and the stack is empty.
    pub(crate) fn decode(buf: &mut Bytes, max_len: usize) -> Self {
        let mut labels = Vec::new();
        let mut pos = 0;
        let limit = max_len.min(buf.remaining());

        while pos + 3 <= limit {
            let group = ((buf[pos] as u32) << 16)
                | ((buf[pos + 1] as u32) << 8)
                | (buf[pos + 2] as u32);
            labels.push(group >> 4);
            pos += 3;
            if group & 1 != 0 {
                buf.advance(pos);
                return LabelStack(labels);
            }
        }

        LabelStack(Vec::new())
    }

    pub fn wire_len(&self) -> usize {
        3 * self.0.len()
    }
}

// ===== global functions =====

pub(crate) fn encode_vpn_ipv4_prefix(
    buf: &mut BytesMut,
    p: &VpnPrefix<Ipv4Network>,
) {
    let plen =
        8 * (p.labels.wire_len() + RouteDistinguisher::LEN) as u8
            + p.prefix.prefix();
    buf.put_u8(plen);
    p.labels.encode(buf);
    p.rd.encode(buf);
    let prefix_bytes = p.prefix.ip().octets();
    buf.put(&prefix_bytes[0..prefix_wire_len(p.prefix.prefix())]);
}

pub(crate) fn encode_vpn_ipv6_prefix(
    buf: &mut BytesMut,
    p: &VpnPrefix<Ipv6Network>,
) {
    let plen =
        8 * (p.labels.wire_len() + RouteDistinguisher::LEN) as u8
            + p.prefix.prefix();
    buf.put_u8(plen);
    p.labels.encode(buf);
    p.rd.encode(buf);
    let prefix_bytes = p.prefix.ip().octets();
    buf.put(&prefix_bytes[0..prefix_wire_len(p.prefix.prefix())]);
}

pub(crate) fn encode_labeled_ipv4_prefix(
    buf: &mut BytesMut,
    p: &LabeledPrefix<Ipv4Network>,
) {
    let plen = 8 * p.labels.wire_len() as u8 + p.prefix.prefix();
    buf.put_u8(plen);
    p.labels.encode(buf);
    let prefix_bytes = p.prefix.ip().octets();
    buf.put(&prefix_bytes[0..prefix_wire_len(p.prefix.prefix())]);
}

pub(crate) fn encode_labeled_ipv6_prefix(
    buf: &mut BytesMut,
    p: &LabeledPrefix<Ipv6Network>,
) {
    let plen = 8 * p.labels.wire_len() as u8 + p.prefix.prefix();
    buf.put_u8(plen);
    p.labels.encode(buf);
    let prefix_bytes = p.prefix.ip().octets();
    buf.put(&prefix_bytes[0..prefix_wire_len(p.prefix.prefix())]);
}

pub(crate) fn encode_route_target_prefix(
    buf: &mut BytesMut,
    p: &RouteTargetNlri,
) {
    match &p.target {
        Some(target) => {
            buf.put_u8(RTC_NLRI_PLEN);
            buf.put_u32(p.origin_as);
            buf.put_slice(&target.to_bytes());
        }
        None => {
            buf.put_u8(0);
        }
    }
}

pub(crate) fn decode_vpn_ipv4_prefix(
    buf: &mut Bytes,
) -> DecodeResult<VpnPrefix<Ipv4Network>> {
    let (rd, labels, rest_bits) = decode_vpn_prefix_hdr(buf)?;
    let prefix = decode_prefix_addr_ipv4(buf, rest_bits)?;
    Ok(VpnPrefix { rd, labels, prefix })
}

pub(crate) fn decode_vpn_ipv6_prefix(
    buf: &mut Bytes,
) -> DecodeResult<VpnPrefix<Ipv6Network>> {
    let (rd, labels, rest_bits) = decode_vpn_prefix_hdr(buf)?;
    let prefix = decode_prefix_addr_ipv6(buf, rest_bits)?;
    Ok(VpnPrefix { rd, labels, prefix })
}

pub(crate) fn decode_labeled_ipv4_prefix(
    buf: &mut Bytes,
) -> DecodeResult<LabeledPrefix<Ipv4Network>> {
    let (labels, rest_bits) = decode_labeled_prefix_hdr(buf)?;
    let prefix = decode_prefix_addr_ipv4(buf, rest_bits)?;
    Ok(LabeledPrefix { labels, prefix })
}

pub(crate) fn decode_labeled_ipv6_prefix(
    buf: &mut Bytes,
) -> DecodeResult<LabeledPrefix<Ipv6Network>> {
    let (labels, rest_bits) = decode_labeled_prefix_hdr(buf)?;
    let prefix = decode_prefix_addr_ipv6(buf, rest_bits)?;
    Ok(LabeledPrefix { labels, prefix })
}

pub(crate) fn decode_route_target_prefix(
    buf: &mut Bytes,
) -> DecodeResult<RouteTargetNlri> {
    if buf.remaining() < 1 {
        return Err(UpdateMessageError::InvalidNetworkField.into());
    }

    let plen = buf.get_u8();
    if plen == 0 {
        return Ok(RouteTargetNlri {
            origin_as: 0,
            target: None,
        });
    }
    if plen != RTC_NLRI_PLEN
        || buf.remaining() < (RTC_NLRI_PLEN / 8) as usize
    {
        return Err(UpdateMessageError::InvalidNetworkField.into());
    }

    let origin_as = buf.get_u32();
    let mut raw = [0; ExtComm::LENGTH];
    buf.copy_to_slice(&mut raw);
    let target = ExtComm::from_bytes(raw);

    Ok(RouteTargetNlri {
        origin_as,
        target: Some(target),
    })
}

// ===== helper functions =====

fn decode_vpn_prefix_hdr(
    buf: &mut Bytes,
) -> DecodeResult<(RouteDistinguisher, LabelStack, u8)> {
    if buf.remaining() < 1 {
        return Err(UpdateMessageError::InvalidNetworkField.into());
    }

    let plen = buf.get_u8() as usize;
    let plen_wire = plen.div_ceil(8);
    if plen_wire > buf.remaining() {
        return Err(UpdateMessageError::InvalidNetworkField.into());
    }

    let labels = LabelStack::decode(buf, plen_wire);
    let overhead = 8 * (labels.wire_len() + RouteDistinguisher::LEN);
    if plen < overhead {
        return Err(UpdateMessageError::InvalidNetworkField.into());
    }
    let rd = RouteDistinguisher::decode(buf)?;

    Ok((rd, labels, (plen - overhead) as u8))
}

fn decode_labeled_prefix_hdr(
    buf: &mut Bytes,
) -> DecodeResult<(LabelStack, u8)> {
    if buf.remaining() < 1 {
        return Err(UpdateMessageError::InvalidNetworkField.into());
    }

    let plen = buf.get_u8() as usize;
    let plen_wire = plen.div_ceil(8);
    if plen_wire > buf.remaining() {
        return Err(UpdateMessageError::InvalidNetworkField.into());
    }

    let labels = LabelStack::decode(buf, plen_wire);
    let overhead = 8 * labels.wire_len();
    if plen < overhead {
        return Err(UpdateMessageError::InvalidNetworkField.into());
    }

    Ok((labels, (plen - overhead) as u8))
}

fn decode_prefix_addr_ipv4(
    buf: &mut Bytes,
    plen: u8,
) -> DecodeResult<Ipv4Network> {
    let plen_wire = prefix_wire_len(plen);
    if plen_wire > buf.remaining() || plen > Ipv4Network::MAX_PREFIXLEN {
        return Err(UpdateMessageError::InvalidNetworkField.into());
    }

    let mut prefix_bytes = [0; Ipv4Addr::LENGTH];
    buf.copy_to_slice(&mut prefix_bytes[..plen_wire]);
    let prefix = Ipv4Addr::from(prefix_bytes);
    Ipv4Network::new(prefix, plen)
        .map(|prefix| prefix.apply_mask())
        .map_err(|_| UpdateMessageError::InvalidNetworkField.into())
}

fn decode_prefix_addr_ipv6(
    buf: &mut Bytes,
    plen: u8,
) -> DecodeResult<Ipv6Network> {
    let plen_wire = prefix_wire_len(plen);
    if plen_wire > buf.remaining() || plen > Ipv6Network::MAX_PREFIXLEN {
        return Err(UpdateMessageError::InvalidNetworkField.into());
    }

    let mut prefix_bytes = [0; Ipv6Addr::LENGTH];
    buf.copy_to_slice(&mut prefix_bytes[..plen_wire]);
    let prefix = Ipv6Addr::from(prefix_bytes);
    Ipv6Network::new(prefix, plen)
        .map(|prefix| prefix.apply_mask())
        .map_err(|_| UpdateMessageError::InvalidNetworkField.into())
}
