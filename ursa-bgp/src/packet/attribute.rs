//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use ursa_utils::bgp::{Comm, ExtComm};
use ursa_utils::bytes::{BytesExt, BytesMutExt};
use ursa_utils::ip::{Ipv4AddrExt, Ipv6AddrExt};

use crate::debug::Debug;
use crate::neighbor::PeerType;
use crate::packet::consts::{
    Afi, AsPathSegmentType, AttrFlags, AttrType, Origin, Safi,
};
use crate::packet::error::{AttrError, UpdateMessageError};
use crate::packet::message::{
    DecodeCxt, EncodeCxt, MpReachNlri, MpUnreachNlri, ReachNlri,
    decode_ipv4_prefix, decode_ipv6_prefix, encode_ipv4_prefix,
    encode_ipv6_prefix,
};
use crate::packet::nlri::{
    decode_labeled_ipv4_prefix, decode_labeled_ipv6_prefix,
    decode_route_target_prefix, decode_vpn_ipv4_prefix,
    decode_vpn_ipv6_prefix, encode_labeled_ipv4_prefix,
    encode_labeled_ipv6_prefix, encode_route_target_prefix,
    encode_vpn_ipv4_prefix, encode_vpn_ipv6_prefix,
};

pub const ATTR_MIN_LEN: u16 = 3;
pub const ATTR_MIN_LEN_EXT: u16 = 4;

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Attrs {
    pub base: BaseAttrs,
    pub comm: Option<Comms>,
    pub ext_comm: Option<ExtComms>,
    pub unknown: Vec<UnknownAttr>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct BaseAttrs {
    pub origin: Origin,
    pub as_path: AsPath,
    pub as4_path: Option<AsPath>,
    pub med: Option<u32>,
    pub local_pref: Option<u32>,
    pub aggregator: Option<Aggregator>,
    pub as4_aggregator: Option<Aggregator>,
    pub atomic_aggregate: bool,
    pub originator_id: Option<Ipv4Addr>,
    pub cluster_list: Option<ClusterList>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct AsPath {
    pub segments: VecDeque<AsPathSegment>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct AsPathSegment {
    pub seg_type: AsPathSegmentType,
    pub members: VecDeque<u32>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Aggregator {
    pub asn: u32,
    pub identifier: Ipv4Addr,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ClusterList(pub BTreeSet<Ipv4Addr>);

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct CommList<T: CommType>(pub BTreeSet<T>);

pub trait CommType:
    Clone + std::fmt::Debug + Eq + Ord + PartialEq + PartialOrd
{
    const TYPE: AttrType;
    const LENGTH: usize;

    fn encode(&self, buf: &mut BytesMut);
    fn decode(buf: &mut Bytes) -> Self;
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(new)]
#[derive(Deserialize, Serialize)]
pub struct UnknownAttr {
    pub attr_type: u8,
    pub flags: AttrFlags,
    pub length: u16,
    pub value: Bytes,
}

// Useful type definitions.
pub type Comms = CommList<Comm>;
pub type ExtComms = CommList<ExtComm>;

// ===== impl Attrs =====

impl Attrs {
    pub(crate) fn encode(
        &self,
        buf: &mut BytesMut,
        reach: &Option<ReachNlri>,
        mp_reach: &Option<MpReachNlri>,
        mp_unreach: &Option<MpUnreachNlri>,
        cxt: &EncodeCxt,
    ) {
        // Check whether the 4-octet AS number capability has been negotiated.
        let four_byte_asn_cap = cxt
            .capabilities
            .iter()
            .any(|cap| cap.is_four_octet_as_number());

        // RFC 7606 - Section 5.1:
        // "The MP_REACH_NLRI or MP_UNREACH_NLRI attribute (if present) SHALL
        // be encoded as the very first path attribute in an UPDATE message".
        if let Some(mp_reach) = mp_reach {
            mp_reach.encode(buf);
        }
        if let Some(mp_unreach) = mp_unreach {
            mp_unreach.encode(buf);
        }

        // RFC 4271 - Section 5:
        // "The sender of an UPDATE message SHOULD order path attributes
        // within the UPDATE message in ascending order of attribute type".

        // ORIGIN attribute.
        origin::encode(self.base.origin, buf);

        // AS_PATH attribute.
        self.base.as_path.encode(
            buf,
            AttrFlags::TRANSITIVE,
            AttrType::AsPath,
            four_byte_asn_cap,
        );

        // NEXT_HOP attribute.
        if let Some(reach) = reach {
            nexthop::encode(reach.nexthop, buf);
        }

        // MULTI_EXIT_DISC attribute.
        if let Some(metric) = self.base.med {
            med::encode(metric, buf);
        }

        // LOCAL_PREF attribute.
        if let Some(local_pref) = self.base.local_pref {
            local_pref::encode(local_pref, buf);
        }

        // ATOMIC_AGGREGATE attribute.
        if self.base.atomic_aggregate {
            atomic_aggregate::encode(buf);
        }

        // AGGREGATOR attribute.
        if let Some(aggregator) = &self.base.aggregator {
            aggregator.encode(
                buf,
                AttrFlags::TRANSITIVE | AttrFlags::OPTIONAL,
                AttrType::Aggregator,
                four_byte_asn_cap,
            );
        }

        // COMMUNITIES attribute.
        if let Some(comm) = &self.comm {
            comm.encode(buf);
        }

        // ORIGINATOR_ID attribute.
        if let Some(originator_id) = self.base.originator_id {
            originator_id::encode(originator_id, buf);
        }

        // CLUSTER_LIST attribute.
        if let Some(cluster_list) = &self.base.cluster_list {
            cluster_list.encode(buf);
        }

        // EXTENDED COMMUNITIES attribute.
        if let Some(ext_comm) = &self.ext_comm {
            ext_comm.encode(buf);
        }

        // AS4_PATH attribute.
        if let Some(as4_path) = &self.base.as4_path {
            as4_path.encode(
                buf,
                AttrFlags::TRANSITIVE | AttrFlags::OPTIONAL,
                AttrType::As4Path,
                true,
            );
        }

        // AS4_AGGREGATOR attribute.
        if let Some(as4_aggregator) = &self.base.as4_aggregator {
            as4_aggregator.encode(
                buf,
                AttrFlags::TRANSITIVE | AttrFlags::OPTIONAL,
                AttrType::As4Aggregator,
                true,
            );
        }

        // Unrecognized attributes are propagated verbatim.
        for attr in &self.unknown {
            attr.encode(buf);
        }
    }

    pub(crate) fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        nexthop: &mut Option<Ipv4Addr>,
        nlri_present: bool,
        mp_unreach: &mut Option<MpUnreachNlri>,
        mp_reach: &mut Option<MpReachNlri>,
    ) -> Result<Option<Self>, UpdateMessageError> {
        let mut origin = None;
        let mut as_path = None;
        let mut as4_path = None;
        let mut med = None;
        let mut local_pref = None;
        let mut aggregator = None;
        let mut as4_aggregator = None;
        let mut atomic_aggregate = false;
        let mut originator_id = None;
        let mut cluster_list = None;
        let mut comm = None;
        let mut ext_comm = None;
        let mut unknown = vec![];
        let mut withdraw = false;

        // List of parsed attributes.
        let mut attr_list = HashSet::new();

        // Parse attributes.
        while buf.remaining() > 0 {
            if buf.remaining() < 2 {
                withdraw = true;
                break;
            }

            // Parse attribute flags.
            let attr_flags = buf.get_u8();
            let mut attr_flags = AttrFlags::from_bits_truncate(attr_flags);

            // Parse attribute type.
            let attr_type_raw = buf.get_u8();
            let attr_type = AttrType::from_u8(attr_type_raw);

            // Parse attribute length.
            let attr_len = if attr_flags.contains(AttrFlags::EXTENDED) {
                if buf.remaining() < 2 {
                    withdraw = true;
                    break;
                }
                buf.get_u16() as usize
            } else {
                if buf.remaining() < 1 {
                    withdraw = true;
                    break;
                }
                buf.get_u8() as usize
            };
            if attr_len > buf.remaining() {
                withdraw = true;
                break;
            }
            let mut buf = buf.copy_to_bytes(attr_len);

            // RFC 7606 - Section 3.c:
            // "If the value of either the Optional or Transitive bits in the
            // Attribute Flags is in conflict with their specified values,
            // then the attribute MUST be treated as malformed and the
            // "treat-as-withdraw" approach used".
            if let Some(attr_type) = attr_type
                && (attr_flags & (AttrFlags::OPTIONAL | AttrFlags::TRANSITIVE))
                    != attribute_flags(attr_type)
            {
                withdraw = true;
                continue;
            }

            // RFC 7606 - Section 3.g:
            // "If the MP_REACH_NLRI attribute or the MP_UNREACH_NLRI
            // attribute appears more than once in the UPDATE message, then a
            // NOTIFICATION message MUST be sent with the Error Subcode
            // "Malformed Attribute List". If any other attribute (whether
            // recognized or unrecognized) appears more than once in an
            // UPDATE message, then all the occurrences of the attribute
            // other than the first one SHALL be discarded and the UPDATE
            // message will continue to be processed".
            if !attr_list.insert(attr_type_raw) {
                if matches!(
                    attr_type,
                    Some(AttrType::MpReachNlri | AttrType::MpUnreachNlri)
                ) {
                    return Err(UpdateMessageError::MalformedAttributeList);
                } else {
                    continue;
                }
            }

            // Parse attribute value.
            match attr_type {
                // Known attribute.
                Some(attr_type) => {
                    if let Err(error) = match attr_type {
                        AttrType::Origin => {
                            origin::decode(&mut buf, &mut origin)
                        }
                        AttrType::AsPath => AsPath::decode(
                            &mut buf,
                            cxt,
                            attr_type,
                            four_byte_asn_cap(cxt),
                            &mut as_path,
                        ),
                        AttrType::Nexthop => {
                            nexthop::decode(&mut buf, nexthop)
                        }
                        AttrType::Med => med::decode(&mut buf, &mut med),
                        AttrType::LocalPref => {
                            local_pref::decode(&mut buf, cxt, &mut local_pref)
                        }
                        AttrType::AtomicAggregate => atomic_aggregate::decode(
                            &mut buf,
                            &mut atomic_aggregate,
                        ),
                        AttrType::Aggregator => Aggregator::decode(
                            &mut buf,
                            attr_type,
                            four_byte_asn_cap(cxt),
                            &mut aggregator,
                        ),
                        AttrType::Communities => {
                            Comms::decode(&mut buf, &mut comm)
                        }
                        AttrType::OriginatorId => originator_id::decode(
                            &mut buf,
                            cxt,
                            &mut originator_id,
                        ),
                        AttrType::ClusterList => ClusterList::decode(
                            &mut buf,
                            cxt,
                            &mut cluster_list,
                        ),
                        AttrType::MpReachNlri => {
                            MpReachNlri::decode(&mut buf, mp_reach)
                        }
                        AttrType::MpUnreachNlri => {
                            MpUnreachNlri::decode(&mut buf, mp_unreach)
                        }
                        AttrType::ExtCommunities => {
                            ExtComms::decode(&mut buf, &mut ext_comm)
                        }
                        AttrType::As4Path => AsPath::decode(
                            &mut buf,
                            cxt,
                            attr_type,
                            four_byte_asn_cap(cxt),
                            &mut as4_path,
                        ),
                        AttrType::As4Aggregator => Aggregator::decode(
                            &mut buf,
                            attr_type,
                            four_byte_asn_cap(cxt),
                            &mut as4_aggregator,
                        ),
                    } {
                        // Log malformed attribute.
                        Debug::NbrAttrError(attr_type, error).log();

                        // Process malformed attribute.
                        match error {
                            AttrError::Discard => continue,
                            AttrError::Withdraw => withdraw = true,
                            AttrError::Reset => {
                                return Err(
                                    UpdateMessageError::OptionalAttributeError,
                                );
                            }
                        }
                    }
                }
                // Unknown attribute.
                None => {
                    // RFC 4271 - Section 6.3:
                    // "If any of the well-known mandatory attributes are not
                    // recognized, then the Error Subcode MUST be set to
                    // Unrecognized Well-known Attribute. The Data field MUST
                    // contain the unrecognized attribute (type, length, and
                    // value)".
                    if !attr_flags.contains(AttrFlags::OPTIONAL) {
                        return Err(
                            UpdateMessageError::UnrecognizedWellKnownAttribute,
                        );
                    }

                    // RFC 4271 - Section 9:
                    // "If an optional non-transitive attribute is
                    // unrecognized, it is quietly ignored".
                    if !attr_flags.contains(AttrFlags::TRANSITIVE) {
                        continue;
                    }

                    // RFC 4271 - Section 9:
                    // "If an optional transitive attribute is unrecognized,
                    // the Partial bit in the attribute flags octet is set to
                    // 1, and the attribute is retained for propagation to
                    // other BGP speakers".
                    attr_flags.insert(AttrFlags::PARTIAL);
                    let attr_value = buf.copy_to_bytes(attr_len);
                    unknown.push(UnknownAttr::new(
                        attr_type_raw,
                        attr_flags,
                        attr_len as u16,
                        attr_value,
                    ));
                }
            }
        }

        // Check for missing well-known attributes.
        //
        // RFC 7606 - Section 3.d:
        // "If any of the well-known mandatory attributes are not present in
        //  an UPDATE message, then "treat-as-withdraw" MUST be used".
        let mut attrs = None;
        if !withdraw
            && let Some(origin) = origin
            && let Some(as_path) = as_path
            && (local_pref.is_some() || cxt.peer_type == PeerType::External)
            && (nexthop.is_some() || !nlri_present)
        {
            attrs = Some(Attrs {
                base: BaseAttrs {
                    origin,
                    as_path,
                    as4_path,
                    med,
                    local_pref,
                    aggregator,
                    as4_aggregator,
                    atomic_aggregate,
                    originator_id,
                    cluster_list,
                },
                comm,
                ext_comm,
                unknown,
            });
        }
        Ok(attrs)
    }
}

// ===== ORIGIN attribute =====

mod origin {
    use super::*;
    const LEN: u8 = 1;

    pub(super) fn encode(origin: Origin, buf: &mut BytesMut) {
        buf.put_u8(AttrFlags::TRANSITIVE.bits());
        buf.put_u8(AttrType::Origin as u8);
        buf.put_u8(LEN);
        buf.put_u8(origin as u8);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        origin: &mut Option<Origin>,
    ) -> Result<(), AttrError> {
        if buf.remaining() != LEN as usize {
            return Err(AttrError::Withdraw);
        }

        let value = buf.get_u8();
        match Origin::from_u8(value) {
            Some(value) => {
                *origin = Some(value);
                Ok(())
            }
            None => Err(AttrError::Withdraw),
        }
    }
}

// ===== impl AsPath =====

impl AsPath {
    fn encode(
        &self,
        buf: &mut BytesMut,
        mut attr_flags: AttrFlags,
        attr_type: AttrType,
        four_byte_asns: bool,
    ) {
        attr_flags.insert(AttrFlags::EXTENDED);
        buf.put_u8(attr_flags.bits());
        buf.put_u8(attr_type as u8);

        // The length field will be initialized later.
        let start_pos = buf.len();
        buf.put_u16(0);

        // Encode attribute data.
        for segment in &self.segments {
            segment.encode(buf, four_byte_asns);
        }

        // Rewrite attribute length.
        let attr_len = (buf.len() - start_pos - 2) as u16;
        buf[start_pos..start_pos + 2].copy_from_slice(&attr_len.to_be_bytes());
    }

    fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        attr_type: AttrType,
        four_byte_asn_cap: bool,
        as_path: &mut Option<AsPath>,
    ) -> Result<(), AttrError> {
        if attr_type == AttrType::As4Path && four_byte_asn_cap {
            return Err(AttrError::Discard);
        }

        // Determine the AS number width for this attribute. AS_PATH member
        // width is a per-message property: a value that scans cleanly as
        // 2-octet segments is 2-octet, anything else is 4-octet.
        let four_byte_asns = match attr_type {
            AttrType::As4Path => true,
            _ => !scans_as_two_octet(&buf[..]),
        };

        // Decode AS Path segments.
        let mut segments = VecDeque::new();
        while buf.remaining() > 0 {
            let segment =
                AsPathSegment::decode(buf, attr_type, four_byte_asns)?;
            segments.push_back(segment);
        }
        let value = AsPath { segments };

        // First AS check for eBGP peers.
        if attr_type == AttrType::AsPath
            && cxt.peer_type == PeerType::External
            && value.first() != Some(cxt.peer_as)
        {
            return Err(AttrError::Withdraw);
        }

        *as_path = Some(value);
        Ok(())
    }

    // Returns the neighboring AS of the path: the first member of the first
    // AS_SEQUENCE segment.
    pub fn first(&self) -> Option<u32> {
        self.segments
            .iter()
            .find(|segment| segment.seg_type == AsPathSegmentType::Sequence)
            .and_then(|segment| segment.members.front().copied())
    }
}

impl AsPathSegment {
    fn encode(&self, buf: &mut BytesMut, four_byte_asns: bool) {
        buf.put_u8(self.seg_type as u8);
        buf.put_u8(self.members.len() as u8);
        for member in &self.members {
            encode_asn(buf, *member, four_byte_asns);
        }
    }

    fn decode(
        buf: &mut Bytes,
        attr_type: AttrType,
        four_byte_asns: bool,
    ) -> Result<Self, AttrError> {
        if buf.remaining() < 2 {
            return Err(attr_error(attr_type));
        }

        // Decode segment type.
        let seg_type = buf.get_u8();
        let Some(seg_type) = AsPathSegmentType::from_u8(seg_type) else {
            return Err(attr_error(attr_type));
        };

        // Decode segment length.
        let seg_len = buf.get_u8() as usize;
        let member_len = if four_byte_asns { 4 } else { 2 };
        if seg_len == 0 || buf.remaining() < seg_len * member_len {
            return Err(attr_error(attr_type));
        }

        // Decode segment members.
        let members = (0..seg_len)
            .map(|_| decode_asn(buf, four_byte_asns))
            .collect();
        let segment = AsPathSegment { seg_type, members };

        // RFC 7607's AS 0 processing.
        if segment.contains(0) {
            return Err(attr_error(attr_type));
        }

        Ok(segment)
    }

    fn contains(&self, asn: u32) -> bool {
        self.members.iter().any(|member| asn == *member)
    }
}

// ===== NEXT_HOP attribute =====

pub(crate) mod nexthop {
    use super::*;
    const LEN: u8 = 4;

    pub(super) fn encode(addr: Ipv4Addr, buf: &mut BytesMut) {
        buf.put_u8(AttrFlags::TRANSITIVE.bits());
        buf.put_u8(AttrType::Nexthop as u8);
        buf.put_u8(LEN);
        buf.put_ipv4(&addr);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        nexthop: &mut Option<Ipv4Addr>,
    ) -> Result<(), AttrError> {
        if buf.remaining() != LEN as usize {
            return Err(AttrError::Withdraw);
        }

        let value = buf.get_ipv4();
        *nexthop = Some(value);
        Ok(())
    }
}

// ===== MULTI_EXIT_DISC attribute =====

mod med {
    use super::*;
    const LEN: u8 = 4;

    pub(super) fn encode(metric: u32, buf: &mut BytesMut) {
        buf.put_u8(AttrFlags::OPTIONAL.bits());
        buf.put_u8(AttrType::Med as u8);
        buf.put_u8(LEN);
        buf.put_u32(metric);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        med: &mut Option<u32>,
    ) -> Result<(), AttrError> {
        if buf.remaining() != LEN as usize {
            return Err(AttrError::Withdraw);
        }

        let value = buf.get_u32();
        *med = Some(value);
        Ok(())
    }
}

// ===== LOCAL_PREF attribute =====

mod local_pref {
    use super::*;
    const LEN: u8 = 4;

    pub(super) fn encode(local_pref: u32, buf: &mut BytesMut) {
        buf.put_u8(AttrFlags::TRANSITIVE.bits());
        buf.put_u8(AttrType::LocalPref as u8);
        buf.put_u8(LEN);
        buf.put_u32(local_pref);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        local_pref: &mut Option<u32>,
    ) -> Result<(), AttrError> {
        if cxt.peer_type == PeerType::External {
            return Err(AttrError::Discard);
        }

        if buf.remaining() != LEN as usize {
            return Err(AttrError::Withdraw);
        }

        let value = buf.get_u32();
        *local_pref = Some(value);
        Ok(())
    }
}

// ===== ATOMIC_AGGREGATE attribute =====

mod atomic_aggregate {
    use super::*;
    const LEN: u8 = 0;

    pub(super) fn encode(buf: &mut BytesMut) {
        buf.put_u8(AttrFlags::TRANSITIVE.bits());
        buf.put_u8(AttrType::AtomicAggregate as u8);
        buf.put_u8(LEN);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        atomic_aggregate: &mut bool,
    ) -> Result<(), AttrError> {
        if buf.remaining() != LEN as usize {
            return Err(AttrError::Discard);
        }

        *atomic_aggregate = true;
        Ok(())
    }
}

// ===== impl Aggregator =====

impl Aggregator {
    fn encode(
        &self,
        buf: &mut BytesMut,
        attr_flags: AttrFlags,
        attr_type: AttrType,
        four_byte_asns: bool,
    ) {
        buf.put_u8(attr_flags.bits());
        buf.put_u8(attr_type as u8);

        // The length field will be initialized later.
        let start_pos = buf.len();
        buf.put_u8(0);

        // Encode attribute data.
        encode_asn(buf, self.asn, four_byte_asns);
        buf.put_ipv4(&self.identifier);

        // Rewrite attribute length.
        let attr_len = buf.len() - start_pos - 1;
        buf[start_pos] = attr_len as u8;
    }

    fn decode(
        buf: &mut Bytes,
        attr_type: AttrType,
        four_byte_asn_cap: bool,
        aggregator: &mut Option<Self>,
    ) -> Result<(), AttrError> {
        if attr_type == AttrType::As4Aggregator && four_byte_asn_cap {
            return Err(AttrError::Discard);
        }

        // The AS number width is implied by the attribute length.
        let four_byte_asns = match buf.remaining() {
            6 => false,
            8 => true,
            _ => return Err(AttrError::Discard),
        };

        let asn = decode_asn(buf, four_byte_asns);
        let identifier = buf.get_ipv4();

        // RFC 7607's AS 0 processing.
        if asn == 0 {
            return Err(AttrError::Discard);
        }

        *aggregator = Some(Aggregator { asn, identifier });
        Ok(())
    }
}

// ===== ORIGINATOR_ID attribute =====

mod originator_id {
    use super::*;
    const LEN: u8 = 4;

    pub(super) fn encode(originator_id: Ipv4Addr, buf: &mut BytesMut) {
        buf.put_u8(AttrFlags::OPTIONAL.bits());
        buf.put_u8(AttrType::OriginatorId as u8);
        buf.put_u8(LEN);
        buf.put_ipv4(&originator_id);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        originator_id: &mut Option<Ipv4Addr>,
    ) -> Result<(), AttrError> {
        if cxt.peer_type == PeerType::External {
            return Err(AttrError::Discard);
        }

        if buf.remaining() != LEN as usize {
            return Err(AttrError::Withdraw);
        }

        let value = buf.get_ipv4();
        *originator_id = Some(value);
        Ok(())
    }
}

// ===== impl ClusterList =====

impl ClusterList {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8((AttrFlags::OPTIONAL | AttrFlags::EXTENDED).bits());
        buf.put_u8(AttrType::ClusterList as u8);

        // The length field will be initialized later.
        let start_pos = buf.len();
        buf.put_u16(0);

        // Encode attribute data.
        for cluster_id in &self.0 {
            buf.put_ipv4(cluster_id);
        }

        // Rewrite attribute length.
        let attr_len = (buf.len() - start_pos - 2) as u16;
        buf[start_pos..start_pos + 2].copy_from_slice(&attr_len.to_be_bytes());
    }

    fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        cluster_list: &mut Option<Self>,
    ) -> Result<(), AttrError> {
        if cxt.peer_type == PeerType::External {
            return Err(AttrError::Discard);
        }

        if buf.remaining() == 0 || buf.remaining() % 4 != 0 {
            return Err(AttrError::Withdraw);
        }

        let mut list = BTreeSet::new();
        while buf.remaining() > 0 {
            let cluster_id = buf.get_ipv4();
            list.insert(cluster_id);
        }

        *cluster_list = Some(ClusterList(list));
        Ok(())
    }
}

// ===== impl MpReachNlri =====

impl MpReachNlri {
    pub const MIN_LEN: u16 = 5;

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8((AttrFlags::OPTIONAL | AttrFlags::EXTENDED).bits());
        buf.put_u8(AttrType::MpReachNlri as u8);

        // The length field will be initialized later.
        let start_pos = buf.len();
        buf.put_u16(0);

        // Encode attribute data.
        match self {
            MpReachNlri::Ipv4Unicast { prefixes, nexthop } => {
                buf.put_u16(Afi::Ipv4 as u16);
                buf.put_u8(Safi::Unicast as u8);
                buf.put_u8(Ipv4Addr::LENGTH as u8);
                buf.put_ipv4(nexthop);
                buf.put_u8(0);
                for prefix in prefixes {
                    encode_ipv4_prefix(buf, prefix);
                }
            }
            MpReachNlri::Ipv6Unicast {
                prefixes,
                nexthop,
                ll_nexthop,
            } => {
                buf.put_u16(Afi::Ipv6 as u16);
                buf.put_u8(Safi::Unicast as u8);
                if let Some(ll_nexthop) = ll_nexthop {
                    buf.put_u8((Ipv6Addr::LENGTH * 2) as u8);
                    buf.put_ipv6(nexthop);
                    buf.put_ipv6(ll_nexthop);
                } else {
                    buf.put_u8(Ipv6Addr::LENGTH as u8);
                    buf.put_ipv6(nexthop);
                }
                buf.put_u8(0);
                for prefix in prefixes {
                    encode_ipv6_prefix(buf, prefix);
                }
            }
            MpReachNlri::Ipv4Vpn { prefixes, nexthop } => {
                buf.put_u16(Afi::Ipv4 as u16);
                buf.put_u8(Safi::LabeledVpn as u8);
                // The next-hop is preceded by an all-zeroes RD (RFC 4364).
                buf.put_u8((8 + Ipv4Addr::LENGTH) as u8);
                buf.put_u64(0);
                buf.put_ipv4(nexthop);
                buf.put_u8(0);
                for prefix in prefixes {
                    encode_vpn_ipv4_prefix(buf, prefix);
                }
            }
            MpReachNlri::Ipv6Vpn { prefixes, nexthop } => {
                buf.put_u16(Afi::Ipv6 as u16);
                buf.put_u8(Safi::LabeledVpn as u8);
                buf.put_u8((8 + Ipv6Addr::LENGTH) as u8);
                buf.put_u64(0);
                buf.put_ipv6(nexthop);
                buf.put_u8(0);
                for prefix in prefixes {
                    encode_vpn_ipv6_prefix(buf, prefix);
                }
            }
            MpReachNlri::Ipv4LabeledUnicast { prefixes, nexthop } => {
                buf.put_u16(Afi::Ipv4 as u16);
                buf.put_u8(Safi::LabeledUnicast as u8);
                buf.put_u8(Ipv4Addr::LENGTH as u8);
                buf.put_ipv4(nexthop);
                buf.put_u8(0);
                for prefix in prefixes {
                    encode_labeled_ipv4_prefix(buf, prefix);
                }
            }
            MpReachNlri::Ipv6LabeledUnicast { prefixes, nexthop } => {
                buf.put_u16(Afi::Ipv6 as u16);
                buf.put_u8(Safi::LabeledUnicast as u8);
                buf.put_u8(Ipv6Addr::LENGTH as u8);
                buf.put_ipv6(nexthop);
                buf.put_u8(0);
                for prefix in prefixes {
                    encode_labeled_ipv6_prefix(buf, prefix);
                }
            }
            MpReachNlri::RouteTarget { prefixes, nexthop } => {
                buf.put_u16(Afi::Ipv4 as u16);
                buf.put_u8(Safi::RouteTarget as u8);
                match nexthop {
                    IpAddr::V4(nexthop) => {
                        buf.put_u8(Ipv4Addr::LENGTH as u8);
                        buf.put_ipv4(nexthop);
                    }
                    IpAddr::V6(nexthop) => {
                        buf.put_u8(Ipv6Addr::LENGTH as u8);
                        buf.put_ipv6(nexthop);
                    }
                }
                buf.put_u8(0);
                for prefix in prefixes {
                    encode_route_target_prefix(buf, prefix);
                }
            }
        }

        // Rewrite attribute length.
        let attr_len = (buf.len() - start_pos - 2) as u16;
        buf[start_pos..start_pos + 2].copy_from_slice(&attr_len.to_be_bytes());
    }

    fn decode(
        buf: &mut Bytes,
        mp_reach: &mut Option<Self>,
    ) -> Result<(), AttrError> {
        if buf.remaining() < Self::MIN_LEN as usize {
            return Err(AttrError::Reset);
        }

        // Parse AFI.
        let afi = buf.get_u16();
        let Some(afi) = Afi::from_u16(afi) else {
            // Ignore unknown AFI.
            return Err(AttrError::Discard);
        };

        // Parse SAFI.
        let safi = buf.get_u8();
        let Some(safi) = Safi::from_u8(safi) else {
            // Ignore unknown SAFI.
            return Err(AttrError::Discard);
        };

        match (afi, safi) {
            (Afi::Ipv4, Safi::Unicast) => {
                let nexthop = decode_nexthop_ipv4(buf, 0)?;
                let mut prefixes = Vec::new();
                let _reserved = buf.get_u8();
                while buf.remaining() > 0 {
                    if let Some(prefix) =
                        decode_ipv4_prefix(buf).map_err(|_| AttrError::Reset)?
                    {
                        prefixes.push(prefix);
                    }
                }

                *mp_reach =
                    Some(MpReachNlri::Ipv4Unicast { prefixes, nexthop });
            }
            (Afi::Ipv6, Safi::Unicast) => {
                let mut prefixes = Vec::new();
                let mut ll_nexthop = None;

                // Parse nexthop(s).
                let nexthop_len = buf.get_u8() as usize;
                if (nexthop_len != Ipv6Addr::LENGTH
                    && nexthop_len != Ipv6Addr::LENGTH * 2)
                    || nexthop_len + 1 > buf.remaining()
                {
                    return Err(AttrError::Reset);
                }
                let nexthop = buf.get_ipv6();
                if nexthop_len == Ipv6Addr::LENGTH * 2 {
                    ll_nexthop = Some(buf.get_ipv6());
                }

                // Parse prefixes.
                let _reserved = buf.get_u8();
                while buf.remaining() > 0 {
                    if let Some(prefix) =
                        decode_ipv6_prefix(buf).map_err(|_| AttrError::Reset)?
                    {
                        prefixes.push(prefix);
                    }
                }

                *mp_reach = Some(MpReachNlri::Ipv6Unicast {
                    prefixes,
                    nexthop,
                    ll_nexthop,
                });
            }
            (Afi::Ipv4, Safi::LabeledVpn) => {
                let nexthop = decode_nexthop_ipv4(buf, 8)?;
                let mut prefixes = Vec::new();
                let _reserved = buf.get_u8();
                while buf.remaining() > 0 {
                    let prefix = decode_vpn_ipv4_prefix(buf)
                        .map_err(|_| AttrError::Reset)?;
                    prefixes.push(prefix);
                }

                *mp_reach = Some(MpReachNlri::Ipv4Vpn { prefixes, nexthop });
            }
            (Afi::Ipv6, Safi::LabeledVpn) => {
                let nexthop = decode_nexthop_ipv6(buf, 8)?;
                let mut prefixes = Vec::new();
                let _reserved = buf.get_u8();
                while buf.remaining() > 0 {
                    let prefix = decode_vpn_ipv6_prefix(buf)
                        .map_err(|_| AttrError::Reset)?;
                    prefixes.push(prefix);
                }

                *mp_reach = Some(MpReachNlri::Ipv6Vpn { prefixes, nexthop });
            }
            (Afi::Ipv4, Safi::LabeledUnicast) => {
                let nexthop = decode_nexthop_ipv4(buf, 0)?;
                let mut prefixes = Vec::new();
                let _reserved = buf.get_u8();
                while buf.remaining() > 0 {
                    let prefix = decode_labeled_ipv4_prefix(buf)
                        .map_err(|_| AttrError::Reset)?;
                    prefixes.push(prefix);
                }

                *mp_reach = Some(MpReachNlri::Ipv4LabeledUnicast {
                    prefixes,
                    nexthop,
                });
            }
            (Afi::Ipv6, Safi::LabeledUnicast) => {
                let nexthop = decode_nexthop_ipv6(buf, 0)?;
                let mut prefixes = Vec::new();
                let _reserved = buf.get_u8();
                while buf.remaining() > 0 {
                    let prefix = decode_labeled_ipv6_prefix(buf)
                        .map_err(|_| AttrError::Reset)?;
                    prefixes.push(prefix);
                }

                *mp_reach = Some(MpReachNlri::Ipv6LabeledUnicast {
                    prefixes,
                    nexthop,
                });
            }
            (Afi::Ipv4, Safi::RouteTarget) => {
                // Parse nexthop.
                let nexthop_len = buf.get_u8() as usize;
                if nexthop_len + 1 > buf.remaining() {
                    return Err(AttrError::Reset);
                }
                let nexthop = match nexthop_len {
                    4 => IpAddr::V4(buf.get_ipv4()),
                    16 => IpAddr::V6(buf.get_ipv6()),
                    _ => return Err(AttrError::Reset),
                };

                // Parse prefixes.
                let mut prefixes = Vec::new();
                let _reserved = buf.get_u8();
                while buf.remaining() > 0 {
                    let prefix = decode_route_target_prefix(buf)
                        .map_err(|_| AttrError::Reset)?;
                    prefixes.push(prefix);
                }

                *mp_reach = Some(MpReachNlri::RouteTarget { prefixes, nexthop });
            }
            // Ignore unsupported route family.
            _ => return Err(AttrError::Discard),
        }

        Ok(())
    }
}

// ===== impl MpUnreachNlri =====

impl MpUnreachNlri {
    pub const MIN_LEN: u16 = 3;

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8((AttrFlags::OPTIONAL | AttrFlags::EXTENDED).bits());
        buf.put_u8(AttrType::MpUnreachNlri as u8);

        // The length field will be initialized later.
        let start_pos = buf.len();
        buf.put_u16(0);

        // Encode attribute data.
        match self {
            MpUnreachNlri::Ipv4Unicast { prefixes } => {
                buf.put_u16(Afi::Ipv4 as u16);
                buf.put_u8(Safi::Unicast as u8);
                for prefix in prefixes {
                    encode_ipv4_prefix(buf, prefix);
                }
            }
            MpUnreachNlri::Ipv6Unicast { prefixes } => {
                buf.put_u16(Afi::Ipv6 as u16);
                buf.put_u8(Safi::Unicast as u8);
                for prefix in prefixes {
                    encode_ipv6_prefix(buf, prefix);
                }
            }
            MpUnreachNlri::Ipv4Vpn { prefixes } => {
                buf.put_u16(Afi::Ipv4 as u16);
                buf.put_u8(Safi::LabeledVpn as u8);
                for prefix in prefixes {
                    encode_vpn_ipv4_prefix(buf, prefix);
                }
            }
            MpUnreachNlri::Ipv6Vpn { prefixes } => {
                buf.put_u16(Afi::Ipv6 as u16);
                buf.put_u8(Safi::LabeledVpn as u8);
                for prefix in prefixes {
                    encode_vpn_ipv6_prefix(buf, prefix);
                }
            }
            MpUnreachNlri::Ipv4LabeledUnicast { prefixes } => {
                buf.put_u16(Afi::Ipv4 as u16);
                buf.put_u8(Safi::LabeledUnicast as u8);
                for prefix in prefixes {
                    encode_labeled_ipv4_prefix(buf, prefix);
                }
            }
            MpUnreachNlri::Ipv6LabeledUnicast { prefixes } => {
                buf.put_u16(Afi::Ipv6 as u16);
                buf.put_u8(Safi::LabeledUnicast as u8);
                for prefix in prefixes {
                    encode_labeled_ipv6_prefix(buf, prefix);
                }
            }
            MpUnreachNlri::RouteTarget { prefixes } => {
                buf.put_u16(Afi::Ipv4 as u16);
                buf.put_u8(Safi::RouteTarget as u8);
                for prefix in prefixes {
                    encode_route_target_prefix(buf, prefix);
                }
            }
        }

        // Rewrite attribute length.
        let attr_len = (buf.len() - start_pos - 2) as u16;
        buf[start_pos..start_pos + 2].copy_from_slice(&attr_len.to_be_bytes());
    }

    fn decode(
        buf: &mut Bytes,
        mp_unreach: &mut Option<Self>,
    ) -> Result<(), AttrError> {
        if buf.remaining() < Self::MIN_LEN as usize {
            return Err(AttrError::Reset);
        }

        // Parse AFI.
        let afi = buf.get_u16();
        let Some(afi) = Afi::from_u16(afi) else {
            // Ignore unknown AFI.
            return Err(AttrError::Discard);
        };

        // Parse SAFI.
        let safi = buf.get_u8();
        let Some(safi) = Safi::from_u8(safi) else {
            // Ignore unknown SAFI.
            return Err(AttrError::Discard);
        };

        // Parse prefixes.
        match (afi, safi) {
            (Afi::Ipv4, Safi::Unicast) => {
                let mut prefixes = Vec::new();
                while buf.remaining() > 0 {
                    if let Some(prefix) =
                        decode_ipv4_prefix(buf).map_err(|_| AttrError::Reset)?
                    {
                        prefixes.push(prefix);
                    }
                }
                *mp_unreach = Some(MpUnreachNlri::Ipv4Unicast { prefixes });
            }
            (Afi::Ipv6, Safi::Unicast) => {
                let mut prefixes = Vec::new();
                while buf.remaining() > 0 {
                    if let Some(prefix) =
                        decode_ipv6_prefix(buf).map_err(|_| AttrError::Reset)?
                    {
                        prefixes.push(prefix);
                    }
                }
                *mp_unreach = Some(MpUnreachNlri::Ipv6Unicast { prefixes });
            }
            (Afi::Ipv4, Safi::LabeledVpn) => {
                let mut prefixes = Vec::new();
                while buf.remaining() > 0 {
                    let prefix = decode_vpn_ipv4_prefix(buf)
                        .map_err(|_| AttrError::Reset)?;
                    prefixes.push(prefix);
                }
                *mp_unreach = Some(MpUnreachNlri::Ipv4Vpn { prefixes });
            }
            (Afi::Ipv6, Safi::LabeledVpn) => {
                let mut prefixes = Vec::new();
                while buf.remaining() > 0 {
                    let prefix = decode_vpn_ipv6_prefix(buf)
                        .map_err(|_| AttrError::Reset)?;
                    prefixes.push(prefix);
                }
                *mp_unreach = Some(MpUnreachNlri::Ipv6Vpn { prefixes });
            }
            (Afi::Ipv4, Safi::LabeledUnicast) => {
                let mut prefixes = Vec::new();
                while buf.remaining() > 0 {
                    let prefix = decode_labeled_ipv4_prefix(buf)
                        .map_err(|_| AttrError::Reset)?;
                    prefixes.push(prefix);
                }
                *mp_unreach =
                    Some(MpUnreachNlri::Ipv4LabeledUnicast { prefixes });
            }
            (Afi::Ipv6, Safi::LabeledUnicast) => {
                let mut prefixes = Vec::new();
                while buf.remaining() > 0 {
                    let prefix = decode_labeled_ipv6_prefix(buf)
                        .map_err(|_| AttrError::Reset)?;
                    prefixes.push(prefix);
                }
                *mp_unreach =
                    Some(MpUnreachNlri::Ipv6LabeledUnicast { prefixes });
            }
            (Afi::Ipv4, Safi::RouteTarget) => {
                let mut prefixes = Vec::new();
                while buf.remaining() > 0 {
                    let prefix = decode_route_target_prefix(buf)
                        .map_err(|_| AttrError::Reset)?;
                    prefixes.push(prefix);
                }
                *mp_unreach = Some(MpUnreachNlri::RouteTarget { prefixes });
            }
            // Ignore unsupported route family.
            _ => return Err(AttrError::Discard),
        }

        Ok(())
    }
}

// ===== impl Comm =====

impl CommType for Comm {
    const TYPE: AttrType = AttrType::Communities;
    const LENGTH: usize = 4;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.0);
    }

    fn decode(buf: &mut Bytes) -> Self {
        let value = buf.get_u32();
        Self(value)
    }
}

// ===== impl ExtComm =====

impl CommType for ExtComm {
    const TYPE: AttrType = AttrType::ExtCommunities;
    const LENGTH: usize = ExtComm::LENGTH;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.to_bytes());
    }

    fn decode(buf: &mut Bytes) -> Self {
        let mut raw = [0; ExtComm::LENGTH];
        buf.copy_to_slice(&mut raw);
        ExtComm::from_bytes(raw)
    }
}

// ===== impl CommList =====

impl<T: CommType> CommList<T> {
    fn encode(&self, buf: &mut BytesMut) {
        let attr_flags =
            AttrFlags::TRANSITIVE | AttrFlags::OPTIONAL | AttrFlags::EXTENDED;
        buf.put_u8(attr_flags.bits());
        buf.put_u8(T::TYPE as u8);

        // The length field will be initialized later.
        let start_pos = buf.len();
        buf.put_u16(0);

        // Encode attribute data.
        for value in &self.0 {
            value.encode(buf);
        }

        // Rewrite attribute length.
        let attr_len = (buf.len() - start_pos - 2) as u16;
        buf[start_pos..start_pos + 2].copy_from_slice(&attr_len.to_be_bytes());
    }

    fn decode(
        buf: &mut Bytes,
        comm: &mut Option<Self>,
    ) -> Result<(), AttrError> {
        if buf.remaining() == 0 || buf.remaining() % T::LENGTH != 0 {
            return Err(AttrError::Withdraw);
        }

        let mut list = BTreeSet::new();
        while buf.remaining() >= T::LENGTH {
            let value = T::decode(buf);
            list.insert(value);
        }

        *comm = Some(CommList(list));
        Ok(())
    }
}

// ===== impl UnknownAttr =====

impl UnknownAttr {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.flags.bits());
        buf.put_u8(self.attr_type);
        if self.flags.contains(AttrFlags::EXTENDED) {
            buf.put_u16(self.length);
        } else {
            buf.put_u8(self.length as u8);
        }
        buf.put_slice(&self.value);
    }
}

// ===== helper functions =====

fn attribute_flags(attr_type: AttrType) -> AttrFlags {
    match attr_type {
        // Well-known.
        AttrType::Origin
        | AttrType::AsPath
        | AttrType::Nexthop
        | AttrType::LocalPref
        | AttrType::AtomicAggregate => AttrFlags::TRANSITIVE,

        // Optional non-transitive.
        AttrType::Med
        | AttrType::OriginatorId
        | AttrType::ClusterList
        | AttrType::MpReachNlri
        | AttrType::MpUnreachNlri => AttrFlags::OPTIONAL,

        // Optional transitive.
        AttrType::Aggregator
        | AttrType::Communities
        | AttrType::ExtCommunities
        | AttrType::As4Path
        | AttrType::As4Aggregator => {
            AttrFlags::TRANSITIVE | AttrFlags::OPTIONAL
        }
    }
}

fn four_byte_asn_cap(cxt: &DecodeCxt) -> bool {
    cxt.capabilities
        .iter()
        .any(|cap| cap.is_four_octet_as_number())
}

// Checks whether the raw AS_PATH value parses cleanly as a sequence of
// 2-octet segments.
fn scans_as_two_octet(mut data: &[u8]) -> bool {
    while !data.is_empty() {
        if data.len() < 2 {
            return false;
        }
        let seg_type = data[0];
        let seg_len = data[1] as usize;
        if seg_type == 0 || seg_type > 4 {
            return false;
        }
        data = &data[2..];
        if data.len() < seg_len * 2 {
            return false;
        }
        data = &data[seg_len * 2..];
    }
    true
}

fn attr_error(attr_type: AttrType) -> AttrError {
    if attr_type == AttrType::AsPath {
        AttrError::Withdraw
    } else {
        AttrError::Discard
    }
}

fn encode_asn(buf: &mut BytesMut, asn: u32, four_byte_asns: bool) {
    if four_byte_asns {
        buf.put_u32(asn)
    } else {
        buf.put_u16(asn as u16)
    }
}

fn decode_asn(buf: &mut Bytes, four_byte_asns: bool) -> u32 {
    if four_byte_asns {
        buf.get_u32()
    } else {
        buf.get_u16() as u32
    }
}

fn decode_nexthop_ipv4(
    buf: &mut Bytes,
    skip: usize,
) -> Result<Ipv4Addr, AttrError> {
    let nexthop_len = buf.get_u8() as usize;
    if nexthop_len != skip + Ipv4Addr::LENGTH
        || nexthop_len + 1 > buf.remaining()
    {
        return Err(AttrError::Reset);
    }
    buf.advance(skip);
    Ok(buf.get_ipv4())
}

fn decode_nexthop_ipv6(
    buf: &mut Bytes,
    skip: usize,
) -> Result<Ipv6Addr, AttrError> {
    let nexthop_len = buf.get_u8() as usize;
    if nexthop_len != skip + Ipv6Addr::LENGTH
        || nexthop_len + 1 > buf.remaining()
    {
        return Err(AttrError::Reset);
    }
    buf.advance(skip);
    Ok(buf.get_ipv6())
}
