//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! BGP Monitoring Protocol (RFC 7854) decoding.
//!
//! BMP is a read-only observation channel: this module only decodes
//! messages produced by a monitored router.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bitflags::bitflags;
use bytes::{Buf, Bytes};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use ursa_utils::bytes::BytesExt;

use crate::packet::error::DecodeError;
use crate::packet::message::{DecodeCxt, Message};
use crate::packet::nlri::RouteDistinguisher;

pub const BMP_VERSION: u8 = 3;

// BMP Message Types.
//
// IANA registry:
// https://www.iana.org/assignments/bmp-parameters/bmp-parameters.xhtml#message-types
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum BmpMessageType {
    RouteMonitoring = 0,
    StatisticsReport = 1,
    PeerDownNotification = 2,
    PeerUpNotification = 3,
    Initiation = 4,
    Termination = 5,
}

// BMP Statistics Types.
//
// IANA registry:
// https://www.iana.org/assignments/bmp-parameters/bmp-parameters.xhtml#statistics-types
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum BmpStatsType {
    Rejected = 0,
    DuplicatePrefix = 1,
    DuplicateWithdraw = 2,
    InvalidClusterListLoop = 3,
    InvalidAsPathLoop = 4,
    InvalidOriginatorId = 5,
    InvalidAsConfedLoop = 6,
    AdjRibIn = 7,
    LocRib = 8,
}

// Reason codes of the Peer Down notification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum PeerDownReasonCode {
    LocalNotification = 1,
    LocalNoNotification = 2,
    RemoteNotification = 3,
    RemoteNoNotification = 4,
}

// BMP per-peer header flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct PeerFlags: u8 {
        const V = 0x80;
        const L = 0x40;
        const A = 0x20;
    }
}

//
// BMP message: 6-octet common header, optional 42-octet per-peer header,
// then a type-specific body.
//
// Encoding format (common header):
//
// 0                   1                   2                   3
// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+
// |    Version    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Message Length                         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |   Msg. Type   |
// +---------------+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum BmpMsg {
    RouteMonitoring(RouteMonitoringMsg),
    StatisticsReport(StatisticsReportMsg),
    PeerDown(PeerDownMsg),
    PeerUp(PeerUpMsg),
    Initiation(InitiationMsg),
    Termination(TerminationMsg),
}

// Per-peer header: identifies the monitored session a message refers to.
// The peer address field is 16 octets; IPv4 addresses are left-padded with
// zeroes and signaled by a clear V flag.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PeerHeader {
    pub peer_type: u8,
    pub flags: PeerFlags,
    pub rd: RouteDistinguisher,
    pub addr: IpAddr,
    pub asn: u32,
    pub bgp_id: Ipv4Addr,
    pub timestamp_secs: u32,
    pub timestamp_usecs: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RouteMonitoringMsg {
    pub peer: PeerHeader,
    pub update: Message,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct StatisticsReportMsg {
    pub peer: PeerHeader,
    pub stats: Vec<StatsTlv>,
}

// Statistics TLV. ADJ_RIB_IN and LOC_RIB gauges are 64-bit, everything
// else is a 32-bit counter.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct StatsTlv {
    pub stats_type: u16,
    pub value: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PeerDownMsg {
    pub peer: PeerHeader,
    pub reason: u8,
    pub notification: Option<Message>,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PeerUpMsg {
    pub peer: PeerHeader,
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_port: u16,
    pub sent_open: Message,
    pub rcvd_open: Message,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct InitiationMsg {
    pub info: Vec<InfoTlv>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct TerminationMsg {
    pub info: Vec<InfoTlv>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct InfoTlv {
    pub info_type: u16,
    pub value: Vec<u8>,
}

// BMP decoding errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum BmpDecodeError {
    IncompleteMessage,
    BadVersion(u8),
    BadMessageLength(u32),
    BadMessageType(u8),
    BadBgpMessage(DecodeError),
}

// Type aliases.
pub type BmpDecodeResult<T> = Result<T, BmpDecodeError>;

// ===== impl BmpMsg =====

impl BmpMsg {
    pub const HDR_LEN: usize = 6;

    // Decodes a buffer into a BMP message.
    //
    // The embedded BGP messages (route monitoring UPDATE, peer up OPENs and
    // peer down NOTIFICATION) are decoded with the provided context.
    pub fn decode(data: &[u8], cxt: &DecodeCxt) -> BmpDecodeResult<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        if buf.remaining() < Self::HDR_LEN {
            return Err(BmpDecodeError::IncompleteMessage);
        }

        // Parse and validate the common header.
        let version = buf.get_u8();
        if version != BMP_VERSION {
            return Err(BmpDecodeError::BadVersion(version));
        }
        let msg_len = buf.get_u32();
        if (msg_len as usize) < Self::HDR_LEN
            || msg_len as usize > data.len()
        {
            return Err(BmpDecodeError::BadMessageLength(msg_len));
        }
        let msg_type = buf.get_u8();
        let Some(msg_type) = BmpMessageType::from_u8(msg_type) else {
            return Err(BmpDecodeError::BadMessageType(msg_type));
        };

        // Restrict the view to the declared message length.
        buf.truncate(msg_len as usize - Self::HDR_LEN);

        // Parse message body. All messages except Initiation and
        // Termination start with the per-peer header.
        match msg_type {
            BmpMessageType::RouteMonitoring => {
                let peer = PeerHeader::decode(&mut buf)?;
                let update = decode_bgp_message(&mut buf, cxt)?;
                Ok(BmpMsg::RouteMonitoring(RouteMonitoringMsg {
                    peer,
                    update,
                }))
            }
            BmpMessageType::StatisticsReport => {
                let peer = PeerHeader::decode(&mut buf)?;
                let stats = decode_stats_tlvs(&mut buf)?;
                Ok(BmpMsg::StatisticsReport(StatisticsReportMsg {
                    peer,
                    stats,
                }))
            }
            BmpMessageType::PeerDownNotification => {
                let peer = PeerHeader::decode(&mut buf)?;
                if buf.remaining() < 1 {
                    return Err(BmpDecodeError::IncompleteMessage);
                }
                let reason = buf.get_u8();
                let mut notification = None;
                let mut bdata = Vec::new();

                // Reasons 1 and 3 carry the NOTIFICATION message that took
                // the session down.
                match PeerDownReasonCode::from_u8(reason) {
                    Some(PeerDownReasonCode::LocalNotification)
                    | Some(PeerDownReasonCode::RemoteNotification) => {
                        notification = Some(decode_bgp_message(&mut buf, cxt)?);
                    }
                    _ => {
                        bdata = buf.to_vec();
                    }
                }
                Ok(BmpMsg::PeerDown(PeerDownMsg {
                    peer,
                    reason,
                    notification,
                    data: bdata,
                }))
            }
            BmpMessageType::PeerUpNotification => {
                let peer = PeerHeader::decode(&mut buf)?;
                if buf.remaining() < 20 {
                    return Err(BmpDecodeError::IncompleteMessage);
                }
                let local_addr = decode_peer_addr(&mut buf, &peer.flags);
                let local_port = buf.get_u16();
                let remote_port = buf.get_u16();
                let sent_open = decode_bgp_message(&mut buf, cxt)?;
                let rcvd_open = decode_bgp_message(&mut buf, cxt)?;
                Ok(BmpMsg::PeerUp(PeerUpMsg {
                    peer,
                    local_addr,
                    local_port,
                    remote_port,
                    sent_open,
                    rcvd_open,
                }))
            }
            BmpMessageType::Initiation => {
                let info = decode_info_tlvs(&mut buf)?;
                Ok(BmpMsg::Initiation(InitiationMsg { info }))
            }
            BmpMessageType::Termination => {
                let info = decode_info_tlvs(&mut buf)?;
                Ok(BmpMsg::Termination(TerminationMsg { info }))
            }
        }
    }

    // Parses the given buffer to determine if it contains a complete BMP
    // message, and returns the length of the message if successful.
    pub fn get_message_len(data: &[u8]) -> Option<usize> {
        if data.len() < Self::HDR_LEN {
            return None;
        }

        let mut buf = Bytes::copy_from_slice(&data[0..Self::HDR_LEN]);
        let _version = buf.get_u8();
        let msg_len = buf.get_u32() as usize;
        if msg_len < Self::HDR_LEN || msg_len > data.len() {
            return None;
        }

        Some(msg_len)
    }
}

// ===== impl PeerHeader =====

impl PeerHeader {
    pub const LEN: usize = 42;

    fn decode(buf: &mut Bytes) -> BmpDecodeResult<Self> {
        if buf.remaining() < Self::LEN {
            return Err(BmpDecodeError::IncompleteMessage);
        }

        let peer_type = buf.get_u8();
        let flags = PeerFlags::from_bits_truncate(buf.get_u8());
        let rd = RouteDistinguisher::decode(buf)
            .map_err(|_| BmpDecodeError::IncompleteMessage)?;
        let addr = decode_peer_addr(buf, &flags);
        let asn = buf.get_u32();
        let bgp_id = buf.get_ipv4();
        let timestamp_secs = buf.get_u32();
        let timestamp_usecs = buf.get_u32();

        Ok(PeerHeader {
            peer_type,
            flags,
            rd,
            addr,
            asn,
            bgp_id,
            timestamp_secs,
            timestamp_usecs,
        })
    }
}

// ===== impl BmpDecodeError =====

impl std::fmt::Display for BmpDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BmpDecodeError::IncompleteMessage => {
                write!(f, "incomplete message")
            }
            BmpDecodeError::BadVersion(version) => {
                write!(f, "invalid BMP version: {}", version)
            }
            BmpDecodeError::BadMessageLength(len) => {
                write!(f, "invalid message length: {}", len)
            }
            BmpDecodeError::BadMessageType(msg_type) => {
                write!(f, "invalid message type: {}", msg_type)
            }
            BmpDecodeError::BadBgpMessage(..) => {
                write!(f, "failed to decode embedded BGP message")
            }
        }
    }
}

impl std::error::Error for BmpDecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BmpDecodeError::BadBgpMessage(error) => Some(error),
            _ => None,
        }
    }
}

// ===== helper functions =====

// Decodes a 16-octet peer address field. IPv4 addresses occupy the
// low-order 4 octets and are signaled by a clear V flag.
fn decode_peer_addr(buf: &mut Bytes, flags: &PeerFlags) -> IpAddr {
    let mut bytes = [0; 16];
    buf.copy_to_slice(&mut bytes);
    if flags.contains(PeerFlags::V) {
        IpAddr::V6(Ipv6Addr::from(bytes))
    } else {
        IpAddr::V4(Ipv4Addr::new(
            bytes[12], bytes[13], bytes[14], bytes[15],
        ))
    }
}

// Decodes an embedded BGP message, consuming exactly its framed length.
fn decode_bgp_message(
    buf: &mut Bytes,
    cxt: &DecodeCxt,
) -> BmpDecodeResult<Message> {
    let Some(msg_len) = Message::get_message_len(&buf[..]) else {
        return Err(BmpDecodeError::IncompleteMessage);
    };
    let msg = Message::decode(&buf[..msg_len], cxt)
        .map_err(BmpDecodeError::BadBgpMessage)?;
    buf.advance(msg_len);
    Ok(msg)
}

fn decode_stats_tlvs(buf: &mut Bytes) -> BmpDecodeResult<Vec<StatsTlv>> {
    if buf.remaining() < 4 {
        return Err(BmpDecodeError::IncompleteMessage);
    }

    // The TLV count is implied by the message length.
    let _stats_count = buf.get_u32();

    let mut stats = Vec::new();
    while buf.remaining() >= 4 {
        let stats_type = buf.get_u16();
        let length = buf.get_u16() as usize;
        if length > buf.remaining() {
            return Err(BmpDecodeError::IncompleteMessage);
        }

        match length {
            8 => {
                stats.push(StatsTlv {
                    stats_type,
                    value: buf.get_u64(),
                });
            }
            4 => {
                stats.push(StatsTlv {
                    stats_type,
                    value: buf.get_u32() as u64,
                });
            }
            // Skip TLVs of unexpected size.
            _ => buf.advance(length),
        }
    }

    Ok(stats)
}

fn decode_info_tlvs(buf: &mut Bytes) -> BmpDecodeResult<Vec<InfoTlv>> {
    let mut info = Vec::new();
    while buf.remaining() >= 4 {
        let info_type = buf.get_u16();
        let length = buf.get_u16() as usize;
        if length > buf.remaining() {
            return Err(BmpDecodeError::IncompleteMessage);
        }
        let value = buf.copy_to_bytes(length).to_vec();
        info.push(InfoTlv { info_type, value });
    }

    Ok(info)
}
