//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use ursa_utils::ip::AddressFamily;

pub const BGP_VERSION: u8 = 4;
pub const AS_TRANS: u16 = 23456;

// BGP Message Types.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-1
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum MessageType {
    Open = 1,
    Update = 2,
    Notification = 3,
    Keepalive = 4,
    // RFC 2918
    RouteRefresh = 5,
}

// BGP OPEN Optional Parameter Types.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-11
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum OpenParamType {
    // RFC 5492
    Capabilities = 2,
}

// Capability Codes.
//
// IANA registry:
// https://www.iana.org/assignments/capability-codes/capability-codes.xhtml#capability-codes-2
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum CapabilityCode {
    // RFC 2858
    MultiProtocol = 1,
    // RFC 2918
    RouteRefresh = 2,
    // RFC 3107
    CarryingLabelInfo = 4,
    // RFC 4724
    GracefulRestart = 64,
    // RFC 6793
    FourOctetAsNumber = 65,
    // RFC 7313
    EnhancedRouteRefresh = 70,
    // Pre-standard route refresh used by older implementations.
    RouteRefreshCisco = 128,
}

// BGP Error (Notification) Codes.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-3
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum ErrorCode {
    MessageHeaderError = 1,
    OpenMessageError = 2,
    UpdateMessageError = 3,
    HoldTimerExpired = 4,
    FiniteStateMachineError = 5,
    Cease = 6,
}

// Message Header Error subcodes.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-5
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum MessageHeaderErrorSubcode {
    Unspecific = 0,
    ConnectionNotSynchronized = 1,
    BadMessageLength = 2,
    BadMessageType = 3,
}

// OPEN Message Error subcodes.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-6
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum OpenMessageErrorSubcode {
    Unspecific = 0,
    UnsupportedVersionNumber = 1,
    BadPeerAs = 2,
    BadBgpIdentifier = 3,
    UnsupportedOptParam = 4,
    UnacceptableHoldTime = 6,
}

// UPDATE Message Error subcodes.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-7
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum UpdateMessageErrorSubcode {
    Unspecific = 0,
    MalformedAttributeList = 1,
    UnrecognizedWellKnownAttribute = 2,
    MissingWellKnownAttribute = 3,
    AttributeFlagsError = 4,
    AttributeLengthError = 5,
    InvalidOriginAttribute = 6,
    RoutingLoop = 7,
    InvalidNexthopAttribute = 8,
    OptionalAttributeError = 9,
    InvalidNetworkField = 10,
    MalformedAsPath = 11,
}

// Hold Timer Expired subcodes (RFC 4271 §6.5 defines no specific values;
// subcode 1 is the value used on the wire by the deployed base).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum HoldTimerExpiredSubcode {
    HoldTimerExpired = 1,
}

// BGP Finite State Machine Error subcodes.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-finite-state-machine-error-subcodes
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum FsmErrorSubcode {
    UnexpectedMessageInOpenSent = 1,
    UnexpectedMessageInOpenConfirm = 2,
    UnexpectedMessageInEstablished = 3,
}

// BGP Cease NOTIFICATION message subcodes (RFC 4486).
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-8
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum CeaseSubcode {
    MaximumNumberOfPrefixesReached = 1,
    AdministrativeShutdown = 2,
    PeerDeConfigured = 3,
    AdministrativeReset = 4,
    ConnectionRejected = 5,
    OtherConfigurationChange = 6,
    ConnectionCollisionResolution = 7,
    OutOfResources = 8,
}

// Address Family Identifiers (AFI).
pub type Afi = AddressFamily;

// Subsequent Address Family Identifiers (SAFI).
//
// IANA registry:
// https://www.iana.org/assignments/safi-namespace/safi-namespace.xhtml#safi-namespace-2
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum Safi {
    Unicast = 1,
    Multicast = 2,
    // RFC 8277
    LabeledUnicast = 4,
    // RFC 4364
    LabeledVpn = 128,
    // RFC 4684
    RouteTarget = 132,
}

// BGP Path Attribute Flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct AttrFlags: u8 {
        const OPTIONAL = 0x80;
        const TRANSITIVE = 0x40;
        const PARTIAL = 0x20;
        const EXTENDED = 0x10;
    }
}

// BGP Path Attribute Types.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-2
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum AttrType {
    Origin = 1,
    AsPath = 2,
    Nexthop = 3,
    Med = 4,
    LocalPref = 5,
    AtomicAggregate = 6,
    Aggregator = 7,
    // RFC 1997
    Communities = 8,
    // RFC 4456
    OriginatorId = 9,
    ClusterList = 10,
    // RFC 4760
    MpReachNlri = 14,
    MpUnreachNlri = 15,
    // RFC 4360
    ExtCommunities = 16,
    // RFC 6793
    As4Path = 17,
    As4Aggregator = 18,
}

// BGP Origin.
pub type Origin = ursa_utils::bgp::Origin;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum AsPathSegmentType {
    Set = 1,
    Sequence = 2,
    ConfedSequence = 3,
    ConfedSet = 4,
}

// Route Distinguisher type field values (RFC 4364).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum RdType {
    TwoOctetAs = 0,
    Ipv4Address = 1,
    FourOctetAs = 2,
}
