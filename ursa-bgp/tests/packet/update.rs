//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::LazyLock as Lazy;

use ipnetwork::{Ipv4Network, Ipv6Network};
use ursa_bgp::packet::attribute::{
    Attrs, AsPath, AsPathSegment, BaseAttrs, CommList,
};
use ursa_bgp::packet::consts::AsPathSegmentType;
use ursa_bgp::packet::message::{
    Message, MpReachNlri, MpUnreachNlri, ReachNlri, UnreachNlri, UpdateMsg,
};
use ursa_bgp::packet::nlri::{LabelStack, RouteDistinguisher, VpnPrefix};
use ursa_utils::bgp::{ExtComm, Origin};

use super::{test_decode_msg, test_encode_msg};

fn base_attrs(as_path: AsPath) -> BaseAttrs {
    BaseAttrs {
        origin: Origin::Igp,
        as_path,
        as4_path: None,
        med: None,
        local_pref: Some(100),
        aggregator: None,
        as4_aggregator: None,
        atomic_aggregate: false,
        originator_id: None,
        cluster_list: None,
    }
}

// IPv4 unicast announcement.
static UPDATE1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x36, 0x02,
            // Withdrawn Routes.
            0x00, 0x00,
            // Path attributes.
            0x00, 0x1c,
            0x40, 0x01, 0x01, 0x00,
            0x50, 0x02, 0x00, 0x06, 0x02, 0x01, 0x00, 0x01, 0x00, 0x0e,
            0x40, 0x03, 0x04, 0x0a, 0x00, 0x00, 0x01,
            0x40, 0x05, 0x04, 0x00, 0x00, 0x00, 0x64,
            // NLRI.
            0x10, 0x0a, 0x01,
        ],
        Message::Update(UpdateMsg {
            reach: Some(ReachNlri {
                prefixes: vec![Ipv4Network::from_str("10.1.0.0/16").unwrap()],
                nexthop: Ipv4Addr::from_str("10.0.0.1").unwrap(),
            }),
            unreach: None,
            mp_reach: None,
            mp_unreach: None,
            attrs: Some(Attrs {
                base: base_attrs(AsPath {
                    segments: [AsPathSegment {
                        seg_type: AsPathSegmentType::Sequence,
                        members: [65550].into(),
                    }]
                    .into(),
                }),
                comm: None,
                ext_comm: None,
                unknown: vec![],
            }),
        }),
    )
});

// IPv4 unicast withdraw.
static UPDATE2: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x1b, 0x02,
            // Withdrawn Routes.
            0x00, 0x04, 0x18, 0xc0, 0x00, 0x02,
            // Path attributes.
            0x00, 0x00,
        ],
        Message::Update(UpdateMsg {
            reach: None,
            unreach: Some(UnreachNlri {
                prefixes: vec![Ipv4Network::from_str("192.0.2.0/24").unwrap()],
            }),
            mp_reach: None,
            mp_unreach: None,
            attrs: None,
        }),
    )
});

// IPv6 unicast announcement (MP_REACH_NLRI).
static UPDATE3: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x44, 0x02,
            // Withdrawn Routes.
            0x00, 0x00,
            // Path attributes.
            0x00, 0x2d,
            0x90, 0x0e, 0x00, 0x1a, 0x00, 0x02, 0x01, 0x10, 0x20, 0x01, 0x0d,
            0xb8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x01, 0x00, 0x20, 0x20, 0x01, 0x0d, 0xb8,
            0x40, 0x01, 0x01, 0x00,
            0x50, 0x02, 0x00, 0x00,
            0x40, 0x05, 0x04, 0x00, 0x00, 0x00, 0x64,
        ],
        Message::Update(UpdateMsg {
            reach: None,
            unreach: None,
            mp_reach: Some(MpReachNlri::Ipv6Unicast {
                prefixes: vec![
                    Ipv6Network::from_str("2001:db8::/32").unwrap(),
                ],
                nexthop: Ipv6Addr::from_str("2001:db8::1").unwrap(),
                ll_nexthop: None,
            }),
            mp_unreach: None,
            attrs: Some(Attrs {
                base: base_attrs(AsPath::default()),
                comm: None,
                ext_comm: None,
                unknown: vec![],
            }),
        }),
    )
});

// VPN-IPv4 announcement: label stack, route distinguisher and a route
// target extended community.
static UPDATE4: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x56, 0x02,
            // Withdrawn Routes.
            0x00, 0x00,
            // Path attributes.
            0x00, 0x3f,
            0x90, 0x0e, 0x00, 0x20, 0x00, 0x01, 0x80, 0x0c, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0xc0, 0x00, 0x02, 0x01, 0x00, 0x70,
            0x00, 0x06, 0x41, 0x00, 0x00, 0xfd, 0xe8, 0x00, 0x00, 0x00, 0x01,
            0x0a, 0x01, 0x01,
            0x40, 0x01, 0x01, 0x00,
            0x50, 0x02, 0x00, 0x00,
            0x40, 0x05, 0x04, 0x00, 0x00, 0x00, 0x64,
            0xd0, 0x10, 0x00, 0x08, 0x00, 0x02, 0xfd, 0xe8, 0x00, 0x00, 0x00,
            0x64,
        ],
        Message::Update(UpdateMsg {
            reach: None,
            unreach: None,
            mp_reach: Some(MpReachNlri::Ipv4Vpn {
                prefixes: vec![VpnPrefix {
                    rd: RouteDistinguisher::TwoOctetAs {
                        admin: 65000,
                        assigned: 1,
                    },
                    labels: LabelStack(vec![100]),
                    prefix: Ipv4Network::from_str("10.1.1.0/24").unwrap(),
                }],
                nexthop: Ipv4Addr::from_str("192.0.2.1").unwrap(),
            }),
            mp_unreach: None,
            attrs: Some(Attrs {
                base: base_attrs(AsPath::default()),
                comm: None,
                ext_comm: Some(CommList(
                    [ExtComm::TwoOctetAsSpecific {
                        transitive: true,
                        sub_type: 2,
                        asn: 65000,
                        local: 100,
                    }]
                    .into(),
                )),
                unknown: vec![],
            }),
        }),
    )
});

// IPv6 unicast withdraw (MP_UNREACH_NLRI without any other attribute).
static UPDATE5: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x25, 0x02,
            // Withdrawn Routes.
            0x00, 0x00,
            // Path attributes.
            0x00, 0x0e,
            0x90, 0x0f, 0x00, 0x0a, 0x00, 0x02, 0x01, 0x30, 0x20, 0x01, 0x0d,
            0xb8, 0x00, 0x01,
        ],
        Message::Update(UpdateMsg {
            reach: None,
            unreach: None,
            mp_reach: None,
            mp_unreach: Some(MpUnreachNlri::Ipv6Unicast {
                prefixes: vec![
                    Ipv6Network::from_str("2001:db8:1::/48").unwrap(),
                ],
            }),
            attrs: None,
        }),
    )
});

#[test]
fn test_encode_update1() {
    let (ref bytes, ref msg) = *UPDATE1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_update1() {
    let (ref bytes, ref msg) = *UPDATE1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_encode_update2() {
    let (ref bytes, ref msg) = *UPDATE2;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_update2() {
    let (ref bytes, ref msg) = *UPDATE2;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_encode_update3() {
    let (ref bytes, ref msg) = *UPDATE3;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_update3() {
    let (ref bytes, ref msg) = *UPDATE3;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_encode_update4() {
    let (ref bytes, ref msg) = *UPDATE4;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_update4() {
    let (ref bytes, ref msg) = *UPDATE4;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_encode_update5() {
    let (ref bytes, ref msg) = *UPDATE5;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_update5() {
    let (ref bytes, ref msg) = *UPDATE5;
    test_decode_msg(bytes, msg);
}
