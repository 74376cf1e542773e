//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::LazyLock as Lazy;

use ursa_bgp::neighbor::PeerType;
use ursa_bgp::packet::bmp::{
    BmpMsg, InfoTlv, InitiationMsg, PeerFlags, PeerHeader, PeerUpMsg,
    StatisticsReportMsg, StatsTlv,
};
use ursa_bgp::packet::message::{
    DecodeCxt, Message, NegotiatedCapability, OpenMsg,
};
use ursa_bgp::packet::nlri::RouteDistinguisher;

fn test_decode_bmp(bytes: &[u8], msg_expected: &BmpMsg) {
    let cxt = DecodeCxt {
        peer_type: PeerType::Internal,
        peer_as: 65550,
        capabilities: [NegotiatedCapability::FourOctetAsNumber].into(),
    };

    let msg_size = BmpMsg::get_message_len(bytes)
        .expect("Buffer doesn't contain a full BMP message");
    assert_eq!(msg_size, bytes.len());
    let msg_actual = BmpMsg::decode(bytes, &cxt).unwrap();
    assert_eq!(*msg_expected, msg_actual);
}

fn test_peer_header() -> PeerHeader {
    PeerHeader {
        peer_type: 0,
        flags: PeerFlags::empty(),
        rd: RouteDistinguisher::TwoOctetAs {
            admin: 0,
            assigned: 0,
        },
        addr: IpAddr::from_str("10.0.0.2").unwrap(),
        asn: 65000,
        bgp_id: Ipv4Addr::from_str("2.2.2.2").unwrap(),
        timestamp_secs: 0,
        timestamp_usecs: 0,
    }
}

static INITIATION1: Lazy<(Vec<u8>, BmpMsg)> = Lazy::new(|| {
    (
        vec![
            // Common header.
            0x03, 0x00, 0x00, 0x00, 0x0e, 0x04,
            // Information TLV.
            0x00, 0x01, 0x00, 0x04, 0x75, 0x72, 0x73, 0x61,
        ],
        BmpMsg::Initiation(InitiationMsg {
            info: vec![InfoTlv {
                info_type: 1,
                value: b"ursa".to_vec(),
            }],
        }),
    )
});

static PEER_UP1: Lazy<(Vec<u8>, BmpMsg)> = Lazy::new(|| {
    (
        vec![
            // Common header.
            0x03, 0x00, 0x00, 0x00, 0x7e, 0x03,
            // Per-peer header.
            0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x0a, 0x00, 0x00, 0x02,
            0x00, 0x00, 0xfd, 0xe8,
            0x02, 0x02, 0x02, 0x02,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            // Local address and ports.
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x0a, 0x00, 0x00, 0x01,
            0x00, 0xb3,
            0xc3, 0x50,
            // Sent OPEN message.
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x1d, 0x01, 0x04, 0xfd, 0xe9,
            0x00, 0x5a, 0x01, 0x01, 0x01, 0x01, 0x00,
            // Received OPEN message.
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x1d, 0x01, 0x04, 0xfd, 0xe8,
            0x00, 0xb4, 0x02, 0x02, 0x02, 0x02, 0x00,
        ],
        BmpMsg::PeerUp(PeerUpMsg {
            peer: test_peer_header(),
            local_addr: IpAddr::from_str("10.0.0.1").unwrap(),
            local_port: 179,
            remote_port: 50000,
            sent_open: Message::Open(OpenMsg {
                version: 4,
                my_as: 65001,
                holdtime: 90,
                identifier: Ipv4Addr::from_str("1.1.1.1").unwrap(),
                capabilities: [].into(),
            }),
            rcvd_open: Message::Open(OpenMsg {
                version: 4,
                my_as: 65000,
                holdtime: 180,
                identifier: Ipv4Addr::from_str("2.2.2.2").unwrap(),
                capabilities: [].into(),
            }),
        }),
    )
});

static STATS1: Lazy<(Vec<u8>, BmpMsg)> = Lazy::new(|| {
    (
        vec![
            // Common header.
            0x03, 0x00, 0x00, 0x00, 0x48, 0x01,
            // Per-peer header.
            0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x0a, 0x00, 0x00, 0x02,
            0x00, 0x00, 0xfd, 0xe8,
            0x02, 0x02, 0x02, 0x02,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            // Stats count.
            0x00, 0x00, 0x00, 0x02,
            // Rejected prefixes (32-bit counter).
            0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x07,
            // Adj-RIB-In size (64-bit gauge).
            0x00, 0x07, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03,
            0xe8,
        ],
        BmpMsg::StatisticsReport(StatisticsReportMsg {
            peer: test_peer_header(),
            stats: vec![
                StatsTlv {
                    stats_type: 0,
                    value: 7,
                },
                StatsTlv {
                    stats_type: 7,
                    value: 1000,
                },
            ],
        }),
    )
});

#[test]
fn test_decode_initiation1() {
    let (ref bytes, ref msg) = *INITIATION1;
    test_decode_bmp(bytes, msg);
}

#[test]
fn test_decode_peer_up1() {
    let (ref bytes, ref msg) = *PEER_UP1;
    test_decode_bmp(bytes, msg);
}

#[test]
fn test_decode_stats1() {
    let (ref bytes, ref msg) = *STATS1;
    test_decode_bmp(bytes, msg);
}
