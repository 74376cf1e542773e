//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::str::FromStr;

use bytes::{Buf, Bytes};
use ipnetwork::{Ipv4Network, Ipv6Network};
use ursa_bgp::packet::message::{decode_ipv4_prefix, decode_ipv6_prefix};

//
// Wire prefixes occupy exactly 1 + ceil(plen / 8) octets, with the address
// portion zero-extended to full width.
//

#[test]
fn test_decode_ipv4_prefix() {
    for (bytes, prefix_expected) in [
        (vec![0x00], "0.0.0.0/0"),
        (vec![0x10, 0x0a, 0x01], "10.1.0.0/16"),
        (vec![0x11, 0x0a, 0x01, 0x80], "10.1.128.0/17"),
        (vec![0x18, 0xc0, 0x00, 0x02], "192.0.2.0/24"),
        (vec![0x20, 0xc0, 0x00, 0x02, 0x01], "192.0.2.1/32"),
    ] {
        let consumed_expected = 1 + (bytes.len() - 1);
        let mut buf = Bytes::from(bytes);
        buf = [&buf[..], &[0xde, 0xad][..]].concat().into();

        let remaining = buf.remaining();
        let prefix = decode_ipv4_prefix(&mut buf).unwrap().unwrap();
        assert_eq!(prefix, Ipv4Network::from_str(prefix_expected).unwrap());
        assert_eq!(remaining - buf.remaining(), consumed_expected);
    }
}

#[test]
fn test_decode_ipv4_prefix_unroutable() {
    // Loopback prefixes are consumed but not returned.
    let mut buf = Bytes::from(vec![0x20, 0x7f, 0x00, 0x00, 0x01]);
    assert_eq!(decode_ipv4_prefix(&mut buf).unwrap(), None);
    assert_eq!(buf.remaining(), 0);
}

#[test]
fn test_decode_ipv4_prefix_invalid() {
    // Prefix length exceeding the address width.
    let mut buf =
        Bytes::from(vec![0x21, 0x0a, 0x00, 0x00, 0x00, 0x00]);
    assert!(decode_ipv4_prefix(&mut buf).is_err());

    // Truncated address portion.
    let mut buf = Bytes::from(vec![0x18, 0x0a, 0x01]);
    assert!(decode_ipv4_prefix(&mut buf).is_err());
}

#[test]
fn test_decode_ipv6_prefix() {
    for (bytes, prefix_expected) in [
        (vec![0x20, 0x20, 0x01, 0x0d, 0xb8], "2001:db8::/32"),
        (
            vec![0x30, 0x20, 0x01, 0x0d, 0xb8, 0x00, 0x01],
            "2001:db8:1::/48",
        ),
    ] {
        let consumed_expected = 1 + (bytes.len() - 1);
        let mut buf = Bytes::from(bytes);

        let remaining = buf.remaining();
        let prefix = decode_ipv6_prefix(&mut buf).unwrap().unwrap();
        assert_eq!(prefix, Ipv6Network::from_str(prefix_expected).unwrap());
        assert_eq!(remaining - buf.remaining(), consumed_expected);
    }
}
