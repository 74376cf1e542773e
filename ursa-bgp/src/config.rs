//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use serde::Deserialize;
use ursa_utils::bgp::AfiSafi;

// Default hold time advertised in the OPEN message, in seconds.
pub const DFLT_HOLDTIME: u16 = 90;
// Default connect retry interval, in seconds.
pub const DFLT_CONNECT_RETRY_INTERVAL: u16 = 60;
// Default BGP listening port.
pub const DFLT_PORT: u16 = 179;

// Instance-wide configuration, read by every neighbor FSM.
//
// Neighbors take a snapshot of this configuration when they start;
// reconfiguration amounts to stopping and restarting the neighbor.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstanceCfg {
    // BGP identifier (router-id).
    pub identifier: Option<Ipv4Addr>,
    // Local autonomous system number.
    pub asn: u32,
    // Advertised hold time, in seconds. Zero disables keepalives.
    pub holdtime: u16,
    // Interval between connection attempts, in seconds. Also used as the
    // idle-hold delay before a failed session is automatically restarted.
    pub connect_retry_interval: u16,
    // TCP port to listen on and dial to.
    pub port: u16,
    // Whether to accept incoming connections.
    pub listen: bool,
}

// Per-neighbor configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NeighborCfg {
    // Autonomous system number of the peer.
    pub peer_as: u32,
    // Administrative status.
    pub enabled: bool,
    // Wait for the peer to connect instead of dialing out.
    pub passive: bool,
    // Address families advertised via the multiprotocol capability.
    pub afi_safi: BTreeSet<AfiSafi>,
    // Treat the peer as a route-server client.
    pub route_server_client: bool,
}

// ===== impl InstanceCfg =====

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            identifier: None,
            asn: 0,
            holdtime: DFLT_HOLDTIME,
            connect_retry_interval: DFLT_CONNECT_RETRY_INTERVAL,
            port: DFLT_PORT,
            listen: true,
        }
    }
}

// ===== impl NeighborCfg =====

impl Default for NeighborCfg {
    fn default() -> NeighborCfg {
        NeighborCfg {
            peer_as: 0,
            enabled: true,
            passive: false,
            afi_safi: [AfiSafi::Ipv4Unicast].into(),
            route_server_client: false,
        }
    }
}
