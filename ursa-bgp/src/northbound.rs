//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Administrative surface of the BGP instance.
//!
//! Requests are serialized through the instance event loop, so neighbor
//! state is never touched concurrently with protocol events.

use std::net::IpAddr;
use std::sync::atomic;

use chrono::{DateTime, Utc};
use derive_new::new;
use tokio::sync::oneshot;
use ursa_utils::Sender;

use crate::config::NeighborCfg;
use crate::debug::Debug;
use crate::instance::Instance;
use crate::neighbor::{Neighbor, PeerType, fsm};
use crate::packet::consts::CeaseSubcode;

// Administrative requests.
#[derive(Debug)]
pub enum Request {
    AddNeighbor {
        addr: IpAddr,
        config: NeighborCfg,
    },
    RemoveNeighbor {
        addr: IpAddr,
    },
    Start {
        addr: IpAddr,
    },
    Stop {
        addr: IpAddr,
    },
    ListNeighbors {
        reply_txp: oneshot::Sender<Vec<NeighborBrief>>,
    },
}

// Administrative handle of a running BGP instance.
#[derive(Clone, Debug, new)]
pub struct Api {
    request_txp: Sender<Request>,
}

// Summary of a neighbor's operational state.
#[derive(Clone, Debug)]
pub struct NeighborBrief {
    pub remote_addr: IpAddr,
    pub peer_as: u32,
    pub state: fsm::State,
    pub holdtime_nego: Option<u16>,
    pub msgs_rcvd: u32,
    pub msgs_sent: u32,
    pub bytes_rcvd: u64,
    pub bytes_sent: u64,
    pub last_established: Option<DateTime<Utc>>,
}

// ===== impl Api =====

impl Api {
    /// Adds a neighbor to the configuration. If the neighbor is enabled and
    /// the instance is active, its session is started immediately.
    pub async fn add_neighbor(&self, addr: IpAddr, config: NeighborCfg) {
        let _ = self
            .request_txp
            .send(Request::AddNeighbor { addr, config })
            .await;
    }

    /// Removes a neighbor, shutting down its session.
    pub async fn remove_neighbor(&self, addr: IpAddr) {
        let _ = self.request_txp.send(Request::RemoveNeighbor { addr }).await;
    }

    /// Administratively starts a neighbor session.
    pub async fn start(&self, addr: IpAddr) {
        let _ = self.request_txp.send(Request::Start { addr }).await;
    }

    /// Administratively stops a neighbor session.
    pub async fn stop(&self, addr: IpAddr) {
        let _ = self.request_txp.send(Request::Stop { addr }).await;
    }

    /// Returns a summary of all configured neighbors.
    pub async fn list_neighbors(&self) -> Vec<NeighborBrief> {
        let (reply_txp, reply_rxc) = oneshot::channel();
        let _ = self
            .request_txp
            .send(Request::ListNeighbors { reply_txp })
            .await;
        reply_rxc.await.unwrap_or_default()
    }
}

// ===== global functions =====

pub fn process_request(instance: &mut Instance, request: Request) {
    match request {
        Request::AddNeighbor { addr, config } => {
            if instance.neighbors.contains_key(&addr) {
                return;
            }

            // An AS number matching the local one makes the peer internal.
            let peer_type = if config.peer_as == instance.config.asn {
                PeerType::Internal
            } else {
                PeerType::External
            };

            Debug::NbrCreate(&addr).log();
            let enabled = config.enabled;
            instance
                .neighbors
                .insert(addr, Neighbor::new(addr, config, peer_type));

            // Start the session right away when possible.
            if enabled
                && let Some((mut instance, neighbors)) = instance.as_up()
            {
                let nbr = neighbors.get_mut(&addr).unwrap();
                nbr.fsm_event(&mut instance, fsm::Event::Start);
            }
        }
        Request::RemoveNeighbor { addr } => {
            let Some(mut nbr) = instance.neighbors.remove(&addr) else {
                return;
            };

            // Shut the session down before releasing the neighbor.
            nbr.config.enabled = false;
            if let Some((mut instance, _)) = instance.as_up() {
                nbr.stop(&mut instance, CeaseSubcode::PeerDeConfigured);
            }
            Debug::NbrDelete(&addr).log();
        }
        Request::Start { addr } => {
            let Some((mut instance, neighbors)) = instance.as_up() else {
                return;
            };
            let Some(nbr) = neighbors.get_mut(&addr) else {
                return;
            };

            nbr.config.enabled = true;
            nbr.fsm_event(&mut instance, fsm::Event::Start);
        }
        Request::Stop { addr } => {
            let Some((mut instance, neighbors)) = instance.as_up() else {
                return;
            };
            let Some(nbr) = neighbors.get_mut(&addr) else {
                return;
            };

            nbr.config.enabled = false;
            nbr.stop(&mut instance, CeaseSubcode::AdministrativeShutdown);
        }
        Request::ListNeighbors { reply_txp } => {
            let briefs = instance
                .neighbors
                .values()
                .map(|nbr| NeighborBrief {
                    remote_addr: nbr.remote_addr,
                    peer_as: nbr.config.peer_as,
                    state: nbr.state,
                    holdtime_nego: nbr.holdtime_nego,
                    msgs_rcvd: nbr
                        .statistics
                        .msgs_rcvd
                        .total
                        .load(atomic::Ordering::Relaxed),
                    msgs_sent: nbr
                        .statistics
                        .msgs_sent
                        .total
                        .load(atomic::Ordering::Relaxed),
                    bytes_rcvd: nbr
                        .statistics
                        .bytes_rcvd
                        .load(atomic::Ordering::Relaxed),
                    bytes_sent: nbr
                        .statistics
                        .bytes_sent
                        .load(atomic::Ordering::Relaxed),
                    last_established: nbr.last_established,
                })
                .collect();
            let _ = reply_txp.send(briefs);
        }
    }
}
