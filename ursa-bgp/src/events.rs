//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use chrono::Utc;
use ursa_utils::ip::IpAddrExt;
use ursa_utils::socket::{TcpConnInfo, TcpStream};

use crate::debug::Debug;
use crate::error::{Error, IoError, NbrRxError};
use crate::instance::{InstanceUpView, PeerEvent};
use crate::neighbor::{Neighbors, fsm};
use crate::network;
use crate::packet::consts::{CeaseSubcode, ErrorCode};
use crate::packet::message::{Message, NotificationMsg};
use crate::tasks::messages::input::TcpConnectMsg;

// ===== TCP connection request =====

pub(crate) fn process_tcp_accept(
    instance: &mut InstanceUpView<'_>,
    neighbors: &mut Neighbors,
    stream: TcpStream,
    conn_info: TcpConnInfo,
) -> Result<(), Error> {
    // Lookup neighbor.
    let Some(nbr) = neighbors.get_mut(&conn_info.remote_addr) else {
        // Connection from an unconfigured peer.
        return Ok(());
    };
    if !nbr.config.enabled {
        return Ok(());
    }

    // Connection collision resolution (RFC 4271 §6.8).
    //
    // Once the remote identifier is known, the side owning the higher BGP
    // identifier keeps its own connection; the other connection is closed
    // with a collision-resolution NOTIFICATION. Before the remote
    // identifier is known the existing connection is kept.
    if nbr.conn_info.is_some() {
        if nbr.state == fsm::State::OpenConfirm
            && let Some(remote_id) = nbr.identifier
            && remote_id > instance.state.router_id
        {
            // The peer wins: drop the local connection and adopt the
            // incoming one.
            let msg = NotificationMsg::new(
                ErrorCode::Cease,
                CeaseSubcode::ConnectionCollisionResolution,
            );
            nbr.fsm_event(instance, fsm::Event::Stop(Some(msg)));

            network::accepted_stream_init(
                &stream,
                nbr.remote_addr.address_family(),
            )
            .map_err(IoError::TcpSocketError)?;
            nbr.fsm_event(instance, fsm::Event::Connected(stream, conn_info));
        } else {
            // The local side wins: reject the incoming connection.
            let msg = NotificationMsg::new(
                ErrorCode::Cease,
                CeaseSubcode::ConnectionCollisionResolution,
            );
            network::close_with_notification(stream, msg);
        }
        return Ok(());
    }

    // Initialize the accepted stream.
    network::accepted_stream_init(&stream, nbr.remote_addr.address_family())
        .map_err(IoError::TcpSocketError)?;

    // Invoke FSM event.
    nbr.fsm_event(instance, fsm::Event::Connected(stream, conn_info));

    Ok(())
}

// ===== TCP connection attempt outcome =====

pub(crate) fn process_tcp_connect(
    instance: &mut InstanceUpView<'_>,
    neighbors: &mut Neighbors,
    mut msg: TcpConnectMsg,
) -> Result<(), Error> {
    // Lookup neighbor.
    let Some(nbr) = neighbors.get_mut(&msg.nbr_addr) else {
        return Ok(());
    };
    nbr.tasks.connect = None;

    match msg.conn_info {
        Some(conn_info) => {
            // An incoming connection might have won the race.
            if nbr.conn_info.is_some() {
                return Ok(());
            }

            // Invoke FSM event.
            let stream = msg.stream();
            nbr.fsm_event(instance, fsm::Event::Connected(stream, conn_info));
        }
        None => {
            // Invoke FSM event.
            nbr.fsm_event(instance, fsm::Event::ConnFail);
        }
    }

    Ok(())
}

// ===== neighbor message receipt =====

pub(crate) fn process_nbr_msg(
    instance: &mut InstanceUpView<'_>,
    neighbors: &mut Neighbors,
    nbr_addr: IpAddr,
    msg: Result<Message, NbrRxError>,
) -> Result<(), Error> {
    // Lookup neighbor.
    let Some(nbr) = neighbors.get_mut(&nbr_addr) else {
        return Ok(());
    };

    // Process received message.
    match msg {
        Ok(msg) => {
            Debug::NbrMsgRx(&nbr.remote_addr, &msg).log();

            // Update statistics.
            nbr.statistics.msgs_rcvd.update(&msg);

            match msg {
                Message::Open(msg) => {
                    nbr.fsm_event(instance, fsm::Event::RcvdOpen(msg));
                }
                Message::Update(msg) => {
                    nbr.fsm_event(instance, fsm::Event::RcvdUpdate(msg));
                }
                Message::Notification(msg) => {
                    // Notify the upper layer.
                    let _ = instance.tx.event.send(
                        PeerEvent::NotificationRcvd {
                            addr: nbr.remote_addr,
                            error_code: msg.error_code,
                            error_subcode: msg.error_subcode,
                        },
                    );

                    // Keep track of the last received notification.
                    nbr.notification_rcvd = Some((Utc::now(), msg.clone()));
                    nbr.fsm_event(instance, fsm::Event::RcvdNotif(msg));
                }
                Message::Keepalive(_) => {
                    nbr.fsm_event(instance, fsm::Event::RcvdKalive);
                }
                Message::RouteRefresh(msg) => {
                    nbr.fsm_event(instance, fsm::Event::RcvdRefresh(msg));
                }
            }
        }
        Err(error) => match error {
            NbrRxError::TcpConnClosed => {
                nbr.fsm_event(instance, fsm::Event::ConnFail);
            }
            NbrRxError::MsgDecodeError(error) => {
                nbr.fsm_event(instance, fsm::Event::RcvdError(error));
            }
        },
    }

    Ok(())
}

// ===== neighbor timer expiration =====

pub(crate) fn process_nbr_timer(
    instance: &mut InstanceUpView<'_>,
    neighbors: &mut Neighbors,
    nbr_addr: IpAddr,
    timer: fsm::Timer,
) -> Result<(), Error> {
    // Lookup neighbor.
    let Some(nbr) = neighbors.get_mut(&nbr_addr) else {
        return Ok(());
    };

    // Invoke FSM event.
    nbr.fsm_event(instance, fsm::Event::Timer(timer));

    Ok(())
}
