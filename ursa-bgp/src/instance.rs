//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use derive_new::new;
use serde::Serialize;
use tokio::sync::mpsc;
use ursa_utils::ip::AddressFamily;
use ursa_utils::socket::TcpListener;
use ursa_utils::task::Task;
use ursa_utils::{Receiver, Sender, UnboundedSender};

use crate::config::InstanceCfg;
use crate::debug::{Debug, InstanceInactiveReason};
use crate::error::{Error, IoError};
use crate::neighbor::Neighbors;
use crate::packet::message::{OpenMsg, UpdateMsg};
use crate::tasks::messages::input::{
    NbrRxMsg, NbrTimerMsg, TcpAcceptMsg, TcpConnectMsg,
};
use crate::tasks::messages::ProtocolInputMsg;
#[cfg(feature = "testing")]
use crate::tasks::messages::ProtocolOutputMsg;
use crate::{events, network, northbound, tasks};

// BGP instance: the root object owning the neighbor registry, the listening
// sockets and the channels every helper task reports into.
#[derive(Debug)]
pub struct Instance {
    // Instance configuration data.
    pub config: InstanceCfg,
    // Instance state data.
    pub state: Option<InstanceState>,
    // Instance neighbors.
    pub neighbors: Neighbors,
    // Instance Tx channels.
    pub tx: InstanceChannelsTx,
}

#[derive(Debug)]
pub struct InstanceState {
    // Instance Router ID.
    pub router_id: Ipv4Addr,
    // TCP listening sockets.
    pub listening_sockets: Vec<TcpListenerTask>,
}

#[derive(Debug)]
pub struct TcpListenerTask {
    pub af: AddressFamily,
    pub socket: Arc<TcpListener>,
    _task: Task<()>,
}

// Instance output channels.
#[derive(Debug, new)]
pub struct InstanceChannelsTx {
    // Upward event stream.
    pub event: UnboundedSender<PeerEvent>,
    // Protocol input channels.
    pub protocol_input: ProtocolInputChannelsTx,
    #[cfg(feature = "testing")]
    pub protocol_output: Sender<ProtocolOutputMsg>,
}

#[derive(Clone, Debug)]
pub struct ProtocolInputChannelsTx {
    // TCP accept event.
    pub tcp_accept: Sender<TcpAcceptMsg>,
    // TCP connect event.
    pub tcp_connect: Sender<TcpConnectMsg>,
    // TCP neighbor message.
    pub nbr_msg_rx: Sender<NbrRxMsg>,
    // Neighbor timeout event.
    pub nbr_timer: Sender<NbrTimerMsg>,
}

#[derive(Debug)]
pub struct ProtocolInputChannelsRx {
    // TCP accept event.
    pub tcp_accept: Receiver<TcpAcceptMsg>,
    // TCP connect event.
    pub tcp_connect: Receiver<TcpConnectMsg>,
    // TCP neighbor message.
    pub nbr_msg_rx: Receiver<NbrRxMsg>,
    // Neighbor timeout event.
    pub nbr_timer: Receiver<NbrTimerMsg>,
}

// View struct of an active instance.
pub struct InstanceUpView<'a> {
    pub config: &'a InstanceCfg,
    pub state: &'a mut InstanceState,
    pub tx: &'a InstanceChannelsTx,
}

// Events delivered to the upper-layer consumer (RIB or equivalent), one
// stream shared by all neighbors.
#[derive(Debug, Serialize)]
pub enum PeerEvent {
    PeerUp {
        addr: IpAddr,
        holdtime_nego: u16,
        open: Box<OpenMsg>,
    },
    PeerDown {
        addr: IpAddr,
        reason: PeerDownReason,
    },
    UpdateRcvd {
        addr: IpAddr,
        msg: Box<UpdateMsg>,
    },
    RefreshRcvd {
        addr: IpAddr,
        afi: u16,
        safi: u8,
    },
    NotificationRcvd {
        addr: IpAddr,
        error_code: u8,
        error_subcode: u8,
    },
}

// Why a session left the Established state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum PeerDownReason {
    AdminStop,
    ConnectionFailed,
    NotificationSent(u8, u8),
    NotificationRcvd(u8, u8),
}

// ===== impl Instance =====

impl Instance {
    pub fn new(
        config: InstanceCfg,
        tx: InstanceChannelsTx,
    ) -> Instance {
        Debug::InstanceCreate.log();

        Instance {
            config,
            state: None,
            neighbors: Default::default(),
            tx,
        }
    }

    // Checks if the instance needs to be started or stopped in response to
    // a configuration change.
    pub fn update(&mut self) {
        match self.is_ready() {
            Ok(router_id) if !self.is_active() => {
                self.start(router_id);
            }
            Err(reason) if self.is_active() => {
                self.stop(reason);
            }
            _ => (),
        }
    }

    // Starts the BGP instance.
    fn start(&mut self, router_id: Ipv4Addr) {
        Debug::InstanceStart.log();

        match InstanceState::new(router_id, &self.config, &self.tx) {
            Ok(state) => {
                // Store instance initial state.
                self.state = Some(state);
            }
            Err(error) => {
                Error::InstanceStartError(Box::new(error)).log();
            }
        }
    }

    // Stops the BGP instance, shutting down all neighbor sessions.
    fn stop(&mut self, reason: InstanceInactiveReason) {
        let Some((mut instance, neighbors)) = self.as_up() else {
            return;
        };

        Debug::InstanceStop(reason).log();

        // Stop neighbors.
        use crate::packet::consts::CeaseSubcode;
        for nbr in neighbors.values_mut() {
            nbr.config.enabled = false;
            nbr.stop(&mut instance, CeaseSubcode::AdministrativeShutdown);
        }

        // Clear instance state.
        self.state = None;
    }

    // Returns whether the BGP instance is operational.
    fn is_active(&self) -> bool {
        self.state.is_some()
    }

    // Returns whether the instance is ready for BGP operation.
    fn is_ready(&self) -> Result<Ipv4Addr, InstanceInactiveReason> {
        self.config
            .identifier
            .ok_or(InstanceInactiveReason::MissingRouterId)
    }

    // Returns a view struct for the instance if it is operational.
    pub fn as_up(&mut self) -> Option<(InstanceUpView<'_>, &mut Neighbors)> {
        if let Some(state) = &mut self.state {
            let instance = InstanceUpView {
                config: &self.config,
                state,
                tx: &self.tx,
            };
            Some((instance, &mut self.neighbors))
        } else {
            None
        }
    }

    // Shuts the instance down before exiting.
    pub fn shutdown(mut self) {
        self.stop(InstanceInactiveReason::AdminDown);
        Debug::InstanceDelete.log();
    }

    // Processes an event reported by one of the helper tasks.
    pub fn process_protocol_msg(&mut self, msg: ProtocolInputMsg) {
        // Ignore event if the instance isn't active.
        if let Some((mut instance, neighbors)) = self.as_up()
            && let Err(error) =
                process_protocol_msg(&mut instance, neighbors, msg)
        {
            error.log();
        }
    }

    // Creates channels for all protocol input events.
    pub fn protocol_input_channels()
    -> (ProtocolInputChannelsTx, ProtocolInputChannelsRx) {
        let (tcp_acceptp, tcp_acceptc) = mpsc::channel(4);
        let (tcp_connectp, tcp_connectc) = mpsc::channel(4);
        let (nbr_msg_rxp, nbr_msg_rxc) = mpsc::channel(4);
        let (nbr_timerp, nbr_timerc) = mpsc::channel(4);

        let tx = ProtocolInputChannelsTx {
            tcp_accept: tcp_acceptp,
            tcp_connect: tcp_connectp,
            nbr_msg_rx: nbr_msg_rxp,
            nbr_timer: nbr_timerp,
        };
        let rx = ProtocolInputChannelsRx {
            tcp_accept: tcp_acceptc,
            tcp_connect: tcp_connectc,
            nbr_msg_rx: nbr_msg_rxc,
            nbr_timer: nbr_timerc,
        };

        (tx, rx)
    }
}

// ===== impl InstanceState =====

impl InstanceState {
    fn new(
        router_id: Ipv4Addr,
        config: &InstanceCfg,
        instance_tx: &InstanceChannelsTx,
    ) -> Result<InstanceState, Error> {
        let mut listening_sockets = Vec::new();

        // Create TCP listeners.
        if config.listen {
            for af in [AddressFamily::Ipv4, AddressFamily::Ipv6] {
                let socket = network::listen_socket(af, config.port)
                    .map(Arc::new)
                    .map_err(IoError::TcpSocketError)?;
                let task = tasks::tcp_listener(
                    &socket,
                    &instance_tx.protocol_input.tcp_accept,
                );
                listening_sockets.push(TcpListenerTask {
                    af,
                    socket,
                    _task: task,
                });
            }
        }

        Ok(InstanceState {
            router_id,
            listening_sockets,
        })
    }
}

// ===== impl ProtocolInputChannelsRx =====

impl ProtocolInputChannelsRx {
    pub async fn recv(&mut self) -> Option<ProtocolInputMsg> {
        tokio::select! {
            biased;
            msg = self.tcp_accept.recv() => {
                msg.map(ProtocolInputMsg::TcpAccept)
            }
            msg = self.tcp_connect.recv() => {
                msg.map(ProtocolInputMsg::TcpConnect)
            }
            msg = self.nbr_msg_rx.recv() => {
                msg.map(ProtocolInputMsg::NbrRx)
            }
            msg = self.nbr_timer.recv() => {
                msg.map(ProtocolInputMsg::NbrTimer)
            }
        }
    }
}

// ===== global functions =====

// Spawns a BGP instance, returning the administrative handle used to manage
// its neighbors. Dropping the returned task handle cancels the instance and
// every neighbor session it owns.
pub fn spawn(
    config: InstanceCfg,
    event_txp: UnboundedSender<PeerEvent>,
) -> (northbound::Api, Task<()>) {
    let (request_txp, request_rxc) = mpsc::channel(4);
    let (proto_input_tx, proto_input_rx) = Instance::protocol_input_channels();
    #[cfg(feature = "testing")]
    let (proto_output_tx, _proto_output_rx) = mpsc::channel(4);

    let tx = InstanceChannelsTx::new(
        event_txp,
        proto_input_tx,
        #[cfg(feature = "testing")]
        proto_output_tx,
    );
    let instance = Instance::new(config, tx);

    let task = Task::spawn(event_loop(instance, request_rxc, proto_input_rx));

    (northbound::Api::new(request_txp), task)
}

// Instance event loop: administrative requests and protocol events are
// processed one at a time, which is what keeps every neighbor FSM free of
// internal locking.
async fn event_loop(
    mut instance: Instance,
    mut request_rxc: Receiver<northbound::Request>,
    mut proto_input_rxc: ProtocolInputChannelsRx,
) {
    // Activate the instance if the configuration allows it.
    instance.update();

    loop {
        tokio::select! {
            biased;
            request = request_rxc.recv() => {
                match request {
                    Some(request) => {
                        northbound::process_request(&mut instance, request);
                    }
                    None => {
                        // All administrative handles are gone.
                        instance.shutdown();
                        return;
                    }
                }
            }
            Some(msg) = proto_input_rxc.recv() => {
                instance.process_protocol_msg(msg);
            }
        }
    }
}

// ===== helper functions =====

fn process_protocol_msg(
    instance: &mut InstanceUpView<'_>,
    neighbors: &mut Neighbors,
    msg: ProtocolInputMsg,
) -> Result<(), Error> {
    match msg {
        // Accepted TCP connection request.
        ProtocolInputMsg::TcpAccept(mut msg) => {
            events::process_tcp_accept(
                instance,
                neighbors,
                msg.stream(),
                msg.conn_info,
            )?;
        }
        // Outcome of an outgoing connection attempt.
        ProtocolInputMsg::TcpConnect(msg) => {
            events::process_tcp_connect(instance, neighbors, msg)?;
        }
        // Received message from neighbor.
        ProtocolInputMsg::NbrRx(msg) => {
            events::process_nbr_msg(instance, neighbors, msg.nbr_addr, msg.msg)?;
        }
        // Neighbor's timeout has expired.
        ProtocolInputMsg::NbrTimer(msg) => {
            events::process_nbr_timer(
                instance,
                neighbors,
                msg.nbr_addr,
                msg.timer,
            )?;
        }
    }

    Ok(())
}
