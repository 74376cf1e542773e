//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{self, AtomicU32, AtomicU64};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use ursa_utils::bgp::AfiSafi;
use ursa_utils::socket::{TcpConnInfo, TcpStream};
use ursa_utils::task::{IntervalTask, Task, TimeoutTask};
use ursa_utils::{Sender, UnboundedSender};

use crate::config::{InstanceCfg, NeighborCfg};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::{InstanceUpView, PeerDownReason, PeerEvent};
use crate::packet::consts::{
    AS_TRANS, Afi, BGP_VERSION, CeaseSubcode, ErrorCode, FsmErrorSubcode,
    HoldTimerExpiredSubcode, Safi,
};
use crate::packet::message::{
    Capability, DecodeCxt, EncodeCxt, KeepaliveMsg, Message,
    NegotiatedCapability, NotificationMsg, OpenMsg,
};
use crate::tasks;
use crate::tasks::messages::input::{NbrRxMsg, NbrTimerMsg};
use crate::tasks::messages::output::NbrTxMsg;

// Large hold-time used during session initialization.
const LARGE_HOLDTIME: u16 = 240;

// BGP neighbor.
#[derive(Debug)]
pub struct Neighbor {
    pub remote_addr: IpAddr,
    pub config: NeighborCfg,
    pub state: fsm::State,
    pub peer_type: PeerType,
    pub conn_info: Option<TcpConnInfo>,
    pub identifier: Option<Ipv4Addr>,
    pub holdtime_nego: Option<u16>,
    pub connect_retry_counter: u32,
    pub open_sent: Option<OpenMsg>,
    pub open_rcvd: Option<OpenMsg>,
    pub capabilities_adv: BTreeSet<Capability>,
    pub capabilities_rcvd: BTreeSet<Capability>,
    pub capabilities_nego: BTreeSet<NegotiatedCapability>,
    pub notification_sent: Option<(DateTime<Utc>, NotificationMsg)>,
    pub notification_rcvd: Option<(DateTime<Utc>, NotificationMsg)>,
    pub last_established: Option<DateTime<Utc>>,
    pub statistics: NeighborStatistics,
    pub tasks: NeighborTasks,
    pub msg_txp: Option<UnboundedSender<NbrTxMsg>>,
}

// BGP peer type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PeerType {
    Internal,
    External,
}

// Neighbor statistics.
#[derive(Debug, Default)]
pub struct NeighborStatistics {
    pub established_transitions: u32,
    pub msgs_rcvd: MessageStatistics,
    pub msgs_sent: MessageStatistics,
    pub bytes_rcvd: Arc<AtomicU64>,
    pub bytes_sent: Arc<AtomicU64>,
}

// Inbound and outbound message counters.
#[derive(Debug, Default)]
pub struct MessageStatistics {
    pub total: Arc<AtomicU32>,
    pub updates: u32,
    pub notifications: u32,
    pub route_refreshes: u32,
}

// Neighbor tasks.
#[derive(Debug, Default)]
pub struct NeighborTasks {
    pub idle_hold: Option<TimeoutTask>,
    pub connect: Option<Task<()>>,
    pub connect_retry: Option<TimeoutTask>,
    pub tcp_rx: Option<Task<()>>,
    pub keepalive: Option<IntervalTask>,
    pub holdtime: Option<TimeoutTask>,
}

// Type aliases.
pub type Neighbors = BTreeMap<IpAddr, Neighbor>;

// Finite State Machine.
pub mod fsm {
    use serde::{Deserialize, Serialize};
    use ursa_utils::socket::{TcpConnInfo, TcpStream};

    use crate::packet::error::DecodeError;
    use crate::packet::message::{
        NotificationMsg, OpenMsg, RouteRefreshMsg, UpdateMsg,
    };

    // FSM states.
    #[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
    pub enum State {
        Idle,
        Connect,
        Active,
        OpenSent,
        OpenConfirm,
        Established,
    }

    // FSM events.
    //
    // The original RFC FSM events are listed above each event for clarity.
    #[derive(Debug)]
    pub enum Event {
        // ManualStart
        Start,
        // ManualStop
        Stop(Option<NotificationMsg>),
        // Tcp_CR_Acked
        // TcpConnectionConfirmed
        Connected(TcpStream, TcpConnInfo),
        // TcpConnectionFails
        ConnFail,
        // BGPHeaderErr
        // BGPOpenMsgErr
        // UpdateMsgErr
        RcvdError(DecodeError),
        // BGPOpen
        RcvdOpen(OpenMsg),
        // NotifMsg
        RcvdNotif(NotificationMsg),
        // KeepAliveMsg
        RcvdKalive,
        // UpdateMsg
        RcvdUpdate(UpdateMsg),
        // RouteRefreshMsg
        RcvdRefresh(RouteRefreshMsg),
        // ConnectRetryTimer_Expires
        // HoldTimer_Expires
        // IdleHoldTimer_Expires
        Timer(Timer),
    }

    // BGP timers.
    //
    // Note: KEEPALIVE messages are sent independently, separate from the FSM.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Timer {
        ConnectRetry,
        Hold,
        IdleHold,
    }
}

// ===== impl Neighbor =====

impl Neighbor {
    // Creates a new neighbor in the Idle state.
    pub(crate) fn new(
        remote_addr: IpAddr,
        config: NeighborCfg,
        peer_type: PeerType,
    ) -> Neighbor {
        Neighbor {
            remote_addr,
            config,
            state: fsm::State::Idle,
            peer_type,
            conn_info: None,
            identifier: None,
            holdtime_nego: None,
            connect_retry_counter: 0,
            open_sent: None,
            open_rcvd: None,
            capabilities_adv: Default::default(),
            capabilities_rcvd: Default::default(),
            capabilities_nego: Default::default(),
            notification_sent: None,
            notification_rcvd: None,
            last_established: None,
            statistics: Default::default(),
            tasks: Default::default(),
            msg_txp: None,
        }
    }

    // Injects an event into the neighbor's FSM.
    pub(crate) fn fsm_event(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        event: fsm::Event,
    ) {
        Debug::NbrFsmEvent(&self.remote_addr, &event).log();

        // Process FSM event.
        let next_state = match self.state {
            // Idle state
            fsm::State::Idle => match event {
                fsm::Event::Start => {
                    self.connect_retry_counter = 0;
                    Some(self.session_start(instance))
                }
                fsm::Event::Timer(fsm::Timer::IdleHold)
                    if self.config.enabled =>
                {
                    Some(self.session_start(instance))
                }
                // Incoming connection from a configured peer starts the
                // session passively.
                fsm::Event::Connected(stream, conn_info) => {
                    Some(self.connection_accept(instance, stream, conn_info))
                }
                _ => None,
            },
            // Connect state
            fsm::State::Connect => match event {
                fsm::Event::Start => None,
                fsm::Event::Stop(msg) => {
                    self.session_close(msg);
                    Some(fsm::State::Idle)
                }
                fsm::Event::Connected(stream, conn_info) => {
                    self.connect_retry_stop();
                    Some(self.connection_accept(instance, stream, conn_info))
                }
                fsm::Event::ConnFail => {
                    // Wait for the connect retry timer before dialing again.
                    self.connect_retry_start(instance);
                    Some(fsm::State::Active)
                }
                fsm::Event::RcvdError(error) => {
                    let msg = NotificationMsg::from(error);
                    self.session_close(Some(msg));
                    Some(fsm::State::Idle)
                }
                fsm::Event::Timer(fsm::Timer::ConnectRetry) => {
                    self.connect(instance);
                    self.connect_retry_start(instance);
                    None
                }
                _ => {
                    // FSM error.
                    self.session_close(None);
                    Some(fsm::State::Idle)
                }
            },
            // Active state
            fsm::State::Active => match event {
                fsm::Event::Start => None,
                fsm::Event::Stop(msg) => {
                    self.session_close(msg);
                    Some(fsm::State::Idle)
                }
                fsm::Event::Connected(stream, conn_info) => {
                    self.connect_retry_stop();
                    Some(self.connection_accept(instance, stream, conn_info))
                }
                fsm::Event::ConnFail => {
                    self.session_close(None);
                    Some(fsm::State::Idle)
                }
                fsm::Event::RcvdError(error) => {
                    let msg = NotificationMsg::from(error);
                    self.session_close(Some(msg));
                    Some(fsm::State::Idle)
                }
                fsm::Event::Timer(fsm::Timer::ConnectRetry) => {
                    self.connect(instance);
                    self.connect_retry_start(instance);
                    Some(fsm::State::Connect)
                }
                _ => {
                    // FSM error.
                    self.session_close(None);
                    Some(fsm::State::Idle)
                }
            },
            // OpenSent state
            fsm::State::OpenSent => match event {
                fsm::Event::Start => None,
                fsm::Event::Stop(msg) => {
                    self.session_close(msg);
                    Some(fsm::State::Idle)
                }
                fsm::Event::ConnFail => {
                    self.session_close(None);
                    Some(fsm::State::Idle)
                }
                fsm::Event::RcvdError(error) => {
                    let msg = NotificationMsg::from(error);
                    self.session_close(Some(msg));
                    Some(fsm::State::Idle)
                }
                fsm::Event::RcvdOpen(msg) => {
                    let next_state = self.open_process(instance, msg);
                    Some(next_state)
                }
                fsm::Event::Timer(fsm::Timer::Hold) => {
                    let msg = NotificationMsg::new(
                        ErrorCode::HoldTimerExpired,
                        HoldTimerExpiredSubcode::HoldTimerExpired,
                    );
                    self.session_close(Some(msg));
                    Some(fsm::State::Idle)
                }
                _ => {
                    // FSM error.
                    let msg = NotificationMsg::new(
                        ErrorCode::FiniteStateMachineError,
                        FsmErrorSubcode::UnexpectedMessageInOpenSent,
                    );
                    self.session_close(Some(msg));
                    Some(fsm::State::Idle)
                }
            },
            // OpenConfirm state
            fsm::State::OpenConfirm => match event {
                fsm::Event::Start => None,
                fsm::Event::Stop(msg) => {
                    self.session_close(msg);
                    Some(fsm::State::Idle)
                }
                fsm::Event::ConnFail => {
                    self.session_close(None);
                    Some(fsm::State::Idle)
                }
                fsm::Event::RcvdError(error) => {
                    let msg = NotificationMsg::from(error);
                    self.session_close(Some(msg));
                    Some(fsm::State::Idle)
                }
                fsm::Event::RcvdNotif(_) => {
                    self.session_close(None);
                    Some(fsm::State::Idle)
                }
                fsm::Event::RcvdKalive => {
                    self.holdtime_restart();
                    Some(fsm::State::Established)
                }
                fsm::Event::Timer(fsm::Timer::Hold) => {
                    let msg = NotificationMsg::new(
                        ErrorCode::HoldTimerExpired,
                        HoldTimerExpiredSubcode::HoldTimerExpired,
                    );
                    self.session_close(Some(msg));
                    Some(fsm::State::Idle)
                }
                _ => {
                    // FSM error.
                    let msg = NotificationMsg::new(
                        ErrorCode::FiniteStateMachineError,
                        FsmErrorSubcode::UnexpectedMessageInOpenConfirm,
                    );
                    self.session_close(Some(msg));
                    Some(fsm::State::Idle)
                }
            },
            // Established state
            fsm::State::Established => match event {
                fsm::Event::Start => None,
                fsm::Event::Stop(msg) => {
                    self.peer_down(instance, PeerDownReason::AdminStop);
                    self.session_close(msg);
                    Some(fsm::State::Idle)
                }
                fsm::Event::ConnFail => {
                    self.peer_down(instance, PeerDownReason::ConnectionFailed);
                    self.session_close(None);
                    Some(fsm::State::Idle)
                }
                fsm::Event::RcvdError(error) => {
                    let msg = NotificationMsg::from(error);
                    self.peer_down(
                        instance,
                        PeerDownReason::NotificationSent(
                            msg.error_code,
                            msg.error_subcode,
                        ),
                    );
                    self.session_close(Some(msg));
                    Some(fsm::State::Idle)
                }
                fsm::Event::RcvdNotif(msg) => {
                    self.peer_down(
                        instance,
                        PeerDownReason::NotificationRcvd(
                            msg.error_code,
                            msg.error_subcode,
                        ),
                    );
                    self.session_close(None);
                    Some(fsm::State::Idle)
                }
                fsm::Event::RcvdKalive => {
                    self.holdtime_restart();
                    None
                }
                fsm::Event::RcvdUpdate(msg) => {
                    self.holdtime_restart();
                    self.event_send(
                        instance,
                        PeerEvent::UpdateRcvd {
                            addr: self.remote_addr,
                            msg: Box::new(msg),
                        },
                    );
                    None
                }
                fsm::Event::RcvdRefresh(msg) => {
                    self.event_send(
                        instance,
                        PeerEvent::RefreshRcvd {
                            addr: self.remote_addr,
                            afi: msg.afi,
                            safi: msg.safi,
                        },
                    );
                    None
                }
                fsm::Event::Timer(fsm::Timer::Hold) => {
                    let msg = NotificationMsg::new(
                        ErrorCode::HoldTimerExpired,
                        HoldTimerExpiredSubcode::HoldTimerExpired,
                    );
                    self.peer_down(
                        instance,
                        PeerDownReason::NotificationSent(
                            msg.error_code,
                            msg.error_subcode,
                        ),
                    );
                    self.session_close(Some(msg));
                    Some(fsm::State::Idle)
                }
                _ => {
                    // FSM error.
                    let msg = NotificationMsg::new(
                        ErrorCode::FiniteStateMachineError,
                        FsmErrorSubcode::UnexpectedMessageInEstablished,
                    );
                    self.peer_down(
                        instance,
                        PeerDownReason::NotificationSent(
                            msg.error_code,
                            msg.error_subcode,
                        ),
                    );
                    self.session_close(Some(msg));
                    Some(fsm::State::Idle)
                }
            },
        };

        // Change to next FSM state when applicable.
        if let Some(next_state) = next_state
            && self.state != next_state
        {
            // Schedule automatic restart unless the neighbor has been
            // administratively disabled.
            if next_state == fsm::State::Idle && self.config.enabled {
                self.idle_hold_start(instance);
            } else {
                self.idle_hold_stop();
            }

            self.fsm_state_change(instance, next_state);
        }
    }

    // Updates the neighbor's FSM state.
    fn fsm_state_change(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        next_state: fsm::State,
    ) {
        Debug::NbrFsmTransition(&self.remote_addr, &self.state, &next_state)
            .log();

        // Keep track of the time that the BGP session last transitioned in
        // or out of the Established state.
        if self.state == fsm::State::Established
            || next_state == fsm::State::Established
        {
            self.last_established = Some(Utc::now());
        }

        if next_state == fsm::State::Established {
            // Update statistics.
            self.statistics.established_transitions += 1;

            // Initialize session.
            self.session_init(instance);

            // Notify the upper layer.
            self.event_send(
                instance,
                PeerEvent::PeerUp {
                    addr: self.remote_addr,
                    holdtime_nego: self.holdtime_nego.unwrap_or(0),
                    open: Box::new(self.open_rcvd.clone().unwrap()),
                },
            );
        }

        self.state = next_state;
    }

    // Common handling of ManualStart and automatic restart.
    fn session_start(
        &mut self,
        instance: &mut InstanceUpView<'_>,
    ) -> fsm::State {
        self.connect_retry_start(instance);
        if self.config.passive {
            fsm::State::Active
        } else {
            self.connect(instance);
            fsm::State::Connect
        }
    }

    // Common handling of an established TCP connection: set up the I/O
    // tasks, send the initial OPEN and move to OpenSent.
    fn connection_accept(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        stream: TcpStream,
        conn_info: TcpConnInfo,
    ) -> fsm::State {
        self.connection_setup(
            stream,
            conn_info,
            &instance.tx.protocol_input.nbr_msg_rx,
            #[cfg(feature = "testing")]
            &instance.tx.protocol_output,
        );
        self.open_send(instance.config, instance.state.router_id);
        self.holdtime_start(
            LARGE_HOLDTIME,
            &instance.tx.protocol_input.nbr_timer,
        );
        fsm::State::OpenSent
    }

    // Sets up the connection for the BGP neighbor, spawning necessary tasks
    // for TCP communication.
    fn connection_setup(
        &mut self,
        stream: TcpStream,
        conn_info: TcpConnInfo,
        nbr_msg_rxp: &Sender<NbrRxMsg>,
        #[cfg(feature = "testing")] proto_output_tx: &Sender<
            crate::tasks::messages::ProtocolOutputMsg,
        >,
    ) {
        // Store TCP connection information.
        self.conn_info = Some(conn_info);

        // Split TCP stream into two halves.
        let (read_half, write_half) = stream.into_split();

        // Spawn neighbor TCP Tx task.
        let (msg_txp, msg_txc) = mpsc::unbounded_channel();
        let cxt = EncodeCxt {
            capabilities: Default::default(),
        };
        let mut tx_task = tasks::nbr_tx(
            self,
            cxt,
            write_half,
            msg_txc,
            #[cfg(feature = "testing")]
            proto_output_tx,
        );
        self.msg_txp = Some(msg_txp);

        // Spawn neighbor TCP Rx task.
        let cxt = DecodeCxt {
            peer_type: self.peer_type,
            peer_as: self.config.peer_as,
            capabilities: Default::default(),
        };
        let tcp_rx_task = tasks::nbr_rx(self, cxt, read_half, nbr_msg_rxp);
        self.tasks.tcp_rx = Some(tcp_rx_task);

        // No need to keep track of the Tx task since it gracefully exits as
        // soon as the tx end of its mpsc channel is dropped. This ensures
        // that messages sent during neighbor shutdown will be delivered.
        tx_task.detach();
    }

    // Initializes the BGP session.
    fn session_init(&mut self, _instance: &mut InstanceUpView<'_>) {
        // Compute the negotiated capabilities.
        self.capabilities_nego = self
            .capabilities_adv
            .iter()
            .map(|cap| cap.as_negotiated())
            .collect::<BTreeSet<_>>()
            .intersection(
                &self
                    .capabilities_rcvd
                    .iter()
                    .map(|cap| cap.as_negotiated())
                    .collect::<BTreeSet<_>>(),
            )
            .cloned()
            .collect();

        // Update the Tx task with the negotiated capabilities.
        let msg = NbrTxMsg::UpdateCapabilities(self.capabilities_nego.clone());
        let _ = self.msg_txp.as_ref().unwrap().send(msg);
    }

    // Closes the BGP session, performing necessary cleanup and releasing
    // resources.
    fn session_close(&mut self, send_notif: Option<NotificationMsg>) {
        // Send a notification message.
        if self.state >= fsm::State::OpenSent
            && let Some(msg) = send_notif
        {
            self.message_send(Message::Notification(msg));
        }

        // Set the ConnectRetryTimer to zero.
        self.connect_retry_stop();

        // Keep count of how many times the session fell back to Idle.
        self.connect_retry_counter += 1;

        // Release all resources.
        self.conn_info = None;
        self.identifier = None;
        self.holdtime_nego = None;
        self.open_sent = None;
        self.open_rcvd = None;
        self.capabilities_adv.clear();
        self.capabilities_rcvd.clear();
        self.capabilities_nego.clear();
        self.tasks = Default::default();
        self.msg_txp = None;
    }

    // Enqueues a single BGP message for transmission.
    pub(crate) fn message_send(&mut self, msg: Message) {
        Debug::NbrMsgTx(&self.remote_addr, &msg).log();

        // Update statistics.
        self.statistics.msgs_sent.update(&msg);

        // Keep track of the last sent notification.
        if let Message::Notification(msg) = &msg {
            self.notification_sent = Some((Utc::now(), msg.clone()));
        }

        // Ignore any possible error as the connection might have gone down
        // already.
        let nbr_addr = self.remote_addr;
        let msg = NbrTxMsg::SendMessage { nbr_addr, msg };
        let _ = self.msg_txp.as_ref().unwrap().send(msg);
    }

    // Sends a BGP OPEN message based on the local configuration.
    fn open_send(&mut self, instance_cfg: &InstanceCfg, identifier: Ipv4Addr) {
        // Base capabilities.
        let mut capabilities: BTreeSet<_> =
            [Capability::RouteRefresh, Capability::FourOctetAsNumber {
                asn: instance_cfg.asn,
            }]
            .into();

        // Multiprotocol capabilities.
        for afi_safi in &self.config.afi_safi {
            let (afi, safi) = afi_safi_tuple(*afi_safi);
            capabilities.insert(Capability::MultiProtocol { afi, safi });
        }

        // Label support for the labeled address families.
        if self.config.afi_safi.iter().any(|afi_safi| {
            matches!(
                afi_safi,
                AfiSafi::Ipv4Vpn
                    | AfiSafi::Ipv6Vpn
                    | AfiSafi::Ipv4LabeledUnicast
                    | AfiSafi::Ipv6LabeledUnicast
            )
        }) {
            capabilities.insert(Capability::CarryingLabelInfo);
        }

        // Keep track of the advertised capabilities.
        self.capabilities_adv.clone_from(&capabilities);

        // Fill-in and send message.
        let msg = OpenMsg {
            version: BGP_VERSION,
            my_as: instance_cfg.asn.try_into().unwrap_or(AS_TRANS),
            holdtime: instance_cfg.holdtime,
            identifier,
            capabilities,
        };
        self.open_sent = Some(msg.clone());
        self.message_send(Message::Open(msg));
    }

    // Processes the received OPEN message while in the OpenSent state.
    fn open_process(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        msg: OpenMsg,
    ) -> fsm::State {
        use crate::packet::consts::OpenMessageErrorSubcode as ErrorSubcode;

        // Validate the received message.
        if let Err(error) = self.open_validate(instance, &msg) {
            error.log();

            // Close the session.
            let msg = match error {
                Error::NbrBadAs(..) => {
                    let error_code = ErrorCode::OpenMessageError;
                    let error_subcode = ErrorSubcode::BadPeerAs;
                    let msg = NotificationMsg::new(error_code, error_subcode);
                    Some(msg)
                }
                Error::NbrBadIdentifier(..) => {
                    let error_code = ErrorCode::OpenMessageError;
                    let error_subcode = ErrorSubcode::BadBgpIdentifier;
                    let msg = NotificationMsg::new(error_code, error_subcode);
                    Some(msg)
                }
                _ => None,
            };
            self.session_close(msg);

            // Transition to the Idle state.
            return fsm::State::Idle;
        }

        // Calculate negotiated hold-time.
        //
        // RFC 4271 §4.2 requires the result to be zero or at least three
        // seconds.
        let holdtime_nego =
            std::cmp::min(msg.holdtime, instance.config.holdtime);
        if holdtime_nego == 1 || holdtime_nego == 2 {
            let msg = NotificationMsg::new(
                ErrorCode::OpenMessageError,
                ErrorSubcode::UnacceptableHoldTime,
            );
            self.session_close(Some(msg));
            return fsm::State::Idle;
        }

        // Set the ConnectRetryTimer to zero.
        self.connect_retry_stop();

        // Send Keepalive message.
        self.message_send(Message::Keepalive(KeepaliveMsg {}));

        // Start Keepalive interval and session hold timer.
        if holdtime_nego != 0 {
            self.keepalive_interval_start(holdtime_nego);
            self.holdtime_start(
                holdtime_nego,
                &instance.tx.protocol_input.nbr_timer,
            );
        } else {
            self.holdtime_stop();
        }

        // Keep track of the received data.
        self.identifier = Some(msg.identifier);
        self.holdtime_nego = (holdtime_nego != 0).then_some(holdtime_nego);
        self.capabilities_rcvd.clone_from(&msg.capabilities);
        self.open_rcvd = Some(msg);

        // Transition to the OpenConfirm state.
        fsm::State::OpenConfirm
    }

    // Performs semantic validation of the received BGP OPEN message.
    // Syntactic errors are detected during the decoding phase.
    fn open_validate(
        &self,
        instance: &InstanceUpView<'_>,
        msg: &OpenMsg,
    ) -> Result<(), Error> {
        // Validate ASN.
        if self.config.peer_as != msg.real_as() {
            return Err(Error::NbrBadAs(
                self.remote_addr,
                msg.real_as(),
                self.config.peer_as,
            ));
        }

        // Validate BGP identifier for internal peers.
        if self.peer_type == PeerType::Internal
            && msg.identifier == instance.state.router_id
        {
            return Err(Error::NbrBadIdentifier(
                self.remote_addr,
                msg.identifier,
            ));
        }

        Ok(())
    }

    // Sends an event to the upper-layer consumer.
    fn event_send(&self, instance: &InstanceUpView<'_>, event: PeerEvent) {
        let _ = instance.tx.event.send(event);
    }

    // Notifies the upper layer that the session went down.
    fn peer_down(
        &self,
        instance: &InstanceUpView<'_>,
        reason: PeerDownReason,
    ) {
        self.event_send(
            instance,
            PeerEvent::PeerDown {
                addr: self.remote_addr,
                reason,
            },
        );
    }

    // Starts the idle-hold timer, which re-enters the session automatically
    // after a failure.
    fn idle_hold_start(&mut self, instance: &InstanceUpView<'_>) {
        let task = tasks::nbr_timer(
            self,
            fsm::Timer::IdleHold,
            instance.config.connect_retry_interval,
            &instance.tx.protocol_input.nbr_timer,
        );
        self.tasks.idle_hold = Some(task);
    }

    // Stops the idle-hold timer.
    fn idle_hold_stop(&mut self) {
        self.tasks.idle_hold = None;
    }

    // Starts a TCP connection task to the neighbor's remote address.
    fn connect(&mut self, instance: &InstanceUpView<'_>) {
        let task = tasks::tcp_connect(
            self,
            instance.config.port,
            &instance.tx.protocol_input.tcp_connect,
        );
        self.tasks.connect = Some(task);
    }

    // Starts the Keepalive Tx interval.
    fn keepalive_interval_start(&mut self, holdtime_nego: u16) {
        let task = tasks::nbr_kalive_interval(self, holdtime_nego / 3);
        self.tasks.keepalive = Some(task);
    }

    // Starts the session hold timer.
    fn holdtime_start(
        &mut self,
        seconds: u16,
        nbr_timerp: &Sender<NbrTimerMsg>,
    ) {
        let task =
            tasks::nbr_timer(self, fsm::Timer::Hold, seconds, nbr_timerp);
        self.tasks.holdtime = Some(task);
    }

    // Restarts the session hold timer if the negotiated HoldTime value is
    // non-zero.
    fn holdtime_restart(&mut self) {
        if let Some(holdtime) = self.tasks.holdtime.as_mut() {
            holdtime.reset(None);
        }
    }

    // Stops the session hold timer.
    fn holdtime_stop(&mut self) {
        self.tasks.holdtime = None;
    }

    // Starts the connect retry timer.
    fn connect_retry_start(&mut self, instance: &InstanceUpView<'_>) {
        let task = tasks::nbr_timer(
            self,
            fsm::Timer::ConnectRetry,
            instance.config.connect_retry_interval,
            &instance.tx.protocol_input.nbr_timer,
        );
        self.tasks.connect_retry = Some(task);
    }

    // Stops the connect retry timer.
    fn connect_retry_stop(&mut self) {
        self.tasks.connect_retry = None;
    }

    // Stops the neighbor via the administrative interface.
    pub(crate) fn stop(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        subcode: CeaseSubcode,
    ) {
        let msg = NotificationMsg::new(ErrorCode::Cease, subcode);
        self.fsm_event(instance, fsm::Event::Stop(Some(msg)));
    }
}

// ===== impl MessageStatistics =====

impl MessageStatistics {
    pub(crate) fn update(&mut self, msg: &Message) {
        self.total.fetch_add(1, atomic::Ordering::Relaxed);
        match msg {
            Message::Update(_) => {
                self.updates += 1;
            }
            Message::Notification(_) => {
                self.notifications += 1;
            }
            Message::RouteRefresh(_) => {
                self.route_refreshes += 1;
            }
            _ => {}
        }
    }
}

// ===== helper functions =====

// Maps a configured address family to its wire AFI/SAFI pair.
fn afi_safi_tuple(afi_safi: AfiSafi) -> (Afi, Safi) {
    match afi_safi {
        AfiSafi::Ipv4Unicast => (Afi::Ipv4, Safi::Unicast),
        AfiSafi::Ipv6Unicast => (Afi::Ipv6, Safi::Unicast),
        AfiSafi::Ipv4Vpn => (Afi::Ipv4, Safi::LabeledVpn),
        AfiSafi::Ipv6Vpn => (Afi::Ipv6, Safi::LabeledVpn),
        AfiSafi::Ipv4LabeledUnicast => (Afi::Ipv4, Safi::LabeledUnicast),
        AfiSafi::Ipv6LabeledUnicast => (Afi::Ipv6, Safi::LabeledUnicast),
        AfiSafi::RouteTargetConstrain => (Afi::Ipv4, Safi::RouteTarget),
    }
}
