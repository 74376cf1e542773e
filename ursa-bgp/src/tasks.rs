//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;
use std::sync::atomic;
use std::time::Duration;

use tracing::{Instrument, debug_span, error};
use ursa_utils::socket::{OwnedReadHalf, OwnedWriteHalf, TcpListener};
use ursa_utils::task::{IntervalTask, Task, TimeoutTask};
use ursa_utils::{Sender, UnboundedReceiver};

use crate::debug::Debug;
use crate::error::NbrRxError;
use crate::neighbor::{Neighbor, fsm};
use crate::network;
use crate::packet::message::{DecodeCxt, EncodeCxt, KeepaliveMsg, Message};

//
// BGP tasks diagram:
//                                     +--------------+
//                                     |  northbound  |
//                                     +--------------+
//                                           |
//                                           V
//                                     +--------------+
//                tcp_listener (1x) -> |              |
//                 tcp_connect (Nx) -> |              | -> (Nx) nbr_tx
//                      nbr_rx (Nx) -> |   instance   | -> (Nx) nbr_kalive_interval
//                   nbr_timer (Nx) -> |              |
//                                     |              | -> (1x) event stream
//                                     +--------------+
//

// BGP inter-task message types.
pub mod messages {
    use std::collections::BTreeSet;
    use std::net::IpAddr;

    use serde::{Deserialize, Serialize};
    use ursa_utils::socket::{TcpConnInfo, TcpStream};

    use crate::error::NbrRxError;
    use crate::neighbor::fsm;
    use crate::packet::message::{Message, NegotiatedCapability};

    // Type aliases.
    pub type ProtocolInputMsg = input::ProtocolMsg;
    pub type ProtocolOutputMsg = output::ProtocolMsg;

    // Input messages (child task -> main task).
    pub mod input {
        use super::*;

        #[derive(Debug, Deserialize, Serialize)]
        pub enum ProtocolMsg {
            TcpAccept(TcpAcceptMsg),
            TcpConnect(TcpConnectMsg),
            NbrRx(NbrRxMsg),
            NbrTimer(NbrTimerMsg),
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct TcpAcceptMsg {
            #[serde(skip)]
            pub stream: Option<TcpStream>,
            pub conn_info: TcpConnInfo,
        }

        // Outcome of a connection attempt. The stream is absent when the
        // dial failed or timed out.
        #[derive(Debug, Deserialize, Serialize)]
        pub struct TcpConnectMsg {
            pub nbr_addr: IpAddr,
            #[serde(skip)]
            pub stream: Option<TcpStream>,
            pub conn_info: Option<TcpConnInfo>,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NbrRxMsg {
            pub nbr_addr: IpAddr,
            pub msg: Result<Message, NbrRxError>,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NbrTimerMsg {
            pub nbr_addr: IpAddr,
            pub timer: fsm::Timer,
        }

        impl TcpAcceptMsg {
            pub(crate) fn stream(&mut self) -> TcpStream {
                #[cfg(not(feature = "testing"))]
                {
                    self.stream.take().unwrap()
                }
                #[cfg(feature = "testing")]
                {
                    Default::default()
                }
            }
        }

        impl TcpConnectMsg {
            pub(crate) fn stream(&mut self) -> TcpStream {
                #[cfg(not(feature = "testing"))]
                {
                    self.stream.take().unwrap()
                }
                #[cfg(feature = "testing")]
                {
                    Default::default()
                }
            }
        }
    }

    // Output messages (main task -> child task).
    pub mod output {
        use super::*;

        #[derive(Debug, Serialize)]
        pub enum ProtocolMsg {
            NbrTx(NbrTxMsg),
        }

        #[derive(Debug, Serialize)]
        pub enum NbrTxMsg {
            SendMessage {
                nbr_addr: IpAddr,
                msg: Message,
            },
            UpdateCapabilities(BTreeSet<NegotiatedCapability>),
        }
    }
}

// ===== BGP tasks =====

// TCP listening task.
pub(crate) fn tcp_listener(
    session_socket: &Arc<TcpListener>,
    tcp_acceptp: &Sender<messages::input::TcpAcceptMsg>,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let span1 = debug_span!("session");
        let _span1_guard = span1.enter();
        let span2 = debug_span!("input");
        let _span2_guard = span2.enter();

        let session_socket = session_socket.clone();
        let tcp_acceptp = tcp_acceptp.clone();
        Task::spawn(
            async move {
                let _ = network::listen_loop(session_socket, tcp_acceptp).await;
            }
            .in_current_span(),
        )
    }
    #[cfg(feature = "testing")]
    {
        Task::spawn(async move { std::future::pending().await })
    }
}

// TCP connect task.
//
// A single connection attempt is made, bounded by the dial timeout; the
// connect retry timer owns the redial policy.
pub(crate) fn tcp_connect(
    nbr: &Neighbor,
    port: u16,
    tcp_connectp: &Sender<messages::input::TcpConnectMsg>,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let span = debug_span!("neighbor", addr = %nbr.remote_addr);
        let _span_guard = span.enter();

        let remote_addr = nbr.remote_addr;
        let tcp_connectp = tcp_connectp.clone();
        Task::spawn(
            async move {
                let msg = match network::connect(remote_addr, port).await {
                    Ok((stream, conn_info)) => {
                        messages::input::TcpConnectMsg {
                            nbr_addr: remote_addr,
                            stream: Some(stream),
                            conn_info: Some(conn_info),
                        }
                    }
                    Err(error) => {
                        error.log();
                        messages::input::TcpConnectMsg {
                            nbr_addr: remote_addr,
                            stream: None,
                            conn_info: None,
                        }
                    }
                };

                // Send message to the parent BGP task.
                let _ = tcp_connectp.send(msg).await;
            }
            .in_current_span(),
        )
    }
    #[cfg(feature = "testing")]
    {
        Task::spawn(async move { std::future::pending().await })
    }
}

// Neighbor TCP Rx task.
pub(crate) fn nbr_rx(
    nbr: &Neighbor,
    cxt: DecodeCxt,
    read_half: OwnedReadHalf,
    nbr_msg_rxp: &Sender<messages::input::NbrRxMsg>,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let span1 = debug_span!("neighbor", addr = %nbr.remote_addr);
        let _span1_guard = span1.enter();
        let span2 = debug_span!("input");
        let _span2_guard = span2.enter();

        let nbr_addr = nbr.remote_addr;
        let nbr_msg_rxp = nbr_msg_rxp.clone();
        let bytes_rcvd = nbr.statistics.bytes_rcvd.clone();

        // Spawn a supervised task for this neighbor.
        //
        // The TCP read loop runs inside an inner supervised task, which lets
        // us catch panics (for example, from malformed or malicious input)
        // and handle them gracefully. Rather than propagating the panic, we
        // treat it as if the TCP connection was closed, containing the
        // failure.
        Task::spawn(
            async move {
                let worker_task = {
                    let nbr_msg_rxp = nbr_msg_rxp.clone();
                    Task::spawn(async move {
                        let _ = network::nbr_read_loop(
                            read_half,
                            nbr_addr,
                            cxt,
                            nbr_msg_rxp,
                            bytes_rcvd,
                        )
                        .await;
                    })
                };
                if let Err(error) = worker_task.await
                    && error.is_panic()
                {
                    error!(%error, "task panicked");
                    let msg = messages::input::NbrRxMsg {
                        nbr_addr,
                        msg: Err(NbrRxError::TcpConnClosed),
                    };
                    let _ = nbr_msg_rxp.send(msg).await;
                }
            }
            .in_current_span(),
        )
    }
    #[cfg(feature = "testing")]
    {
        Task::spawn(async move { std::future::pending().await })
    }
}

// Neighbor TCP Tx task.
#[cfg_attr(not(feature = "testing"), allow(unused_mut))]
pub(crate) fn nbr_tx(
    nbr: &Neighbor,
    cxt: EncodeCxt,
    write_half: OwnedWriteHalf,
    mut msg_txc: UnboundedReceiver<messages::output::NbrTxMsg>,
    #[cfg(feature = "testing")] proto_output_tx: &Sender<
        messages::ProtocolOutputMsg,
    >,
) -> Task<()> {
    #[cfg(not(feature = "testing"))]
    {
        let span1 = debug_span!("neighbor", addr = %nbr.remote_addr);
        let _span1_guard = span1.enter();
        let span2 = debug_span!("output");
        let _span2_guard = span2.enter();

        let bytes_sent = nbr.statistics.bytes_sent.clone();
        Task::spawn(
            async move {
                network::nbr_write_loop(write_half, cxt, msg_txc, bytes_sent)
                    .await;
            }
            .in_current_span(),
        )
    }
    #[cfg(feature = "testing")]
    {
        let proto_output_tx = proto_output_tx.clone();
        Task::spawn(async move {
            // Relay message to the test framework.
            while let Some(msg) = msg_txc.recv().await {
                let msg = messages::ProtocolOutputMsg::NbrTx(msg);
                let _ = proto_output_tx.send(msg).await;
            }
        })
    }
}

// Neighbor timer task.
pub(crate) fn nbr_timer(
    nbr: &Neighbor,
    timer: fsm::Timer,
    seconds: u16,
    nbr_timerp: &Sender<messages::input::NbrTimerMsg>,
) -> TimeoutTask {
    #[cfg(not(feature = "testing"))]
    {
        let nbr_timerp = nbr_timerp.clone();
        let nbr_addr = nbr.remote_addr;

        TimeoutTask::new(
            Duration::from_secs(seconds.into()),
            move || async move {
                let msg = messages::input::NbrTimerMsg { nbr_addr, timer };
                let _ = nbr_timerp.send(msg).await;
            },
        )
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Send periodic keepalive messages.
pub(crate) fn nbr_kalive_interval(
    nbr: &Neighbor,
    interval: u16,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        let msg_txp = nbr.msg_txp.as_ref().unwrap().clone();
        let nbr_addr = nbr.remote_addr;
        let msg_counter = nbr.statistics.msgs_sent.total.clone();

        IntervalTask::new(
            Duration::from_secs(interval.into()),
            false,
            move || {
                let msg_txp = msg_txp.clone();
                let msg_counter = msg_counter.clone();

                async move {
                    let msg = Message::Keepalive(KeepaliveMsg {});
                    Debug::NbrMsgTx(&nbr_addr, &msg).log();

                    let msg = messages::output::NbrTxMsg::SendMessage {
                        nbr_addr,
                        msg,
                    };
                    let _ = msg_txp.send(msg);
                    msg_counter.fetch_add(1, atomic::Ordering::Relaxed);
                }
            },
        )
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask {}
    }
}
