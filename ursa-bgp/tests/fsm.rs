//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

// Session FSM tests. These run with the "testing" feature, which replaces
// sockets and timer tasks with inert stubs so that connection outcomes,
// messages and timer expirations can be injected as plain events.
#![cfg(feature = "testing")]

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use ursa_bgp::config::{InstanceCfg, NeighborCfg};
use ursa_bgp::error::NbrRxError;
use ursa_bgp::instance::{
    Instance, InstanceChannelsTx, PeerDownReason, PeerEvent,
};
use ursa_bgp::neighbor::fsm;
use ursa_bgp::northbound::{self, Request};
use ursa_bgp::packet::error::{DecodeError, MessageHeaderError};
use ursa_bgp::packet::message::{KeepaliveMsg, Message, OpenMsg};
use ursa_bgp::tasks::messages::ProtocolOutputMsg;
use ursa_bgp::tasks::messages::input::{
    NbrRxMsg, NbrTimerMsg, ProtocolMsg, TcpAcceptMsg, TcpConnectMsg,
};
use ursa_bgp::tasks::messages::output::NbrTxMsg;
use ursa_utils::socket::TcpConnInfo;

const NBR_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

struct TestSpeaker {
    instance: Instance,
    proto_output_rxc: mpsc::Receiver<ProtocolOutputMsg>,
    event_rxc: mpsc::UnboundedReceiver<PeerEvent>,
}

// Builds an active instance with a single configured neighbor, started and
// dialing (Connect state).
fn test_speaker() -> TestSpeaker {
    let (event_txp, event_rxc) = mpsc::unbounded_channel();
    let (proto_input_tx, _proto_input_rx) =
        Instance::protocol_input_channels();
    let (proto_output_txp, proto_output_rxc) = mpsc::channel(16);

    let config = InstanceCfg {
        identifier: Some(Ipv4Addr::from_str("1.1.1.1").unwrap()),
        asn: 65001,
        listen: false,
        ..Default::default()
    };
    let tx = InstanceChannelsTx::new(event_txp, proto_input_tx, proto_output_txp);
    let mut instance = Instance::new(config, tx);
    instance.update();

    northbound::process_request(&mut instance, Request::AddNeighbor {
        addr: NBR_ADDR,
        config: NeighborCfg {
            peer_as: 65002,
            ..Default::default()
        },
    });

    TestSpeaker {
        instance,
        proto_output_rxc,
        event_rxc,
    }
}

fn conn_info() -> TcpConnInfo {
    TcpConnInfo {
        local_addr: IpAddr::from_str("10.0.0.1").unwrap(),
        local_port: 179,
        remote_addr: NBR_ADDR,
        remote_port: 50000,
    }
}

fn peer_open(holdtime: u16, identifier: &str) -> OpenMsg {
    OpenMsg {
        version: 4,
        my_as: 65002,
        holdtime,
        identifier: Ipv4Addr::from_str(identifier).unwrap(),
        capabilities: [].into(),
    }
}

fn nbr_state(speaker: &TestSpeaker) -> fsm::State {
    speaker.instance.neighbors.get(&NBR_ADDR).unwrap().state
}

fn connected(speaker: &mut TestSpeaker) {
    speaker
        .instance
        .process_protocol_msg(ProtocolMsg::TcpConnect(TcpConnectMsg {
            nbr_addr: NBR_ADDR,
            stream: None,
            conn_info: Some(conn_info()),
        }));
}

fn rcvd_msg(speaker: &mut TestSpeaker, msg: Message) {
    speaker
        .instance
        .process_protocol_msg(ProtocolMsg::NbrRx(NbrRxMsg {
            nbr_addr: NBR_ADDR,
            msg: Ok(msg),
        }));
}

// Returns the next message enqueued for transmission, skipping capability
// updates of the Tx task.
async fn sent_msg(speaker: &mut TestSpeaker) -> Message {
    loop {
        let msg = timeout(
            Duration::from_secs(1),
            speaker.proto_output_rxc.recv(),
        )
        .await
        .expect("timed out waiting for an outbound message")
        .expect("output channel closed");
        match msg {
            ProtocolOutputMsg::NbrTx(NbrTxMsg::SendMessage { msg, .. }) => {
                return msg;
            }
            ProtocolOutputMsg::NbrTx(NbrTxMsg::UpdateCapabilities(_)) => {
                continue;
            }
        }
    }
}

// Drives the session all the way to Established.
async fn establish(speaker: &mut TestSpeaker) {
    connected(speaker);
    assert_eq!(nbr_state(speaker), fsm::State::OpenSent);

    // The initial OPEN must reflect the local configuration.
    let msg = sent_msg(speaker).await;
    let Message::Open(open) = msg else {
        panic!("expected OPEN, got {:?}", msg);
    };
    assert_eq!(open.version, 4);
    assert_eq!(open.my_as, 65001);
    assert_eq!(open.holdtime, 90);
    assert_eq!(open.identifier, Ipv4Addr::from_str("1.1.1.1").unwrap());

    // Peer's OPEN: negotiated hold time is the minimum of both ends.
    rcvd_msg(speaker, Message::Open(peer_open(30, "2.2.2.2")));
    assert_eq!(nbr_state(speaker), fsm::State::OpenConfirm);
    {
        let nbr = speaker.instance.neighbors.get(&NBR_ADDR).unwrap();
        assert_eq!(nbr.holdtime_nego, Some(30));
    }
    let msg = sent_msg(speaker).await;
    assert!(matches!(msg, Message::Keepalive(_)));

    // The first KEEPALIVE completes the session.
    rcvd_msg(speaker, Message::Keepalive(KeepaliveMsg {}));
    assert_eq!(nbr_state(speaker), fsm::State::Established);

    let event = speaker.event_rxc.try_recv().unwrap();
    let PeerEvent::PeerUp { holdtime_nego, .. } = event else {
        panic!("expected PeerUp, got {:?}", event);
    };
    assert_eq!(holdtime_nego, 30);
}

#[tokio::test]
async fn session_establishment() {
    let mut speaker = test_speaker();
    assert_eq!(nbr_state(&speaker), fsm::State::Connect);

    establish(&mut speaker).await;
}

#[tokio::test]
async fn connection_failure_fallback() {
    let mut speaker = test_speaker();
    assert_eq!(nbr_state(&speaker), fsm::State::Connect);

    // A failed dial falls back to Active, waiting on the connect retry
    // timer.
    speaker
        .instance
        .process_protocol_msg(ProtocolMsg::TcpConnect(TcpConnectMsg {
            nbr_addr: NBR_ADDR,
            stream: None,
            conn_info: None,
        }));
    assert_eq!(nbr_state(&speaker), fsm::State::Active);

    // The connect retry timer re-enters Connect.
    speaker
        .instance
        .process_protocol_msg(ProtocolMsg::NbrTimer(NbrTimerMsg {
            nbr_addr: NBR_ADDR,
            timer: fsm::Timer::ConnectRetry,
        }));
    assert_eq!(nbr_state(&speaker), fsm::State::Connect);
}

#[tokio::test]
async fn hold_timer_expiry() {
    let mut speaker = test_speaker();
    establish(&mut speaker).await;

    // Hold timer expiry tears the session down with a NOTIFICATION.
    speaker
        .instance
        .process_protocol_msg(ProtocolMsg::NbrTimer(NbrTimerMsg {
            nbr_addr: NBR_ADDR,
            timer: fsm::Timer::Hold,
        }));
    assert_eq!(nbr_state(&speaker), fsm::State::Idle);

    let msg = sent_msg(&mut speaker).await;
    let Message::Notification(notif) = msg else {
        panic!("expected NOTIFICATION, got {:?}", msg);
    };
    assert_eq!(notif.error_code, 4);
    assert_eq!(notif.error_subcode, 1);

    let event = speaker.event_rxc.try_recv().unwrap();
    let PeerEvent::PeerDown { reason, .. } = event else {
        panic!("expected PeerDown, got {:?}", event);
    };
    assert_eq!(reason, PeerDownReason::NotificationSent(4, 1));
}

#[tokio::test]
async fn marker_error_in_open_sent() {
    let mut speaker = test_speaker();
    connected(&mut speaker);
    assert_eq!(nbr_state(&speaker), fsm::State::OpenSent);
    let _open = sent_msg(&mut speaker).await;

    // A desynchronized stream closes the session with a
    // connection-not-synchronized NOTIFICATION.
    speaker
        .instance
        .process_protocol_msg(ProtocolMsg::NbrRx(NbrRxMsg {
            nbr_addr: NBR_ADDR,
            msg: Err(NbrRxError::MsgDecodeError(DecodeError::MessageHeader(
                MessageHeaderError::ConnectionNotSynchronized,
            ))),
        }));
    assert_eq!(nbr_state(&speaker), fsm::State::Idle);

    let msg = sent_msg(&mut speaker).await;
    let Message::Notification(notif) = msg else {
        panic!("expected NOTIFICATION, got {:?}", msg);
    };
    assert_eq!(notif.error_code, 1);
    assert_eq!(notif.error_subcode, 1);
}

#[tokio::test]
async fn holdtime_disabled() {
    let mut speaker = test_speaker();
    connected(&mut speaker);
    let _open = sent_msg(&mut speaker).await;

    // A zero hold time disables the hold and keepalive timers.
    rcvd_msg(&mut speaker, Message::Open(peer_open(0, "2.2.2.2")));
    assert_eq!(nbr_state(&speaker), fsm::State::OpenConfirm);
    let nbr = speaker.instance.neighbors.get(&NBR_ADDR).unwrap();
    assert_eq!(nbr.holdtime_nego, None);
    assert!(nbr.tasks.holdtime.is_none());
    assert!(nbr.tasks.keepalive.is_none());
}

#[tokio::test]
async fn administrative_stop() {
    let mut speaker = test_speaker();
    establish(&mut speaker).await;

    northbound::process_request(
        &mut speaker.instance,
        Request::Stop { addr: NBR_ADDR },
    );
    assert_eq!(nbr_state(&speaker), fsm::State::Idle);

    let msg = sent_msg(&mut speaker).await;
    let Message::Notification(notif) = msg else {
        panic!("expected NOTIFICATION, got {:?}", msg);
    };
    assert_eq!(notif.error_code, 6);
    assert_eq!(notif.error_subcode, 2);

    let event = speaker.event_rxc.try_recv().unwrap();
    let PeerEvent::PeerDown { reason, .. } = event else {
        panic!("expected PeerDown, got {:?}", event);
    };
    assert_eq!(reason, PeerDownReason::AdminStop);

    // A manually stopped neighbor does not restart automatically.
    let nbr = speaker.instance.neighbors.get(&NBR_ADDR).unwrap();
    assert!(!nbr.config.enabled);
    assert!(nbr.tasks.idle_hold.is_none());
}

#[tokio::test]
async fn update_handoff() {
    let mut speaker = test_speaker();
    establish(&mut speaker).await;

    // Received UPDATE messages are handed to the upper layer.
    rcvd_msg(
        &mut speaker,
        Message::Update(ursa_bgp::packet::message::UpdateMsg {
            reach: None,
            unreach: None,
            mp_reach: None,
            mp_unreach: None,
            attrs: None,
        }),
    );
    assert_eq!(nbr_state(&speaker), fsm::State::Established);

    let event = speaker.event_rxc.try_recv().unwrap();
    assert!(matches!(event, PeerEvent::UpdateRcvd { .. }));
}

#[tokio::test]
async fn collision_remote_wins() {
    let mut speaker = test_speaker();
    connected(&mut speaker);
    let _open = sent_msg(&mut speaker).await;

    // Peer identifier higher than the local one.
    rcvd_msg(&mut speaker, Message::Open(peer_open(30, "2.2.2.2")));
    assert_eq!(nbr_state(&speaker), fsm::State::OpenConfirm);
    let _kalive = sent_msg(&mut speaker).await;

    // An incoming connection from the peer wins the collision: the local
    // connection is closed with a collision-resolution NOTIFICATION and the
    // incoming one is promoted, restarting the OPEN exchange.
    speaker
        .instance
        .process_protocol_msg(ProtocolMsg::TcpAccept(TcpAcceptMsg {
            stream: None,
            conn_info: conn_info(),
        }));
    assert_eq!(nbr_state(&speaker), fsm::State::OpenSent);

    let mut notif_seen = false;
    let mut open_seen = false;
    for _ in 0..2 {
        match sent_msg(&mut speaker).await {
            Message::Notification(notif) => {
                assert_eq!(notif.error_code, 6);
                assert_eq!(notif.error_subcode, 7);
                notif_seen = true;
            }
            Message::Open(_) => open_seen = true,
            msg => panic!("unexpected message: {:?}", msg),
        }
    }
    assert!(notif_seen && open_seen);
}

#[tokio::test]
async fn collision_local_wins() {
    let mut speaker = test_speaker();
    connected(&mut speaker);
    let _open = sent_msg(&mut speaker).await;

    // Peer identifier lower than the local one.
    rcvd_msg(&mut speaker, Message::Open(peer_open(30, "0.0.0.2")));
    assert_eq!(nbr_state(&speaker), fsm::State::OpenConfirm);

    // The local connection prevails and the incoming one is rejected.
    speaker
        .instance
        .process_protocol_msg(ProtocolMsg::TcpAccept(TcpAcceptMsg {
            stream: None,
            conn_info: conn_info(),
        }));
    assert_eq!(nbr_state(&speaker), fsm::State::OpenConfirm);
}
