//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::error::SendError;
use tokio::time::timeout;
use ursa_utils::ip::{AddressFamily, IpAddrExt};
use ursa_utils::socket::{
    OwnedReadHalf, OwnedWriteHalf, TcpConnInfo, TcpListener, TcpSocket,
    TcpStream, TcpStreamExt,
};
use ursa_utils::task::Task;
use ursa_utils::{Sender, UnboundedReceiver};

use crate::error::{Error, IoError, NbrRxError};
use crate::packet::message::{
    DecodeCxt, EncodeCxt, Message, NotificationMsg,
};
use crate::tasks::messages::input::{NbrRxMsg, TcpAcceptMsg};
use crate::tasks::messages::output::NbrTxMsg;

// Bound on a single TCP connection attempt, in seconds.
const TCP_CONN_TIMEOUT: u64 = 30;

// ===== global functions =====

pub(crate) fn listen_socket(
    af: AddressFamily,
    port: u16,
) -> Result<TcpListener, std::io::Error> {
    #[cfg(not(feature = "testing"))]
    {
        use socket2::{Domain, Protocol, Socket, Type};
        use ursa_utils::socket::SocketExt;

        // Create TCP socket.
        let domain = match af {
            AddressFamily::Ipv4 => Domain::IPV4,
            AddressFamily::Ipv6 => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        socket.set_reuse_address(true)?;
        if af == AddressFamily::Ipv6 {
            socket.set_only_v6(true)?;
        }

        // Set the internet-control precedence for protocol traffic.
        match af {
            AddressFamily::Ipv4 => {
                socket.set_ipv4_tos(libc::IPTOS_PREC_INTERNETCONTROL)?;
            }
            AddressFamily::Ipv6 => {
                socket.set_ipv6_tclass(libc::IPTOS_PREC_INTERNETCONTROL)?;
            }
        }

        // Bind socket.
        let sockaddr = SocketAddr::from((IpAddr::unspecified(af), port));
        socket.bind(&sockaddr.into())?;
        socket.listen(4096)?;

        // Convert the socket into a tokio TcpListener.
        TcpListener::from_std(socket.into())
    }
    #[cfg(feature = "testing")]
    {
        Ok(TcpListener::default())
    }
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn listen_loop(
    listener: Arc<TcpListener>,
    tcp_acceptp: Sender<TcpAcceptMsg>,
) -> Result<(), SendError<TcpAcceptMsg>> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => match stream.conn_info() {
                Ok(conn_info) => {
                    let msg = TcpAcceptMsg {
                        stream: Some(stream),
                        conn_info,
                    };
                    tcp_acceptp.send(msg).await?;
                }
                Err(error) => {
                    IoError::TcpInfoError(error).log();
                }
            },
            Err(error) => {
                IoError::TcpAcceptError(error).log();
            }
        }
    }
}

pub(crate) fn accepted_stream_init(
    stream: &TcpStream,
    af: AddressFamily,
) -> Result<(), std::io::Error> {
    #[cfg(not(feature = "testing"))]
    {
        use ursa_utils::socket::SocketExt;

        // Set the internet-control precedence for protocol traffic.
        match af {
            AddressFamily::Ipv4 => {
                stream.set_ipv4_tos(libc::IPTOS_PREC_INTERNETCONTROL)?;
            }
            AddressFamily::Ipv6 => {
                stream.set_ipv6_tclass(libc::IPTOS_PREC_INTERNETCONTROL)?;
            }
        }
    }

    Ok(())
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn connect(
    remote_addr: IpAddr,
    port: u16,
) -> Result<(TcpStream, TcpConnInfo), Error> {
    use ursa_utils::socket::SocketExt;

    let af = remote_addr.address_family();

    // Create TCP socket.
    let socket = match af {
        AddressFamily::Ipv4 => TcpSocket::new_v4(),
        AddressFamily::Ipv6 => TcpSocket::new_v6(),
    }
    .map_err(IoError::TcpSocketError)?;

    // Set the internet-control precedence for protocol traffic.
    match af {
        AddressFamily::Ipv4 => {
            socket.set_ipv4_tos(libc::IPTOS_PREC_INTERNETCONTROL)
        }
        AddressFamily::Ipv6 => {
            socket.set_ipv6_tclass(libc::IPTOS_PREC_INTERNETCONTROL)
        }
    }
    .map_err(IoError::TcpSocketError)?;

    // Connect to the remote address on the BGP port, bounded by the dial
    // timeout.
    let sockaddr = SocketAddr::from((remote_addr, port));
    let stream =
        timeout(Duration::from_secs(TCP_CONN_TIMEOUT), socket.connect(sockaddr))
            .await
            .map_err(|_| {
                IoError::TcpConnectError(std::io::Error::from(
                    std::io::ErrorKind::TimedOut,
                ))
            })?
            .map_err(IoError::TcpConnectError)?;

    // Obtain TCP connection address/port information.
    let conn_info = stream.conn_info().map_err(IoError::TcpInfoError)?;

    Ok((stream, conn_info))
}

// Writes a closing NOTIFICATION on a connection that will not be promoted
// to a session (connection collision, rejected inbound connection).
pub(crate) fn close_with_notification(stream: TcpStream, msg: NotificationMsg) {
    #[cfg(not(feature = "testing"))]
    {
        let mut task = Task::spawn(async move {
            let mut stream = stream;
            let cxt = EncodeCxt {
                capabilities: Default::default(),
            };
            let buf = Message::Notification(msg).encode(&cxt);
            if let Err(error) = stream.write_all(&buf).await {
                IoError::TcpSendError(error).log();
            }
        });
        task.detach();
    }
    #[cfg(feature = "testing")]
    {
        let _ = (stream, msg);
    }
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn nbr_write_loop(
    mut stream: OwnedWriteHalf,
    mut cxt: EncodeCxt,
    mut nbr_msg_txc: UnboundedReceiver<NbrTxMsg>,
    bytes_sent: Arc<AtomicU64>,
) {
    while let Some(msg) = nbr_msg_txc.recv().await {
        match msg {
            // Send message to the peer.
            NbrTxMsg::SendMessage { msg, .. } => {
                let buf = msg.encode(&cxt);
                match stream.write_all(&buf).await {
                    Ok(_) => {
                        bytes_sent
                            .fetch_add(buf.len() as u64, Ordering::Relaxed);
                    }
                    Err(error) => {
                        IoError::TcpSendError(error).log();
                    }
                }
            }
            // Update negotiated capabilities.
            NbrTxMsg::UpdateCapabilities(caps) => cxt.capabilities = caps,
        }
    }
}

#[cfg(not(feature = "testing"))]
pub(crate) async fn nbr_read_loop(
    mut stream: OwnedReadHalf,
    nbr_addr: IpAddr,
    mut cxt: DecodeCxt,
    nbr_msg_rxp: Sender<NbrRxMsg>,
    bytes_rcvd: Arc<AtomicU64>,
) -> Result<(), SendError<NbrRxMsg>> {
    const BUF_SIZE: usize = 65535;
    let mut buf = [0; BUF_SIZE];
    let mut data = Vec::with_capacity(BUF_SIZE);

    loop {
        // Read data from the network.
        match stream.read(&mut buf).await {
            Ok(0) => {
                // Notify that the connection was closed by the remote end.
                let msg = NbrRxMsg {
                    nbr_addr,
                    msg: Err(NbrRxError::TcpConnClosed),
                };
                nbr_msg_rxp.send(msg).await?;
                return Ok(());
            }
            Ok(num_bytes) => {
                bytes_rcvd.fetch_add(num_bytes as u64, Ordering::Relaxed);
                data.extend_from_slice(&buf[..num_bytes]);
            }
            Err(error) => {
                IoError::TcpRecvError(error).log();
                continue;
            }
        };

        // Decode message(s).
        while let Some(msg_size) = Message::get_message_len(&data) {
            let msg = Message::decode(&data[0..msg_size], &cxt)
                .map_err(NbrRxError::MsgDecodeError);
            data.drain(..msg_size);

            // Keep track of received capabilities as they influence how
            // some messages should be decoded.
            if let Ok(Message::Open(msg)) = &msg {
                let capabilities = msg
                    .capabilities
                    .iter()
                    .map(|cap| cap.as_negotiated())
                    .collect::<BTreeSet<_>>();
                cxt.capabilities = capabilities;
            }

            // Notify that the BGP message was received.
            let msg = NbrRxMsg { nbr_addr, msg };
            nbr_msg_rxp.send(msg).await?;
        }
    }
}
