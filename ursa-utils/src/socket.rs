//
// Copyright (c) The Ursa Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

#[cfg(not(feature = "testing"))]
pub use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
#[cfg(not(feature = "testing"))]
pub use tokio::net::{TcpListener, TcpSocket, TcpStream};

#[cfg(feature = "testing")]
pub use self::testing::{
    OwnedReadHalf, OwnedWriteHalf, TcpListener, TcpSocket, TcpStream,
};

// Address and port information of an established TCP connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct TcpConnInfo {
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
}

// Extension methods for TcpStream.
pub trait TcpStreamExt {
    // Returns the addresses and ports of both connection endpoints.
    fn conn_info(&self) -> std::io::Result<TcpConnInfo>;
}

// Socket-option helpers shared by every TCP socket type.
#[cfg(not(feature = "testing"))]
pub trait SocketExt: std::os::fd::AsRawFd {
    // Sets the value of the IP_TOS option for this socket.
    fn set_ipv4_tos(&self, tos: u8) -> std::io::Result<()> {
        setsockopt_int(
            self.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_TOS,
            tos as i32,
        )
    }

    // Sets the value of the IPV6_TCLASS option for this socket.
    fn set_ipv6_tclass(&self, tclass: u8) -> std::io::Result<()> {
        setsockopt_int(
            self.as_raw_fd(),
            libc::IPPROTO_IPV6,
            libc::IPV6_TCLASS,
            tclass as i32,
        )
    }
}

#[cfg(not(feature = "testing"))]
impl<T: std::os::fd::AsRawFd> SocketExt for T {}

// ===== impl TcpStream =====

#[cfg(not(feature = "testing"))]
impl TcpStreamExt for TcpStream {
    fn conn_info(&self) -> std::io::Result<TcpConnInfo> {
        let local = self.local_addr()?;
        let remote = self.peer_addr()?;
        Ok(TcpConnInfo {
            local_addr: local.ip(),
            local_port: local.port(),
            remote_addr: remote.ip(),
            remote_port: remote.port(),
        })
    }
}

// ===== helper functions =====

#[cfg(not(feature = "testing"))]
fn setsockopt_int(
    fd: std::os::fd::RawFd,
    level: libc::c_int,
    optname: libc::c_int,
    optval: libc::c_int,
) -> std::io::Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            optname,
            &optval as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

// ===== testing stubs =====

// Inert substitutes used when the `testing` feature is enabled, allowing
// connection-related events to be injected without any real socket.
#[cfg(feature = "testing")]
mod testing {
    #[derive(Debug, Default)]
    pub struct TcpListener();

    #[derive(Debug, Default)]
    pub struct TcpSocket();

    #[derive(Debug, Default)]
    pub struct TcpStream();

    #[derive(Debug, Default)]
    pub struct OwnedReadHalf();

    #[derive(Debug, Default)]
    pub struct OwnedWriteHalf();

    impl TcpStream {
        pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
            (OwnedReadHalf(), OwnedWriteHalf())
        }
    }
}
