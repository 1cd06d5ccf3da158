//! Operating system netlink socket.

#[cfg(target_os = "linux")]
pub use linux::OsSocket;
#[cfg(not(target_os = "linux"))]
pub use unsupported::OsSocket;

#[cfg(target_os = "linux")]
mod linux {
    use std::io;
    use std::mem;
    use std::os::unix::io::{AsRawFd, RawFd};

    use netlink_sys::{Socket as RawSocket, SocketAddr};

    use crate::netlink::error::{Error, Result};
    use crate::netlink::socket::{NetlinkAddr, Protocol, SockAddr, Socket};

    /// Blocking `AF_NETLINK` socket.
    pub struct OsSocket {
        /// `None` once closed.
        inner: Option<RawSocket>,
        protocol: Protocol,
    }

    impl OsSocket {
        /// Open an unbound netlink socket for `protocol`.
        pub fn new(protocol: Protocol) -> Result<Self> {
            let socket = RawSocket::new(protocol.number() as isize)?;
            Ok(Self {
                inner: Some(socket),
                protocol,
            })
        }

        /// The protocol this socket speaks.
        pub fn protocol(&self) -> Protocol {
            self.protocol
        }

        /// Port ID the kernel assigned at bind time.
        pub fn port_id(&self) -> Result<u32> {
            let mut addr = SocketAddr::new(0, 0);
            self.socket()?.get_address(&mut addr)?;
            Ok(addr.port_number())
        }

        fn socket(&self) -> Result<&RawSocket> {
            self.inner
                .as_ref()
                .ok_or_else(|| Error::Io(io::Error::from_raw_os_error(libc::EBADF)))
        }
    }

    fn netlink_addr(addr: &SockAddr) -> Result<SocketAddr> {
        match addr {
            SockAddr::Netlink(nl) => Ok(SocketAddr::new(nl.pid, nl.groups)),
            SockAddr::Other { .. } => Err(Error::InvalidSockaddr),
        }
    }

    impl Socket for OsSocket {
        fn bind(&mut self, addr: &SockAddr) -> Result<()> {
            let addr = netlink_addr(addr)?;
            let socket = self
                .inner
                .as_mut()
                .ok_or_else(|| Error::Io(io::Error::from_raw_os_error(libc::EBADF)))?;
            socket.bind(&addr)?;
            Ok(())
        }

        fn send_to(&self, buf: &[u8], flags: i32, addr: &SockAddr) -> Result<()> {
            let addr = netlink_addr(addr)?;
            self.socket()?.send_to(buf, &addr, flags)?;
            Ok(())
        }

        fn recv_from(&self, buf: &mut [u8], flags: i32) -> Result<(usize, SockAddr)> {
            let fd = self.socket()?.as_raw_fd();
            // SAFETY: sockaddr_storage is plain old data; all-zero is valid.
            let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
            let mut addr_len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

            // SAFETY: buf is valid for buf.len() writable bytes and storage
            // for addr_len bytes; both outlive the call.
            let ret = unsafe {
                libc::recvfrom(
                    fd,
                    buf.as_mut_ptr().cast::<libc::c_void>(),
                    buf.len(),
                    flags,
                    (&raw mut storage).cast::<libc::sockaddr>(),
                    &mut addr_len,
                )
            };
            if ret < 0 {
                return Err(Error::Io(io::Error::last_os_error()));
            }

            // MSG_PEEK may report the full datagram size; never claim more
            // than the buffer holds.
            let n = (ret as usize).min(buf.len());
            Ok((n, source_addr(&storage, addr_len)))
        }

        fn set_option(&self, level: i32, name: i32, value: &[u8]) -> Result<()> {
            let fd = self.socket()?.as_raw_fd();
            // SAFETY: value points to value.len() initialized bytes that
            // outlive the call.
            let ret = unsafe {
                libc::setsockopt(
                    fd,
                    level,
                    name,
                    value.as_ptr().cast::<libc::c_void>(),
                    value.len() as libc::socklen_t,
                )
            };
            if ret < 0 {
                return Err(Error::Io(io::Error::last_os_error()));
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            // Dropping the socket closes the descriptor.
            match self.inner.take() {
                Some(_) => Ok(()),
                None => Err(Error::Io(io::Error::from_raw_os_error(libc::EBADF))),
            }
        }
    }

    /// Map the address filled in by `recvfrom`.
    ///
    /// An address the size of `sockaddr_nl` is read as one, keeping whatever
    /// family it reports; anything else is passed on by family only.
    fn source_addr(
        storage: &libc::sockaddr_storage,
        len: libc::socklen_t,
    ) -> SockAddr {
        if len as usize != mem::size_of::<libc::sockaddr_nl>() {
            return SockAddr::Other {
                family: storage.ss_family,
            };
        }

        // SAFETY: sockaddr_storage is large and aligned enough for any
        // socket address, and len says a sockaddr_nl was written.
        let nl = unsafe {
            &*(storage as *const libc::sockaddr_storage).cast::<libc::sockaddr_nl>()
        };
        SockAddr::Netlink(NetlinkAddr {
            family: nl.nl_family,
            pid: nl.nl_pid,
            groups: nl.nl_groups,
        })
    }

    impl AsRawFd for OsSocket {
        fn as_raw_fd(&self) -> RawFd {
            self.inner.as_ref().map_or(-1, |s| s.as_raw_fd())
        }
    }

}

#[cfg(not(target_os = "linux"))]
mod unsupported {
    use crate::netlink::error::{Error, Result};
    use crate::netlink::socket::{Protocol, SockAddr, Socket};

    /// Placeholder on platforms without netlink; every operation fails with
    /// [`Error::Unimplemented`].
    pub struct OsSocket {
        _private: (),
    }

    impl OsSocket {
        pub fn new(_protocol: Protocol) -> Result<Self> {
            Err(Error::Unimplemented)
        }

        pub fn port_id(&self) -> Result<u32> {
            Err(Error::Unimplemented)
        }
    }

    impl Socket for OsSocket {
        fn bind(&mut self, _addr: &SockAddr) -> Result<()> {
            Err(Error::Unimplemented)
        }

        fn send_to(&self, _buf: &[u8], _flags: i32, _addr: &SockAddr) -> Result<()> {
            Err(Error::Unimplemented)
        }

        fn recv_from(&self, _buf: &mut [u8], _flags: i32) -> Result<(usize, SockAddr)> {
            Err(Error::Unimplemented)
        }

        fn set_option(&self, _level: i32, _name: i32, _value: &[u8]) -> Result<()> {
            Err(Error::Unimplemented)
        }

        fn close(&mut self) -> Result<()> {
            Err(Error::Unimplemented)
        }
    }

}
