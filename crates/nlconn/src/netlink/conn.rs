//! Connection engine: framing, sized receives and multi-part reassembly.

use bytes::BytesMut;

use super::config::Config;
use super::error::{Error, Result};
use super::message::{self, Message};
use super::receive::{Accumulator, ReadAction, State, next_read};
use super::socket::{
    AF_NETLINK, MSG_PEEK, NETLINK_ADD_MEMBERSHIP, NETLINK_DROP_MEMBERSHIP, NetlinkAddr,
    SOL_NETLINK, SockAddr, Socket, page_size,
};

/// A bound netlink socket.
///
/// `Conn` sends messages exactly as given and receives whole responses. It
/// does not assign sequence numbers; [`Connection`](super::Connection) does.
pub struct Conn<S> {
    socket: S,
    local: NetlinkAddr,
    kernel: NetlinkAddr,
}

impl<S: Socket> Conn<S> {
    /// Bind `socket` using the groups and port ID from `config`.
    pub fn bind(mut socket: S, config: &Config) -> Result<Self> {
        let local = NetlinkAddr::new(config.pid, config.groups);
        socket.bind(&SockAddr::Netlink(local))?;
        tracing::debug!(pid = local.pid, groups = local.groups, "netlink socket bound");

        Ok(Self {
            socket,
            local,
            kernel: NetlinkAddr::kernel(),
        })
    }

    /// The address the socket was bound to.
    pub fn local_addr(&self) -> NetlinkAddr {
        self.local
    }

    /// Get the underlying socket.
    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Send a message to the kernel.
    ///
    /// The header is sent as-is apart from its length, which is recomputed.
    pub fn send(&self, msg: &Message) -> Result<()> {
        let buf = msg.encode()?;
        tracing::trace!(
            len = buf.len(),
            seq = msg.header.sequence,
            message_type = msg.header.message_type.0,
            "netlink send"
        );
        self.socket.send_to(&buf, 0, &SockAddr::Netlink(self.kernel))
    }

    /// Receive one complete response.
    ///
    /// Keeps reading datagrams while the last message of each is flagged
    /// multi-part. Returns the first nonzero kernel error code found, without
    /// reading further.
    pub fn receive(&self) -> Result<Vec<Message>> {
        let mut acc = Accumulator::new();
        loop {
            let batch = self.receive_batch()?;
            match acc.push(batch) {
                Ok(State::Reading) => continue,
                Ok(_) => return Ok(acc.into_messages()),
                Err(e) => {
                    tracing::debug!(error = %e, "netlink response carried an error");
                    return Err(e);
                }
            }
        }
    }

    /// Read and split one datagram.
    fn receive_batch(&self) -> Result<Vec<Message>> {
        let mut buf = BytesMut::zeroed(page_size());

        let len = loop {
            let (peeked, _) = self.socket.recv_from(&mut buf, MSG_PEEK)?;
            match next_read(buf.len(), peeked) {
                ReadAction::Grow(capacity) => {
                    tracing::trace!(peeked, capacity, "netlink receive buffer too small");
                    buf.resize(capacity, 0);
                }
                ReadAction::Drain(len) => break len,
            }
        };

        let (n, from) = self.socket.recv_from(&mut buf[..len], 0)?;
        check_source(&from)?;

        let batch = message::split(&buf[..n])?;
        tracing::trace!(len = n, messages = batch.len(), "netlink batch received");
        Ok(batch)
    }

    /// Join a multicast group.
    pub fn join_group(&self, group: u32) -> Result<()> {
        self.socket
            .set_option(SOL_NETLINK, NETLINK_ADD_MEMBERSHIP, &group.to_ne_bytes())?;
        tracing::debug!(group, "joined netlink group");
        Ok(())
    }

    /// Leave a multicast group.
    pub fn leave_group(&self, group: u32) -> Result<()> {
        self.socket
            .set_option(SOL_NETLINK, NETLINK_DROP_MEMBERSHIP, &group.to_ne_bytes())?;
        tracing::debug!(group, "left netlink group");
        Ok(())
    }

    /// Close the socket.
    pub fn close(mut self) -> Result<()> {
        self.socket.close()?;
        tracing::debug!(pid = self.local.pid, "netlink socket closed");
        Ok(())
    }
}

fn check_source(from: &SockAddr) -> Result<()> {
    match from {
        SockAddr::Netlink(addr) if addr.family == AF_NETLINK => Ok(()),
        SockAddr::Netlink(addr) => Err(Error::InvalidFamily {
            expected: AF_NETLINK,
            actual: addr.family,
        }),
        SockAddr::Other { .. } => Err(Error::InvalidSockaddr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::message::{Flags, MessageType, NLMSG_HDRLEN};
    use crate::netlink::testing::{SockOpt, TestSocket};

    fn test_conn(config: &Config) -> Conn<TestSocket> {
        Conn::bind(TestSocket::new(), config).unwrap()
    }

    fn request(data: &[u8]) -> Message {
        let mut msg = Message::new(MessageType(0x10), Flags::REQUEST | Flags::ACK, data);
        msg.header.sequence = 1;
        msg.header.pid = std::process::id();
        msg
    }

    fn error_message(code: i32, flags: Flags) -> Message {
        let mut msg = Message::new(MessageType::ERROR, flags, code.to_ne_bytes().to_vec());
        msg.header.sequence = 1;
        msg.header.pid = 1;
        msg
    }

    #[test]
    fn test_bind_default() {
        let conn = test_conn(&Config::new());
        assert_eq!(
            conn.socket().bound(),
            Some(SockAddr::Netlink(NetlinkAddr::new(0, 0)))
        );
    }

    #[test]
    fn test_bind_config() {
        let cases = [
            (Config::new(), 0x0),
            (Config::new().groups(0x10), 0x10),
            (Config::new().groups(0x10 | 0x40), 0x50),
        ];
        for (config, groups) in cases {
            let conn = test_conn(&config);
            assert_eq!(conn.local_addr().groups, groups);
            assert_eq!(
                conn.socket().bound(),
                Some(SockAddr::Netlink(NetlinkAddr::new(0, groups)))
            );
        }
    }

    #[test]
    fn test_bind_pid() {
        let conn = test_conn(&Config::new().pid(4321));
        assert_eq!(conn.local_addr().pid, 4321);
    }

    #[test]
    fn test_send() {
        let conn = test_conn(&Config::new());
        let req = request(&[0x01, 0x02]);
        conn.send(&req).unwrap();

        let sent = conn.socket().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].flags, 0);
        assert_eq!(sent[0].to, SockAddr::Netlink(NetlinkAddr::kernel()));

        let mut want = req.clone();
        want.data.extend_from_slice(&[0x00, 0x00]);
        assert_eq!(Message::decode(&sent[0].bytes).unwrap(), want);
    }

    #[test]
    fn test_send_keeps_header() {
        let conn = test_conn(&Config::new());
        let msg = Message::new(MessageType(0x10), Flags::REQUEST, vec![]);
        conn.send(&msg).unwrap();

        let sent = Message::decode(&conn.socket().sent()[0].bytes).unwrap();
        assert_eq!(sent.header.sequence, 0);
        assert_eq!(sent.header.pid, 0);
    }

    #[test]
    fn test_receive_ack() {
        let req = request(&[0x01, 0x02, 0x00, 0x00]);
        let mut data = 0i32.to_ne_bytes().to_vec();
        data.extend(req.encode().unwrap());
        let mut res = Message::new(MessageType::ERROR, Flags::empty(), data);
        res.header.sequence = 1;
        res.header.pid = std::process::id();
        // header + error code + echoed request
        assert_eq!(res.header.length as usize, NLMSG_HDRLEN + 4 + 20);

        let conn = test_conn(&Config::new());
        conn.socket().push_messages(&[res.clone()]).unwrap();

        let msgs = conn.receive().unwrap();
        assert_eq!(conn.socket().recv_flags(), vec![MSG_PEEK, 0]);
        assert_eq!(msgs, vec![res]);
    }

    #[test]
    fn test_receive_large_message() {
        let n = page_size() * 4;
        let res = Message::new(MessageType::ERROR, Flags::empty(), vec![0u8; n]);

        let conn = test_conn(&Config::new());
        conn.socket().push_messages(&[res]).unwrap();

        let msgs = conn.receive().unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data.len(), n);
        assert_eq!(
            conn.socket().recv_flags(),
            vec![MSG_PEEK, MSG_PEEK, MSG_PEEK, MSG_PEEK, 0]
        );
    }

    #[test]
    fn test_receive_exact_page() {
        // A datagram exactly one page long fills the first peek buffer.
        let n = page_size() - NLMSG_HDRLEN;
        let res = Message::new(MessageType::ERROR, Flags::empty(), vec![0u8; n]);

        let conn = test_conn(&Config::new());
        conn.socket().push_messages(&[res]).unwrap();

        conn.receive().unwrap();
        assert_eq!(conn.socket().recv_flags(), vec![MSG_PEEK, MSG_PEEK, 0]);
    }

    #[test]
    fn test_receive_invalid_sockaddr() {
        let conn = test_conn(&Config::new());
        conn.socket().set_from(SockAddr::Other {
            family: libc::AF_INET as u16,
        });
        conn.socket()
            .push_messages(&[error_message(0, Flags::empty())])
            .unwrap();

        assert!(matches!(conn.receive(), Err(Error::InvalidSockaddr)));
    }

    #[test]
    fn test_receive_invalid_family() {
        let conn = test_conn(&Config::new());
        conn.socket().set_from(SockAddr::Netlink(NetlinkAddr {
            family: AF_NETLINK + 1,
            pid: 0,
            groups: 0,
        }));
        conn.socket()
            .push_messages(&[error_message(0, Flags::empty())])
            .unwrap();

        assert!(matches!(
            conn.receive(),
            Err(Error::InvalidFamily {
                expected: AF_NETLINK,
                actual: 17
            })
        ));
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn test_receive_enoent() {
        let conn = test_conn(&Config::new());
        conn.socket()
            .push_datagram(vec![
                20, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, // header
                0xfe, 0xff, 0xff, 0xff, // -2
            ]);

        let err = conn.receive().unwrap_err();
        assert_eq!(err.errno(), Some(libc::ENOENT));
        assert_eq!(conn.socket().recv_flags(), vec![MSG_PEEK, 0]);
    }

    #[test]
    fn test_receive_eintr_multipart() {
        let conn = test_conn(&Config::new());
        let socket = conn.socket();
        socket
            .push_messages(&[Message::new(MessageType(0x10), Flags::MULTI, vec![])])
            .unwrap();
        socket
            .push_messages(&[error_message(-libc::EINTR, Flags::MULTI)])
            .unwrap();
        socket
            .push_messages(&[Message::new(MessageType(0x10), Flags::empty(), vec![])])
            .unwrap();

        let err = conn.receive().unwrap_err();
        assert!(err.is_interrupted());
        // Two batches, each a peek and a drain; the third stays queued.
        assert_eq!(socket.recv_flags().len(), 4);
        assert_eq!(socket.pending(), 1);
    }

    #[test]
    fn test_receive_multipart_dump() {
        let conn = test_conn(&Config::new());
        let socket = conn.socket();
        let part = |b: u8| Message::new(MessageType(0x10), Flags::MULTI, vec![b; 4]);
        socket.push_messages(&[part(1), part(2)]).unwrap();
        socket.push_messages(&[part(3)]).unwrap();
        socket
            .push_messages(&[Message::new(MessageType::DONE, Flags::MULTI, vec![0; 4])])
            .unwrap();

        let msgs = conn.receive().unwrap();
        assert_eq!(msgs.len(), 4);
        assert!(msgs[3].is_done());
        assert_eq!(socket.pending(), 0);
    }

    #[test]
    fn test_receive_transport_error() {
        let conn = test_conn(&Config::new());
        conn.socket().fail_receives(libc::ENOBUFS);

        match conn.receive() {
            Err(Error::Io(e)) => assert_eq!(e.raw_os_error(), Some(libc::ENOBUFS)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_receive_truncated_batch() {
        let conn = test_conn(&Config::new());
        let mut bytes = request(&[1, 2, 3, 4]).encode().unwrap();
        bytes.truncate(18);
        conn.socket().push_datagram(bytes);

        assert!(matches!(conn.receive(), Err(Error::InvalidLength { .. })));
    }

    #[test]
    fn test_join_leave_group() {
        let conn = test_conn(&Config::new());
        let group = 1u32;

        conn.join_group(group).unwrap();
        conn.leave_group(group).unwrap();

        let want = vec![
            SockOpt {
                level: SOL_NETLINK,
                name: NETLINK_ADD_MEMBERSHIP,
                value: group.to_ne_bytes().to_vec(),
            },
            SockOpt {
                level: SOL_NETLINK,
                name: NETLINK_DROP_MEMBERSHIP,
                value: group.to_ne_bytes().to_vec(),
            },
        ];
        assert_eq!(conn.socket().options(), want);
        assert!(want.iter().all(|o| o.value.len() == 4));
    }

    #[test]
    fn test_close() {
        let mut socket = TestSocket::new();
        socket.close().unwrap();
        assert!(socket.is_closed());
        assert!(socket.close().is_err());

        let conn = test_conn(&Config::new());
        conn.close().unwrap();
    }
}
