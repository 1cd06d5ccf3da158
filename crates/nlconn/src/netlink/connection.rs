//! High-level netlink connection with request/response handling.

use std::sync::atomic::{AtomicU32, Ordering};

use super::config::Config;
use super::conn::Conn;
use super::error::Result;
use super::message::Message;
use super::socket::{NetlinkAddr, Protocol, Socket};
use super::sys::OsSocket;

/// Netlink connection.
///
/// Wraps a bound [`Conn`] with a sequence counter so that
/// [`execute`](Self::execute) can number requests. The counter is atomic and
/// the connection is `Sync` when its socket is, but responses are read in
/// arrival order: two threads calling `execute` on the same connection may
/// read each other's replies. Give each thread its own connection.
pub struct Connection<S = OsSocket> {
    conn: Conn<S>,
    /// Next sequence number to hand out.
    seq: AtomicU32,
    /// Port ID stamped on requests that carry none.
    pid: u32,
}

impl Connection<OsSocket> {
    /// Open a connection for `protocol` with the default configuration.
    pub fn new(protocol: Protocol) -> Result<Self> {
        Self::dial(protocol, &Config::default())
    }

    /// Open and bind a connection for `protocol`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use nlconn::netlink::{Config, Connection, Flags, Message, MessageType, Protocol};
    ///
    /// let conn = Connection::dial(Protocol::Generic, &Config::new())?;
    /// let req = Message::new(MessageType(0), Flags::REQUEST | Flags::ACK, vec![]);
    /// let replies = conn.execute(req)?;
    /// assert_eq!(replies[0].error_code()?, 0);
    /// ```
    pub fn dial(protocol: Protocol, config: &Config) -> Result<Self> {
        let socket = OsSocket::new(protocol)?;
        let conn = Conn::bind(socket, config)?;
        let pid = conn.socket().port_id()?;
        tracing::debug!(?protocol, pid, "netlink connection established");

        Ok(Self {
            conn,
            seq: AtomicU32::new(1),
            pid,
        })
    }
}

impl<S: Socket> Connection<S> {
    /// Wrap an already bound engine.
    ///
    /// Requests are stamped with the bound port ID, or with the process ID
    /// when the kernel was left to pick one.
    pub fn from_conn(conn: Conn<S>) -> Self {
        let pid = match conn.local_addr().pid {
            0 => std::process::id(),
            pid => pid,
        };
        Self {
            conn,
            seq: AtomicU32::new(1),
            pid,
        }
    }

    /// Start numbering requests from `next`.
    pub fn with_sequence(self, next: u32) -> Self {
        Self {
            seq: AtomicU32::new(next),
            ..self
        }
    }

    /// Get the next sequence number.
    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Port ID stamped on outgoing requests.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The address the socket was bound to.
    pub fn local_addr(&self) -> NetlinkAddr {
        self.conn.local_addr()
    }

    /// Get the underlying socket.
    pub fn socket(&self) -> &S {
        self.conn.socket()
    }

    /// Send a message as-is.
    pub fn send(&self, msg: &Message) -> Result<()> {
        self.conn.send(msg)
    }

    /// Receive one complete response.
    pub fn receive(&self) -> Result<Vec<Message>> {
        self.conn.receive()
    }

    /// Send a request and wait for its response.
    ///
    /// A zero sequence number or port ID in the request is filled in first.
    /// The end-of-dump marker is dropped from the returned messages; ACKs
    /// are kept.
    pub fn execute(&self, mut msg: Message) -> Result<Vec<Message>> {
        if msg.header.sequence == 0 {
            msg.header.sequence = self.next_seq();
        }
        if msg.header.pid == 0 {
            msg.header.pid = self.pid;
        }

        self.conn.send(&msg)?;
        let mut replies = self.conn.receive()?;

        if let Some(reply) = replies
            .iter()
            .find(|r| r.header.sequence != msg.header.sequence)
        {
            tracing::warn!(
                expected = msg.header.sequence,
                actual = reply.header.sequence,
                "netlink reply with unexpected sequence number"
            );
        }

        replies.retain(|m| !m.is_done_sentinel());
        Ok(replies)
    }

    /// Subscribe to a multicast group.
    pub fn join_group(&self, group: u32) -> Result<()> {
        self.conn.join_group(group)
    }

    /// Unsubscribe from a multicast group.
    pub fn leave_group(&self, group: u32) -> Result<()> {
        self.conn.leave_group(group)
    }

    /// Close the connection.
    pub fn close(self) -> Result<()> {
        self.conn.close()
    }
}


#[cfg(test)]
mod send_sync_tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn connection_is_send_sync() {
        assert_send::<Connection>();
        assert_sync::<Connection>();
        assert_send::<Connection<crate::netlink::testing::TestSocket>>();
        assert_sync::<Connection<crate::netlink::testing::TestSocket>>();
    }
}
