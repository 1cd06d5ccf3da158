//! In-memory socket for exercising connections without a kernel.
//!
//! [`TestSocket`] records every call the engine makes and replays queued
//! datagrams, honouring [`MSG_PEEK`] the way the kernel does: a peek copies
//! at most the buffer's length and leaves the datagram queued.
//!
//! # Example
//!
//! ```
//! use nlconn::netlink::testing::TestSocket;
//! use nlconn::netlink::{Config, Conn, Flags, Message, MessageType};
//!
//! let conn = Conn::bind(TestSocket::echoing(), &Config::new())?;
//! conn.send(&Message::new(MessageType(0x10), Flags::REQUEST | Flags::ACK, vec![]))?;
//!
//! let replies = conn.receive()?;
//! assert_eq!(replies.len(), 1);
//! assert_eq!(replies[0].error_code()?, 0);
//! # Ok::<(), nlconn::Error>(())
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::{Error, Result};
use super::message::{Flags, Message, MessageType};
use super::socket::{MSG_PEEK, NetlinkAddr, SockAddr, Socket};

/// A datagram handed to [`Socket::send_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub bytes: Vec<u8>,
    pub flags: i32,
    pub to: SockAddr,
}

/// A call to [`Socket::set_option`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SockOpt {
    pub level: i32,
    pub name: i32,
    pub value: Vec<u8>,
}

#[derive(Debug)]
struct State {
    bound: Option<SockAddr>,
    sent: Vec<Sent>,
    recv_flags: Vec<i32>,
    queue: VecDeque<Vec<u8>>,
    from: SockAddr,
    options: Vec<SockOpt>,
    recv_errno: Option<i32>,
    echo: bool,
    closed: bool,
}

/// Scriptable in-memory [`Socket`].
#[derive(Debug)]
pub struct TestSocket {
    state: Mutex<State>,
}

impl Default for TestSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSocket {
    /// A socket with nothing queued that reports the kernel as every sender.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                bound: None,
                sent: Vec::new(),
                recv_flags: Vec::new(),
                queue: VecDeque::new(),
                from: SockAddr::Netlink(NetlinkAddr::kernel()),
                options: Vec::new(),
                recv_errno: None,
                echo: false,
                closed: false,
            }),
        }
    }

    /// A socket that answers every request with a success ACK, the way the
    /// kernel does for requests flagged [`Flags::ACK`].
    ///
    /// The ACK carries the request's sequence number and port ID, and its
    /// payload is a zero error code followed by the whole request.
    pub fn echoing() -> Self {
        let socket = Self::new();
        socket.lock().echo = true;
        socket
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one raw datagram.
    pub fn push_datagram(&self, bytes: Vec<u8>) {
        self.lock().queue.push_back(bytes);
    }

    /// Queue one datagram holding `messages` back to back.
    pub fn push_messages(&self, messages: &[Message]) -> Result<()> {
        let mut bytes = Vec::new();
        for msg in messages {
            bytes.extend(msg.encode()?);
        }
        self.push_datagram(bytes);
        Ok(())
    }

    /// Report `from` as the sender of every received datagram.
    pub fn set_from(&self, from: SockAddr) {
        self.lock().from = from;
    }

    /// Fail every subsequent receive with the OS error `errno`.
    pub fn fail_receives(&self, errno: i32) {
        self.lock().recv_errno = Some(errno);
    }

    /// Address passed to [`Socket::bind`], if any.
    pub fn bound(&self) -> Option<SockAddr> {
        self.lock().bound
    }

    /// Every datagram sent so far.
    pub fn sent(&self) -> Vec<Sent> {
        self.lock().sent.clone()
    }

    /// Flags of every receive call so far, in order.
    pub fn recv_flags(&self) -> Vec<i32> {
        self.lock().recv_flags.clone()
    }

    /// Every option set so far.
    pub fn options(&self) -> Vec<SockOpt> {
        self.lock().options.clone()
    }

    /// Number of datagrams still queued.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

fn closed_error() -> Error {
    Error::Io(io::Error::from_raw_os_error(libc::EBADF))
}

fn ack_for(request: &[u8]) -> Result<Vec<u8>> {
    let req = Message::decode(request)?;
    let mut data = 0i32.to_ne_bytes().to_vec();
    data.extend_from_slice(request);

    let mut ack = Message::new(MessageType::ERROR, Flags::empty(), data);
    ack.header.sequence = req.header.sequence;
    ack.header.pid = req.header.pid;
    ack.encode()
}

impl Socket for TestSocket {
    fn bind(&mut self, addr: &SockAddr) -> Result<()> {
        self.lock().bound = Some(*addr);
        Ok(())
    }

    fn send_to(&self, buf: &[u8], flags: i32, addr: &SockAddr) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(closed_error());
        }
        state.sent.push(Sent {
            bytes: buf.to_vec(),
            flags,
            to: *addr,
        });
        if state.echo {
            let ack = ack_for(buf)?;
            state.queue.push_back(ack);
        }
        Ok(())
    }

    fn recv_from(&self, buf: &mut [u8], flags: i32) -> Result<(usize, SockAddr)> {
        let mut state = self.lock();
        if state.closed {
            return Err(closed_error());
        }
        state.recv_flags.push(flags);
        if let Some(errno) = state.recv_errno {
            return Err(Error::Io(io::Error::from_raw_os_error(errno)));
        }

        let from = state.from;
        let n = match state.queue.front() {
            Some(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                n
            }
            None => 0,
        };
        if flags & MSG_PEEK == 0 {
            state.queue.pop_front();
        }
        Ok((n, from))
    }

    fn set_option(&self, level: i32, name: i32, value: &[u8]) -> Result<()> {
        self.lock().options.push(SockOpt {
            level,
            name,
            value: value.to_vec(),
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(closed_error());
        }
        state.closed = true;
        Ok(())
    }
}
