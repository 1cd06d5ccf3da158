//! Blocking netlink connection engine for Linux.
//!
//! This module frames netlink messages, sends them to the kernel and reads
//! complete responses back: it sizes receive buffers so no datagram is
//! truncated, reassembles multi-part responses, and turns kernel error
//! messages into [`Error`]s. Payloads are opaque bytes.
//!
//! # Quick Start
//!
//! ```ignore
//! use nlconn::netlink::{Connection, Flags, Message, MessageType, Protocol};
//!
//! let conn = Connection::new(Protocol::Generic)?;
//!
//! // Ask for an ACK; the kernel echoes the request back.
//! let req = Message::new(MessageType(0), Flags::REQUEST | Flags::ACK, vec![]);
//! let replies = conn.execute(req)?;
//! assert_eq!(replies[0].error_code()?, 0);
//! ```
//!
//! # Layers
//!
//! - [`Socket`] is the capability a connection is built on. [`OsSocket`] is
//!   the real `AF_NETLINK` socket; tests substitute an in-memory one.
//! - [`Conn`] binds a socket and implements send and receive.
//! - [`Connection`] adds sequence numbering and [`Connection::execute`].
//!
//! # Multicast
//!
//! ```ignore
//! use nlconn::netlink::{Config, Connection, Protocol};
//!
//! // RTMGRP_LINK at bind time, RTNLGRP_IPV4_IFADDR afterwards.
//! let conn = Connection::dial(Protocol::Route, &Config::new().groups(0x1))?;
//! conn.join_group(5)?;
//!
//! loop {
//!     for msg in conn.receive()? {
//!         println!("{:?}", msg.header);
//!     }
//! }
//! ```

mod config;
pub mod conn;
pub mod connection;
mod error;
pub mod message;
mod receive;
pub mod socket;
mod sys;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::Config;
pub use conn::Conn;
pub use connection::Connection;
pub use error::{Error, Result};
pub use message::{Flags, Header, Message, MessageIter, MessageType, NLMSG_HDRLEN};
pub use socket::{NetlinkAddr, Protocol, SockAddr, Socket};
pub use sys::OsSocket;
