//! Blocking netlink client for Linux.
//!
//! This crate implements the connection layer of netlink: binding a socket,
//! framing requests, receiving whole (possibly multi-part) responses and
//! decoding kernel error messages. Family payloads (rtnetlink attributes,
//! generic netlink commands) are left to the caller as raw bytes.
//!
//! On platforms other than Linux every operation fails with
//! [`Error::Unimplemented`].
//!
//! # Features
//!
//! - `serde` - `Serialize`/`Deserialize` for [`netlink::Config`]
//! - `testing` - in-memory `TestSocket` for driving connections in tests
//! - `integration` - enable tests against the running kernel
//!
//! # Example
//!
//! ```ignore
//! use nlconn::netlink::{Connection, Flags, Message, MessageType, Protocol};
//!
//! fn main() -> nlconn::Result<()> {
//!     let conn = Connection::new(Protocol::Generic)?;
//!
//!     let req = Message::new(MessageType(0), Flags::REQUEST | Flags::ACK, vec![]);
//!     for reply in conn.execute(req)? {
//!         println!("{:?}: code {}", reply.header, reply.error_code()?);
//!     }
//!
//!     conn.close()
//! }
//! ```

pub mod netlink;

// Re-export common types at crate root for convenience
pub use netlink::{Config, Connection, Error, Message, Protocol, Result};
