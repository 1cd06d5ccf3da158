//! Socket capability: the primitive operations a netlink connection needs.
//!
//! [`Socket`] is the seam between the connection engine and the operating
//! system. [`OsSocket`](super::OsSocket) implements it over a real
//! `AF_NETLINK` socket; the in-memory `TestSocket` (feature `testing`)
//! implements it for tests.

use super::error::Result;

/// Netlink address family (`AF_NETLINK`).
pub const AF_NETLINK: u16 = 16;

/// Socket option level for netlink options (`SOL_NETLINK`).
pub const SOL_NETLINK: i32 = 270;

/// Join a multicast group (`NETLINK_ADD_MEMBERSHIP`).
pub const NETLINK_ADD_MEMBERSHIP: i32 = 1;

/// Leave a multicast group (`NETLINK_DROP_MEMBERSHIP`).
pub const NETLINK_DROP_MEMBERSHIP: i32 = 2;

/// Receive flag: report pending data without dequeuing it (`MSG_PEEK`).
pub const MSG_PEEK: i32 = 0x2;

/// Netlink socket address (mirrors struct sockaddr_nl).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetlinkAddr {
    /// Address family, `AF_NETLINK` for every well-formed address.
    pub family: u16,
    /// Port ID; 0 is the kernel, or "assign one" when binding.
    pub pid: u32,
    /// Multicast group bitmask.
    pub groups: u32,
}

impl NetlinkAddr {
    /// Create an `AF_NETLINK` address.
    pub const fn new(pid: u32, groups: u32) -> Self {
        Self {
            family: AF_NETLINK,
            pid,
            groups,
        }
    }

    /// The kernel's address: port 0, no groups.
    pub const fn kernel() -> Self {
        Self::new(0, 0)
    }
}

impl Default for NetlinkAddr {
    fn default() -> Self {
        Self::kernel()
    }
}

/// Socket address as reported by a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SockAddr {
    /// A netlink address.
    Netlink(NetlinkAddr),
    /// Any other address family.
    Other {
        /// The raw address family.
        family: u16,
    },
}

impl From<NetlinkAddr> for SockAddr {
    fn from(addr: NetlinkAddr) -> Self {
        Self::Netlink(addr)
    }
}

/// The primitive operations of a netlink transport.
///
/// Operations take `&self` where the kernel allows concurrent use of one
/// descriptor, so a connection can be shared between threads when the
/// implementation is `Sync`.
pub trait Socket {
    /// Bind the socket to a local address.
    fn bind(&mut self, addr: &SockAddr) -> Result<()>;

    /// Send one datagram to `addr`.
    fn send_to(&self, buf: &[u8], flags: i32, addr: &SockAddr) -> Result<()>;

    /// Receive one datagram into `buf`.
    ///
    /// Returns the number of bytes placed in `buf` (never more than its
    /// length) and the sender's address. With [`MSG_PEEK`] the datagram stays
    /// queued.
    fn recv_from(&self, buf: &mut [u8], flags: i32) -> Result<(usize, SockAddr)>;

    /// Set a socket option; `value` is the option's raw bytes.
    fn set_option(&self, level: i32, name: i32, value: &[u8]) -> Result<()>;

    /// Close the socket.
    fn close(&mut self) -> Result<()>;
}

/// Netlink protocol families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Routing/device hook (ip, tc, etc.)
    Route,
    /// Socket diagnostics
    SockDiag,
    /// Audit
    Audit,
    /// Kernel connector
    Connector,
    /// Netfilter
    Netfilter,
    /// Kobject uevent
    KobjectUevent,
    /// Generic netlink
    Generic,
    /// Any other protocol number.
    Other(i32),
}

impl Protocol {
    /// The protocol number passed to `socket(2)`.
    pub fn number(self) -> i32 {
        match self {
            Protocol::Route => 0,
            Protocol::SockDiag => 4,
            Protocol::Audit => 9,
            Protocol::Connector => 11,
            Protocol::Netfilter => 12,
            Protocol::KobjectUevent => 15,
            Protocol::Generic => 16,
            Protocol::Other(n) => n,
        }
    }
}

impl From<i32> for Protocol {
    fn from(n: i32) -> Self {
        match n {
            0 => Protocol::Route,
            4 => Protocol::SockDiag,
            9 => Protocol::Audit,
            11 => Protocol::Connector,
            12 => Protocol::Netfilter,
            15 => Protocol::KobjectUevent,
            16 => Protocol::Generic,
            n => Protocol::Other(n),
        }
    }
}

/// Size of a memory page, the initial receive buffer capacity.
pub fn page_size() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as usize;
        }
    }
    4096
}
