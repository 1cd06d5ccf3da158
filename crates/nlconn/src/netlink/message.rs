//! Netlink message header, framing and splitting.
//!
//! A netlink datagram is a sequence of messages, each a fixed 16-byte
//! [`Header`] followed by an opaque payload padded to [`NLMSG_ALIGNTO`].
//! This module only knows the generic header and the error-message
//! convention; family payloads are plain bytes.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Netlink message header alignment.
pub const NLMSG_ALIGNTO: usize = 4;

/// Align a length to NLMSG_ALIGNTO boundary.
#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// Size of the netlink message header.
pub const NLMSG_HDRLEN: usize = nlmsg_align(std::mem::size_of::<Header>());

/// Unaligned length of a message carrying `payload` bytes.
#[inline]
pub const fn nlmsg_length(payload: usize) -> usize {
    payload + NLMSG_HDRLEN
}

/// Largest payload that still fits an aligned `u32` message length.
pub const MAX_PAYLOAD_LEN: usize = (u32::MAX as usize & !(NLMSG_ALIGNTO - 1)) - NLMSG_HDRLEN;

/// Size of the error code at the start of an error message payload.
const ERROR_CODE_LEN: usize = std::mem::size_of::<i32>();

/// Netlink message type.
///
/// Values below [`MessageType::MIN_TYPE`] are reserved for the protocol
/// itself; everything at or above it belongs to the netlink family.
#[repr(transparent)]
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct MessageType(pub u16);

impl MessageType {
    /// No operation, message must be discarded.
    pub const NOOP: Self = Self(1);
    /// Error message or ACK.
    pub const ERROR: Self = Self(2);
    /// End of multipart message.
    pub const DONE: Self = Self(3);
    /// Data lost, request resend.
    pub const OVERRUN: Self = Self(4);
    /// First type available to netlink families.
    pub const MIN_TYPE: Self = Self(0x10);

    /// Check if this type is reserved for the protocol.
    pub fn is_reserved(self) -> bool {
        self.0 < Self::MIN_TYPE.0
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NOOP => f.write_str("Noop"),
            Self::ERROR => f.write_str("Error"),
            Self::DONE => f.write_str("Done"),
            Self::OVERRUN => f.write_str("Overrun"),
            Self(other) => write!(f, "MessageType({other})"),
        }
    }
}

impl From<u16> for MessageType {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Netlink message flags.
#[repr(transparent)]
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
pub struct Flags(pub u16);

impl Flags {
    pub const REQUEST: Self = Self(0x01);
    pub const MULTI: Self = Self(0x02);
    pub const ACK: Self = Self(0x04);
    pub const ECHO: Self = Self(0x08);
    pub const DUMP_INTR: Self = Self(0x10);
    pub const DUMP_FILTERED: Self = Self(0x20);

    // Modifiers to GET request
    pub const ROOT: Self = Self(0x100);
    pub const MATCH: Self = Self(0x200);
    pub const ATOMIC: Self = Self(0x400);
    pub const DUMP: Self = Self(Self::ROOT.0 | Self::MATCH.0);

    // Modifiers to NEW request
    pub const REPLACE: Self = Self(0x100);
    pub const EXCL: Self = Self(0x200);
    pub const CREATE: Self = Self(0x400);
    pub const APPEND: Self = Self(0x800);

    /// No flags set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Check if every bit in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({:#06x})", self.0)
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Flags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Netlink message header (mirrors struct nlmsghdr).
///
/// Fields are native-endian, exactly as the kernel lays them out.
#[repr(C)]
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
pub struct Header {
    /// Length of message including header.
    pub length: u32,
    /// Message type.
    pub message_type: MessageType,
    /// Additional flags.
    pub flags: Flags,
    /// Sequence number.
    pub sequence: u32,
    /// Sending process port ID.
    pub pid: u32,
}

impl Header {
    /// Create a header for an empty message.
    pub fn new(message_type: MessageType, flags: Flags) -> Self {
        Self {
            length: NLMSG_HDRLEN as u32,
            message_type,
            flags,
            sequence: 0,
            pid: 0,
        }
    }

    /// Parse a header from the front of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from_prefix(data)
            .map(|(header, _)| header)
            .map_err(|_| Error::ShortMessage {
                expected: NLMSG_HDRLEN,
                actual: data.len(),
            })
    }
}

/// A netlink message: header plus opaque payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub data: Vec<u8>,
}

impl Message {
    /// Create a message, sizing the header length for `data`.
    pub fn new(message_type: MessageType, flags: Flags, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let mut header = Header::new(message_type, flags);
        header.length = header_length(data.len());
        Self { header, data }
    }

    /// Encoded size of this message, padding included.
    pub fn encoded_len(&self) -> Result<usize> {
        encoded_len(self.data.len())
    }

    /// Encode the message.
    ///
    /// The header length is recomputed from the payload; the payload is
    /// zero-padded to [`NLMSG_ALIGNTO`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = self.encoded_len()?;
        let mut header = self.header;
        header.length = len as u32;

        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(&self.data);
        buf.resize(len, 0);
        Ok(buf)
    }

    /// Decode a single message from the front of `buf`.
    ///
    /// The payload runs from the end of the header to the aligned length
    /// (clipped to `buf`), so trailing padding stays in `data`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let header = Header::from_bytes(buf)?;
        let len = header.length as usize;
        if len < NLMSG_HDRLEN || len > buf.len() {
            return Err(Error::InvalidLength {
                declared: len,
                available: buf.len(),
            });
        }

        let end = nlmsg_align(len).min(buf.len());
        Ok(Self {
            header,
            data: buf[NLMSG_HDRLEN..end].to_vec(),
        })
    }

    /// Check if this is an error message (or ACK).
    pub fn is_error(&self) -> bool {
        self.header.message_type == MessageType::ERROR
    }

    /// Check if this is a done message.
    pub fn is_done(&self) -> bool {
        self.header.message_type == MessageType::DONE
    }

    /// Check if this message has the multi flag.
    pub fn is_multi(&self) -> bool {
        self.header.flags.contains(Flags::MULTI)
    }

    /// Check if this is a bare end-of-dump marker with nothing to report.
    ///
    /// The kernel sends `NLMSG_DONE` either empty or with a zero status word.
    pub fn is_done_sentinel(&self) -> bool {
        self.is_done() && self.data.len() <= ERROR_CODE_LEN && self.data.iter().all(|b| *b == 0)
    }

    /// Read the signed error code at the start of the payload.
    ///
    /// Zero means success (an ACK); the kernel reports failures as negative
    /// errno values.
    pub fn error_code(&self) -> Result<i32> {
        let bytes = self
            .data
            .first_chunk::<ERROR_CODE_LEN>()
            .ok_or(Error::ShortMessage {
                expected: ERROR_CODE_LEN,
                actual: self.data.len(),
            })?;
        Ok(i32::from_ne_bytes(*bytes))
    }

    /// Header of the request echoed back after the error code, if present.
    pub fn echoed_header(&self) -> Option<Header> {
        if !self.is_error() {
            return None;
        }
        let echo = self.data.get(ERROR_CODE_LEN..)?;
        Header::from_bytes(echo).ok()
    }
}

/// Encoded size of a message carrying `payload` bytes.
pub fn encoded_len(payload: usize) -> Result<usize> {
    if payload > MAX_PAYLOAD_LEN {
        return Err(Error::InvalidPayload {
            len: payload,
            max: MAX_PAYLOAD_LEN,
        });
    }
    Ok(nlmsg_align(nlmsg_length(payload)))
}

/// Header length for `payload` bytes, saturating at the largest aligned
/// length. Oversized payloads are still rejected by [`Message::encode`].
fn header_length(payload: usize) -> u32 {
    encoded_len(payload).map_or(MAX_PAYLOAD_LEN + NLMSG_HDRLEN, |len| len) as u32
}

/// Split a datagram into its messages.
pub fn split(data: &[u8]) -> Result<Vec<Message>> {
    MessageIter::new(data).collect()
}

/// Check that `replies` answer `request`.
///
/// Every reply must carry the request's sequence number. When both sides
/// name a port ID they must agree; kernel-originated messages use port 0.
pub fn validate(request: &Header, replies: &[Message]) -> Result<()> {
    for reply in replies {
        if reply.header.sequence != request.sequence {
            return Err(Error::SequenceMismatch {
                expected: request.sequence,
                actual: reply.header.sequence,
            });
        }
        if request.pid != 0 && reply.header.pid != 0 && reply.header.pid != request.pid {
            return Err(Error::PidMismatch {
                expected: request.pid,
                actual: reply.header.pid,
            });
        }
    }
    Ok(())
}

/// Iterator over netlink messages in a buffer.
///
/// Stops after the first error.
pub struct MessageIter<'a> {
    data: &'a [u8],
}

impl<'a> MessageIter<'a> {
    /// Create a new message iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl Iterator for MessageIter<'_> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        let msg = match Message::decode(self.data) {
            Ok(msg) => msg,
            Err(e) => {
                self.data = &[];
                return Some(Err(e));
            }
        };

        // Move to next message
        let aligned_len = nlmsg_align(msg.header.length as usize);
        if aligned_len >= self.data.len() {
            self.data = &[];
        } else {
            self.data = &self.data[aligned_len..];
        }

        Some(Ok(msg))
    }
}
