//! Error types for netlink operations.

use std::io;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during netlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations, passed through unmodified.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel returned a nonzero code in an error message.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel (positive).
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Buffer too small to hold a header or error code.
    #[error("short message: need {expected} bytes, got {actual}")]
    ShortMessage {
        /// Minimum number of bytes required.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Declared message length is smaller than a header or runs past the buffer.
    #[error("invalid message length: header declares {declared} bytes, {available} available")]
    InvalidLength {
        /// Length from the message header.
        declared: usize,
        /// Bytes remaining in the buffer.
        available: usize,
    },

    /// Payload too large to be framed in a single message.
    #[error("invalid payload: {len} bytes exceeds maximum of {max}")]
    InvalidPayload {
        /// Payload length.
        len: usize,
        /// Largest payload that can be framed.
        max: usize,
    },

    /// Datagram came from a socket address that is not a netlink address.
    #[error("invalid socket address: not a netlink address")]
    InvalidSockaddr,

    /// Netlink address carried the wrong address family.
    #[error("invalid address family: expected {expected}, got {actual}")]
    InvalidFamily {
        /// `AF_NETLINK`.
        expected: u16,
        /// Family reported by the socket.
        actual: u16,
    },

    /// Sequence number mismatch.
    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch {
        /// Expected sequence number.
        expected: u32,
        /// Actual sequence number received.
        actual: u32,
    },

    /// Port ID mismatch.
    #[error("port ID mismatch: expected {expected}, got {actual}")]
    PidMismatch {
        /// Expected port ID.
        expected: u32,
        /// Actual port ID received.
        actual: u32,
    },

    /// Netlink is not available on this platform.
    #[error("netlink is not implemented on this platform")]
    Unimplemented,
}

impl Error {
    /// Create a kernel error from the code carried in an error message.
    ///
    /// The kernel reports failures as negative errno values; positive codes
    /// are accepted as-is.
    pub fn from_errno(code: i32) -> Self {
        let errno = if code < 0 { code.saturating_neg() } else { code };
        let message = io::Error::from_raw_os_error(errno).to_string();
        Self::Kernel { errno, message }
    }

    /// Get the errno value if this is a kernel or OS error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV).
    pub fn is_not_found(&self) -> bool {
        matches!(self.errno(), Some(libc::ENOENT | libc::ENODEV))
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.errno(), Some(libc::EPERM | libc::EACCES))
    }

    /// Check if the operation was interrupted (EINTR).
    pub fn is_interrupted(&self) -> bool {
        self.errno() == Some(libc::EINTR)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::Kernel { errno, .. } => io::Error::from_raw_os_error(errno),
            Error::Unimplemented => io::Error::new(io::ErrorKind::Unsupported, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errno() {
        let err = Error::from_errno(-libc::EPERM);
        assert!(err.is_permission_denied());
        assert_eq!(err.errno(), Some(libc::EPERM));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::from_errno(-libc::ENOENT).is_not_found());
        assert!(Error::from_errno(-libc::ENODEV).is_not_found());
        assert!(!Error::from_errno(-libc::EINTR).is_not_found());
        assert!(!Error::InvalidSockaddr.is_not_found());
    }

    #[test]
    fn test_is_interrupted() {
        assert!(Error::from_errno(-libc::EINTR).is_interrupted());
        assert!(Error::Io(io::Error::from_raw_os_error(libc::EINTR)).is_interrupted());
    }

    #[test]
    fn test_kernel_message() {
        let msg = Error::from_errno(-libc::ENOENT).to_string();
        assert!(msg.contains("No such file or directory"));
        assert!(msg.contains("errno 2"));
    }

    #[test]
    fn test_into_io_error() {
        let io_err: io::Error = Error::from_errno(-libc::ENOENT).into();
        assert_eq!(io_err.raw_os_error(), Some(libc::ENOENT));

        let io_err: io::Error = Error::Unimplemented.into();
        assert_eq!(io_err.kind(), io::ErrorKind::Unsupported);

        let io_err: io::Error = Error::InvalidSockaddr.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_error_messages() {
        let err = Error::InvalidFamily {
            expected: 16,
            actual: 17,
        };
        assert_eq!(err.to_string(), "invalid address family: expected 16, got 17");

        let err = Error::ShortMessage {
            expected: 16,
            actual: 3,
        };
        assert_eq!(err.to_string(), "short message: need 16 bytes, got 3");
    }
}
