//! Connection configuration.

/// Options applied when a connection binds its socket.
///
/// # Example
///
/// ```
/// use nlconn::netlink::Config;
///
/// // RTMGRP_IPV4_IFADDR | RTMGRP_IPV4_ROUTE
/// let config = Config::new().groups(0x10 | 0x40);
/// assert_eq!(config.groups, 0x50);
/// assert_eq!(config.pid, 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Bitmask of multicast groups to join at bind time.
    pub groups: u32,
    /// Local port ID; 0 lets the kernel assign one.
    pub pid: u32,
}

impl Config {
    /// Create a default configuration: no groups, kernel-assigned port ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the multicast group bitmask.
    pub fn groups(mut self, groups: u32) -> Self {
        self.groups = groups;
        self
    }

    /// Request a specific local port ID.
    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }
}
