//! # Runtime configuration
//!
//! All literal terminators, prefixes and timeouts of the wire protocol are configuration, as
//! AT firmware versions differ in their dialect. Compile-time sizes are const generics of
//! [SerialManager](crate::manager::SerialManager).
//!
//! ````
//! use esp8266_serial_manager::config::Config;
//!
//! let config = Config::default()
//!     .with_frame_timeout_ms(2_000)
//!     .with_max_reconnect_attempts(5)
//!     .with_buffer_capacity(128);
//!
//! assert_eq!(2_000, config.frame_timeout_ms);
//! assert_eq!(b"\r\n", config.reply_terminator);
//! ````

/// Line terminator used by ESP-AT for both replies and notifications
pub const CRLF: &[u8] = b"\r\n";

/// Line prefixes of asynchronous messages sent by ESP-AT
pub const DEFAULT_NOTIFICATION_PREFIXES: &[&[u8]] = &[b"WIFI ", b"+LINK_LOST", b"ready"];

/// Configuration applied by [SerialManager::begin](crate::manager::SerialManager::begin)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Timeout in milliseconds of regular commands
    pub frame_timeout_ms: u32,

    /// Timeout in milliseconds of the join command. Associating with an access point takes considerably
    /// longer then any other command.
    pub join_timeout_ms: u32,

    /// Join attempts made automatically after the link got lost, before giving up
    pub max_reconnect_attempts: u8,

    /// Max. line length in bytes accepted by the framer. Gets clamped to the compile-time buffer size.
    pub buffer_capacity: usize,

    /// Interval in milliseconds for querying the join status while connected. 0 disables polling.
    pub status_poll_interval_ms: u32,

    /// Terminator of command lines and replies
    pub reply_terminator: &'static [u8],

    /// Terminator of asynchronous notifications
    pub notification_terminator: &'static [u8],

    /// Lines starting with one of these prefixes are treated as notifications
    pub notification_prefixes: &'static [&'static [u8]],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_timeout_ms: 1_000,
            join_timeout_ms: 20_000,
            max_reconnect_attempts: 3,
            buffer_capacity: usize::MAX,
            status_poll_interval_ms: 0,
            reply_terminator: CRLF,
            notification_terminator: CRLF,
            notification_prefixes: DEFAULT_NOTIFICATION_PREFIXES,
        }
    }
}

impl Config {
    pub fn with_frame_timeout_ms(mut self, timeout: u32) -> Self {
        self.frame_timeout_ms = timeout;
        self
    }

    pub fn with_join_timeout_ms(mut self, timeout: u32) -> Self {
        self.join_timeout_ms = timeout;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u8) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_status_poll_interval_ms(mut self, interval: u32) -> Self {
        self.status_poll_interval_ms = interval;
        self
    }

    pub fn with_reply_terminator(mut self, terminator: &'static [u8]) -> Self {
        self.reply_terminator = terminator;
        self
    }

    pub fn with_notification_terminator(mut self, terminator: &'static [u8]) -> Self {
        self.notification_terminator = terminator;
        self
    }

    pub fn with_notification_prefixes(mut self, prefixes: &'static [&'static [u8]]) -> Self {
        self.notification_prefixes = prefixes;
        self
    }
}
