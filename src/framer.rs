//! # Byte stream framer
//!
//! Reassembles the raw UART byte stream of ESP-AT into line based [Frame]s. Bytes may be fed one
//! at a time or in arbitrary chunks, the resulting frames are the same.
//!
//! ## Example
//!
//! ````
//! use esp8266_serial_manager::framer::{ByteStreamFramer, FrameKind};
//!
//! let mut framer: ByteStreamFramer<64> = ByteStreamFramer::new();
//! let mut frames = framer.feed_all(b"OK\r\n+LINK_LOST\r\n");
//!
//! let reply = frames.next().unwrap();
//! assert_eq!(FrameKind::Reply, reply.kind());
//! assert_eq!(b"OK", reply.payload());
//!
//! let notification = frames.next().unwrap();
//! assert_eq!(FrameKind::Notification, notification.kind());
//! assert_eq!(b"+LINK_LOST", notification.payload());
//! ````
use crate::config::{Config, CRLF, DEFAULT_NOTIFICATION_PREFIXES};
use heapless::Vec;

/// Classification of a received line
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameKind {
    /// Synchronous line belonging to the reply of a command
    Reply,

    /// Asynchronous message of the module, e.g. `WIFI DISCONNECT`
    Notification,

    /// Line was unparsable or exceeded the buffer capacity
    Malformed,
}

/// Delimiter which closed a frame
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Terminator {
    /// Reply terminator, by default CRLF
    Reply,

    /// Notification terminator following a known notification prefix
    Notification,

    /// Buffer capacity was exhausted before any terminator was received
    Overflow,
}

/// A single delimiter-bounded unit of serial data. The terminator is not part of the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame<const N: usize> {
    kind: FrameKind,
    payload: Vec<u8, N>,
    terminator: Terminator,
}

impl<const N: usize> Frame<N> {
    pub(crate) fn new(kind: FrameKind, payload: Vec<u8, N>, terminator: Terminator) -> Self {
        Self {
            kind,
            payload,
            terminator,
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }

    pub fn terminator(&self) -> Terminator {
        self.terminator
    }

    /// Returns true if the payload is exactly the given line
    pub fn is(&self, line: &[u8]) -> bool {
        self.payload.as_slice() == line
    }
}

/// Line framer with a fixed buffer of N bytes
///
/// Overlong lines are reported once as [FrameKind::Malformed] with an empty payload. The remaining bytes of
/// such a line are dropped until the next terminator arrives.
pub struct ByteStreamFramer<const N: usize> {
    /// Bytes of the current line including a partially received terminator
    buffer: Vec<u8, N>,

    /// Runtime limit of buffered bytes, <= N
    capacity: usize,

    /// Terminator of replies
    reply_terminator: &'static [u8],

    /// Terminator of notifications
    notification_terminator: &'static [u8],

    /// Known line prefixes of notifications
    notification_prefixes: &'static [&'static [u8]],

    /// True while skipping the tail of an overlong line
    discarding: bool,
}

impl<const N: usize> Default for ByteStreamFramer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ByteStreamFramer<N> {
    /// Creates a new framer using CRLF terminators and the default notification prefixes
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            capacity: N,
            reply_terminator: CRLF,
            notification_terminator: CRLF,
            notification_prefixes: DEFAULT_NOTIFICATION_PREFIXES,
            discarding: false,
        }
    }

    /// Applies terminators, prefixes and buffer capacity of the given configuration and drops any partial line
    pub fn configure(&mut self, config: &Config) {
        self.reply_terminator = config.reply_terminator;
        self.notification_terminator = config.notification_terminator;
        self.notification_prefixes = config.notification_prefixes;
        self.set_capacity(config.buffer_capacity);
        self.reset();
    }

    /// Limits the accepted line length (terminator included). Gets clamped to 1..=N.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.clamp(1, N.max(1));
    }

    /// Returns the effective capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count of bytes of the current, incomplete line
    pub fn buffered(&self) -> usize {
        if self.discarding {
            return 0;
        }

        self.buffer.len()
    }

    /// Drops any partial line
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Consumes a single byte. Returns a frame if the byte completed one.
    pub fn feed(&mut self, byte: u8) -> Option<Frame<N>> {
        if self.discarding {
            self.discard(byte);
            return None;
        }

        if self.buffer.len() >= self.capacity || self.buffer.push(byte).is_err() {
            return Some(self.overflow());
        }

        if let Some(frame) = self.try_complete() {
            return frame;
        }

        if self.buffer.len() >= self.capacity {
            return Some(self.overflow());
        }

        None
    }

    /// Lazily feeds the given bytes, yielding every completed frame
    pub fn feed_all<'a>(&'a mut self, bytes: &'a [u8]) -> Frames<'a, N> {
        Frames {
            framer: self,
            bytes: bytes.iter(),
        }
    }

    /// Checks if the buffer ends with a terminator. CRs preceding the terminator are not part of the payload.
    /// Returns None if the line is incomplete, Some(None) for empty lines, which are just separators.
    fn try_complete(&mut self) -> Option<Option<Frame<N>>> {
        let (terminator, length) = self.match_terminator()?;

        let mut payload = core::mem::take(&mut self.buffer);
        payload.truncate(payload.len() - length);

        // Command echo of ESP-AT ends with an extra CR
        while payload.last() == Some(&b'\r') {
            payload.pop();
        }

        if payload.is_empty() {
            return Some(None);
        }

        let kind = match terminator {
            _ if !is_printable(&payload) => FrameKind::Malformed,
            Terminator::Notification => FrameKind::Notification,
            _ => FrameKind::Reply,
        };

        if kind == FrameKind::Malformed {
            warn!("Received malformed line of {} bytes", payload.len());
        } else {
            trace!("Received {:?} frame of {} bytes", kind, payload.len());
        }

        Some(Some(Frame::new(kind, payload, terminator)))
    }

    /// Detects a terminator at the end of the buffer. Notifications take precedence, as both terminators may
    /// be equal.
    fn match_terminator(&self) -> Option<(Terminator, usize)> {
        if ends_with(&self.buffer, self.notification_terminator) && self.has_notification_prefix() {
            return Some((Terminator::Notification, self.notification_terminator.len()));
        }

        if ends_with(&self.buffer, self.reply_terminator) {
            return Some((Terminator::Reply, self.reply_terminator.len()));
        }

        None
    }

    fn has_notification_prefix(&self) -> bool {
        self.notification_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && self.buffer.starts_with(prefix))
    }

    /// Drops the current line and switches to discarding mode
    fn overflow(&mut self) -> Frame<N> {
        warn!("Line exceeds buffer capacity of {} bytes, discarding", self.capacity);

        // A terminator may be split at the capacity boundary
        self.retain_tail();
        self.discarding = true;

        Frame::new(FrameKind::Malformed, Vec::new(), Terminator::Overflow)
    }

    /// Skips bytes until the next terminator of any kind
    fn discard(&mut self, byte: u8) {
        if self.buffer.push(byte).is_err() {
            self.buffer.clear();
            return;
        }

        if ends_with(&self.buffer, self.reply_terminator) || ends_with(&self.buffer, self.notification_terminator) {
            self.buffer.clear();
            self.discarding = false;
            return;
        }

        self.retain_tail();
    }

    /// Keeps just the bytes which could be the start of a terminator
    fn retain_tail(&mut self) {
        let keep = self.reply_terminator.len().max(self.notification_terminator.len()).saturating_sub(1);
        let length = self.buffer.len();

        if length > keep {
            self.buffer.copy_within(length - keep.., 0);
            self.buffer.truncate(keep);
        }
    }
}

/// Iterator over the frames of a byte slice, s. [ByteStreamFramer::feed_all]
pub struct Frames<'a, const N: usize> {
    framer: &'a mut ByteStreamFramer<N>,
    bytes: core::slice::Iter<'a, u8>,
}

impl<const N: usize> Iterator for Frames<'_, N> {
    type Item = Frame<N>;

    fn next(&mut self) -> Option<Self::Item> {
        for byte in self.bytes.by_ref() {
            if let Some(frame) = self.framer.feed(*byte) {
                return Some(frame);
            }
        }

        None
    }
}

fn ends_with(buffer: &[u8], terminator: &[u8]) -> bool {
    !terminator.is_empty() && buffer.ends_with(terminator)
}

/// True if the line is valid UTF-8 without control characters (besides tabs)
fn is_printable(line: &[u8]) -> bool {
    core::str::from_utf8(line).is_ok() && !line.iter().any(|byte| (*byte < 0x20 && *byte != b'\t') || *byte == 0x7F)
}
