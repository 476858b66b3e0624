//! # Command channel
//!
//! Writes command lines to ESP-AT and matches the following reply lines to the single command in
//! flight. A second command is rejected by [Error::Busy] until the first one got a final result
//! code or timed out.
//!
//! Time is passed in by the caller, so timeout handling is driven by the cooperative poll loop
//! instead of a hardware timer interrupt.
use crate::config::CRLF;
use crate::error::Error;
use crate::framer::{Frame, FrameKind};
use atat::AtatCmd;
use embedded_io::Write;
use fugit::{TimerDurationU32, TimerInstantU32};
use heapless::Vec;

/// Final outcome of a command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandResult {
    /// Command succeeded (`OK`, `SEND OK`)
    Ok,

    /// Command was rejected (`ERROR`)
    Error,

    /// Command was executed but failed (`FAIL`, `SEND FAIL`)
    Fail,

    /// No final result code was received in time
    Timeout,
}

impl CommandResult {
    pub fn is_ok(&self) -> bool {
        *self == CommandResult::Ok
    }
}

/// Component which issued a command, used for routing the [Response]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Origin {
    /// Join, status or disconnect command of the connection manager
    Wifi,

    /// Local address query
    Address,

    /// Raw or typed command of the application
    Application,
}

/// Maps a reply line to a final result, returns None for intermediate lines
pub type ReplyMatcher = fn(&[u8]) -> Option<CommandResult>;

/// Final result codes of ESP-AT
pub fn final_result_code(line: &[u8]) -> Option<CommandResult> {
    match line {
        b"OK" | b"SEND OK" => Some(CommandResult::Ok),
        b"ERROR" => Some(CommandResult::Error),
        b"FAIL" | b"SEND FAIL" => Some(CommandResult::Fail),
        _ => None,
    }
}

/// Command line without its arguments for logging, e.g. `AT+CWJAP` of `AT+CWJAP="ssid","passphrase"`
pub(crate) fn command_name(line: &[u8]) -> &[u8] {
    match line.iter().position(|byte| *byte == b'=') {
        Some(position) => &line[..position],
        None => line,
    }
}

/// The single command in flight
pub struct PendingCommand<const TIMER_HZ: u32, const N: usize> {
    /// Command line without terminator, used for skipping the echo
    command: Vec<u8, N>,

    /// Time the command was written
    issued_at: TimerInstantU32<TIMER_HZ>,

    /// Max. duration until a final result code is expected
    timeout: TimerDurationU32<TIMER_HZ>,

    /// Detects the final result code
    matcher: ReplyMatcher,

    /// Issuing component
    origin: Origin,

    /// Intermediate reply lines, separated by '\n'
    body: Vec<u8, N>,

    /// True if intermediate lines did not fit in the body
    truncated: bool,
}

impl<const TIMER_HZ: u32, const N: usize> PendingCommand<TIMER_HZ, N> {
    pub fn command(&self) -> &[u8] {
        self.command.as_slice()
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn issued_at(&self) -> TimerInstantU32<TIMER_HZ> {
        self.issued_at
    }

    pub fn timeout(&self) -> TimerDurationU32<TIMER_HZ> {
        self.timeout
    }

    /// True once `now >= issued_at + timeout`
    pub fn is_expired(&self, now: TimerInstantU32<TIMER_HZ>) -> bool {
        now.checked_duration_since(self.issued_at)
            .is_some_and(|elapsed| elapsed >= self.timeout)
    }

    /// Collects an intermediate reply line
    fn append(&mut self, line: &[u8]) {
        if self.truncated {
            return;
        }

        let separator = if self.body.is_empty() { 0 } else { 1 };
        if self.body.len() + separator + line.len() > self.body.capacity() {
            warn!("Reply body exceeds {} bytes, dropping further lines", N);
            self.truncated = true;
            return;
        }

        if separator > 0 {
            let _ = self.body.push(b'\n');
        }
        let _ = self.body.extend_from_slice(line);
    }

    fn resolve(self, result: CommandResult) -> Response<N> {
        Response {
            origin: self.origin,
            result,
            body: self.body,
            truncated: self.truncated,
        }
    }
}

/// Resolution of a command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response<const N: usize> {
    /// Component which issued the command
    pub origin: Origin,

    /// Final result
    pub result: CommandResult,

    /// Intermediate lines received before the final result code
    body: Vec<u8, N>,

    /// True if some intermediate lines got dropped due to the buffer size
    pub truncated: bool,
}

impl<const N: usize> Response<N> {
    /// Intermediate reply lines without terminators
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> {
        self.body.split(|byte| *byte == b'\n').filter(|line| !line.is_empty())
    }

    /// Raw body, lines separated by '\n'
    pub fn body(&self) -> &[u8] {
        self.body.as_slice()
    }
}

/// Serializes commands on the half-duplex link. Owns the writing half of the UART.
///
/// N: Max. length of a command line and of the collected reply body
pub struct CommandChannel<S: Write, const TIMER_HZ: u32, const N: usize> {
    /// UART collaborator
    serial: S,

    /// Command in flight
    pending: Option<PendingCommand<TIMER_HZ, N>>,

    /// Appended to command lines
    terminator: &'static [u8],

    /// Detects final result codes of new commands
    matcher: ReplyMatcher,
}

impl<S: Write, const TIMER_HZ: u32, const N: usize> CommandChannel<S, TIMER_HZ, N> {
    pub fn new(serial: S) -> Self {
        Self {
            serial,
            pending: None,
            terminator: CRLF,
            matcher: final_result_code,
        }
    }

    /// Sets the line terminator appended to commands
    pub fn set_terminator(&mut self, terminator: &'static [u8]) {
        self.terminator = terminator;
    }

    /// Sets the final result code detection for subsequent commands
    pub fn set_matcher(&mut self, matcher: ReplyMatcher) {
        self.matcher = matcher;
    }

    /// Writes the command line and marks it as pending. The terminator is appended if missing.
    pub fn send(
        &mut self,
        command: &[u8],
        timeout: TimerDurationU32<TIMER_HZ>,
        now: TimerInstantU32<TIMER_HZ>,
        origin: Origin,
    ) -> Result<(), Error> {
        if self.pending.is_some() {
            return Err(Error::Busy);
        }

        let line = command.strip_suffix(self.terminator).unwrap_or(command);
        let command = Vec::<u8, N>::from_slice(line).map_err(|_| Error::CommandTooLong)?;

        let mut encoded = command.clone();
        encoded
            .extend_from_slice(self.terminator)
            .map_err(|_| Error::CommandTooLong)?;

        self.serial.write_all(&encoded).map_err(Error::serial)?;
        self.serial.flush().map_err(Error::serial)?;
        debug!("Sent command {:?}", command_name(line));

        self.pending = Some(PendingCommand {
            command,
            issued_at: now,
            timeout,
            matcher: self.matcher,
            origin,
            body: Vec::new(),
            truncated: false,
        });

        Ok(())
    }

    /// Encodes and sends a typed AT command
    pub fn send_command<Cmd: AtatCmd>(
        &mut self,
        command: &Cmd,
        timeout: TimerDurationU32<TIMER_HZ>,
        now: TimerInstantU32<TIMER_HZ>,
        origin: Origin,
    ) -> Result<(), Error> {
        if self.pending.is_some() {
            return Err(Error::Busy);
        }

        if Cmd::MAX_LEN > N {
            return Err(Error::CommandTooLong);
        }

        let mut buffer = [0x0; N];
        let length = command.write(&mut buffer);
        self.send(&buffer[..length], timeout, now, origin)
    }

    /// Processes a received frame. Returns the response once the final result code was received.
    ///
    /// Notifications and malformed frames are ignored, as they are never part of a reply.
    pub fn on_frame(&mut self, frame: &Frame<N>) -> Result<Option<Response<N>>, Error> {
        if frame.kind() != FrameKind::Reply {
            return Ok(None);
        }

        let Some(pending) = self.pending.as_mut() else {
            warn!("Unsolicited reply {:?}", command_name(frame.payload()));
            return Err(Error::UnsolicitedReply);
        };

        // Echo of the command line
        if frame.is(&pending.command) {
            return Ok(None);
        }

        match (pending.matcher)(frame.payload()) {
            Some(result) => Ok(self.resolve(result)),
            None => {
                pending.append(frame.payload());
                Ok(None)
            }
        }
    }

    /// Resolves the pending command as [CommandResult::Timeout] once its timeout elapsed
    pub fn tick(&mut self, now: TimerInstantU32<TIMER_HZ>) -> Option<Response<N>> {
        if !self.pending.as_ref()?.is_expired(now) {
            return None;
        }

        warn!("Command timed out");
        self.resolve(CommandResult::Timeout)
    }

    /// True if a command is in flight
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&PendingCommand<TIMER_HZ, N>> {
        self.pending.as_ref()
    }

    pub(crate) fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    /// Returns the UART collaborator
    pub fn release(self) -> S {
        self.serial
    }

    fn resolve(&mut self, result: CommandResult) -> Option<Response<N>> {
        let pending = self.pending.take()?;
        debug!("Command {:?} resolved: {:?}", command_name(&pending.command), result);
        Some(pending.resolve(result))
    }
}
