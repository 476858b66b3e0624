//! # WIFI connection manager
//!
//! Drives the association lifecycle of the ESP-AT station:
//!
//! ````text
//! Idle ──connect()──> Connecting ──OK──> Connected ──link lost──> Reconnecting ──OK──> Connected
//!                          │                                          │
//!                          └──ERROR/FAIL/timeout──> Failed <──budget exhausted
//! ````
//!
//! All commands are issued through the [CommandChannel], the manager never touches the UART.
//! State changes happen only when replies, notifications or timeouts are delivered.
use crate::channel::{CommandChannel, CommandResult, Origin, Response};
use crate::commands::{AccessPointConnectCommand, DisconnectCommand, JoinStatusCommand};
use crate::config::Config;
use crate::error::Error;
use crate::notification::Notification;
use crate::responses::is_joined;
use core::str::FromStr;
use embedded_io::Write;
use fugit::{TimerDurationU32, TimerInstantU32};
use heapless::String;

/// Current WIFI connection state
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// Not joined and no attempt in progress
    Idle,

    /// Join command issued on behalf of the application
    Connecting,

    /// Joined to the access point
    Connected,

    /// Link got lost, joining again using the stored credentials
    Reconnecting,

    /// Join failed or reconnect budget exhausted. Terminal until the next `connect()` call.
    Failed,
}

/// WIFI credentials of the target access point
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// The SSID of the target access point
    ssid: String<32>,

    /// The password/key of the target access point
    passphrase: String<63>,
}

impl Credentials {
    pub fn new(ssid: &str, passphrase: &str) -> Result<Self, Error> {
        Ok(Self {
            ssid: String::from_str(ssid).map_err(|_| Error::InvalidSsidLength)?,
            passphrase: String::from_str(passphrase).map_err(|_| Error::InvalidPassphraseLength)?,
        })
    }

    pub fn ssid(&self) -> &str {
        self.ssid.as_str()
    }
}

/// Command of the manager currently in flight
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Step {
    Join,
    Status,
    Disconnect,
}

/// Connection state machine
pub struct WifiConnectionManager<const TIMER_HZ: u32> {
    /// Current state
    state: ConnectionState,

    /// Credentials of the current connection attempt
    credentials: Option<Credentials>,

    /// Command issued by the manager which awaits its response
    step: Option<Step>,

    /// Join attempts made since the link got lost
    attempts: u8,

    /// Max. join attempts while reconnecting
    max_reconnect_attempts: u8,

    /// Timeout of the join command
    join_timeout: TimerDurationU32<TIMER_HZ>,

    /// Timeout of status and disconnect commands
    command_timeout: TimerDurationU32<TIMER_HZ>,

    /// Interval of automatic status queries while connected
    status_poll_interval: Option<TimerDurationU32<TIMER_HZ>>,

    /// Time of the last status query. None => interval starts at the next service() call
    last_status_poll: Option<TimerInstantU32<TIMER_HZ>>,

    /// True if an IP was assigned by access point. Gets updated by notifications.
    ip_assigned: bool,

    /// Link loss was signaled while the disconnect command was outstanding
    link_lost_while_disconnecting: bool,
}

impl<const TIMER_HZ: u32> Default for WifiConnectionManager<TIMER_HZ> {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl<const TIMER_HZ: u32> WifiConnectionManager<TIMER_HZ> {
    pub fn new(config: &Config) -> Self {
        let mut manager = Self {
            state: ConnectionState::Idle,
            credentials: None,
            step: None,
            attempts: 0,
            max_reconnect_attempts: 0,
            join_timeout: TimerDurationU32::millis(0),
            command_timeout: TimerDurationU32::millis(0),
            status_poll_interval: None,
            last_status_poll: None,
            ip_assigned: false,
            link_lost_while_disconnecting: false,
        };

        manager.configure(config);
        manager
    }

    /// Applies timeouts, retry budget and status poll interval
    pub fn configure(&mut self, config: &Config) {
        self.max_reconnect_attempts = config.max_reconnect_attempts;
        self.join_timeout = TimerDurationU32::millis(config.join_timeout_ms);
        self.command_timeout = TimerDurationU32::millis(config.frame_timeout_ms);
        self.status_poll_interval = match config.status_poll_interval_ms {
            0 => None,
            interval => Some(TimerDurationU32::millis(interval)),
        };
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn ip_assigned(&self) -> bool {
        self.ip_assigned
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Join attempts made during the current reconnect phase
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// True while a connection attempt is in progress
    pub fn is_connecting(&self) -> bool {
        matches!(self.state, ConnectionState::Connecting | ConnectionState::Reconnecting)
    }

    /// Issues the join command and switches to [ConnectionState::Connecting]
    ///
    /// Returns [Error::Busy] if an attempt is already in progress or another command is in flight.
    pub fn connect<S: Write, const N: usize>(
        &mut self,
        credentials: Credentials,
        channel: &mut CommandChannel<S, TIMER_HZ, N>,
        now: TimerInstantU32<TIMER_HZ>,
    ) -> Result<(), Error> {
        if self.is_connecting() || self.step.is_some() {
            return Err(Error::Busy);
        }

        self.join(&credentials, channel, now)?;
        self.credentials = Some(credentials);
        self.attempts = 0;
        self.transition(ConnectionState::Connecting);
        Ok(())
    }

    /// Queries the join status, for detecting silent disconnects which are not signaled by any notification
    pub fn poll_status<S: Write, const N: usize>(
        &mut self,
        channel: &mut CommandChannel<S, TIMER_HZ, N>,
        now: TimerInstantU32<TIMER_HZ>,
    ) -> Result<(), Error> {
        if self.step.is_some() {
            return Err(Error::Busy);
        }

        channel.send_command(&JoinStatusCommand, self.command_timeout, now, Origin::Wifi)?;
        self.step = Some(Step::Status);
        self.last_status_poll = Some(now);
        Ok(())
    }

    /// Leaves the access point. The state changes to [ConnectionState::Idle] once confirmed.
    pub fn disconnect<S: Write, const N: usize>(
        &mut self,
        channel: &mut CommandChannel<S, TIMER_HZ, N>,
        now: TimerInstantU32<TIMER_HZ>,
    ) -> Result<(), Error> {
        if self.state == ConnectionState::Connecting || self.step.is_some() {
            return Err(Error::Busy);
        }

        channel.send_command(&DisconnectCommand, self.command_timeout, now, Origin::Wifi)?;
        self.step = Some(Step::Disconnect);
        self.link_lost_while_disconnecting = false;
        Ok(())
    }

    /// Issues pending reconnect attempts and periodic status queries, if the channel is idle
    pub fn service<S: Write, const N: usize>(
        &mut self,
        channel: &mut CommandChannel<S, TIMER_HZ, N>,
        now: TimerInstantU32<TIMER_HZ>,
    ) -> Result<(), Error> {
        if self.step.is_some() || channel.is_busy() {
            return Ok(());
        }

        match self.state {
            ConnectionState::Reconnecting if self.attempts < self.max_reconnect_attempts => self.rejoin(channel, now),
            ConnectionState::Connected => self.service_status_poll(channel, now),
            _ => Ok(()),
        }
    }

    /// Handles the response of a command issued by the manager
    pub fn on_response<const N: usize>(&mut self, response: &Response<N>) {
        let Some(step) = self.step.take() else {
            return;
        };

        match step {
            Step::Join => self.on_join_result(response.result),
            Step::Status => self.on_status(response),
            Step::Disconnect => self.on_disconnect_result(response.result),
        }
    }

    /// Handles an asynchronous notification
    pub fn on_notification(&mut self, notification: Notification) {
        if notification == Notification::GotIp {
            self.ip_assigned = true;
            return;
        }

        if !notification.is_link_loss() {
            return;
        }

        self.ip_assigned = false;

        // Applied once the disconnect result is known
        if self.step == Some(Step::Disconnect) {
            self.link_lost_while_disconnecting = true;
            return;
        }

        if self.state == ConnectionState::Connected {
            self.link_lost();
        }
    }

    fn on_disconnect_result(&mut self, result: CommandResult) {
        let link_lost = core::mem::take(&mut self.link_lost_while_disconnecting);

        if result.is_ok() {
            self.credentials = None;
            self.ip_assigned = false;
            self.transition(ConnectionState::Idle);
            return;
        }

        warn!("Disconnect failed: {:?}", result);
        if link_lost && self.state == ConnectionState::Connected {
            self.link_lost();
        }
    }

    fn on_join_result(&mut self, result: CommandResult) {
        match (self.state, result) {
            (ConnectionState::Connecting | ConnectionState::Reconnecting, CommandResult::Ok) => {
                self.attempts = 0;
                self.last_status_poll = None;
                self.transition(ConnectionState::Connected);
            }
            (ConnectionState::Connecting, _) => {
                warn!("Joining access point failed: {:?}", result);
                self.transition(ConnectionState::Failed);
            }
            (ConnectionState::Reconnecting, _) => {
                warn!("Reconnect attempt {} failed: {:?}", self.attempts, result);

                if self.attempts >= self.max_reconnect_attempts {
                    self.transition(ConnectionState::Failed);
                }
            }
            _ => {}
        }
    }

    fn on_status<const N: usize>(&mut self, response: &Response<N>) {
        if self.state != ConnectionState::Connected {
            return;
        }

        match response.result {
            CommandResult::Ok if !is_joined(response.lines()) => {
                warn!("Status query reports no access point");
                self.link_lost();
            }
            CommandResult::Timeout => self.link_lost(),
            CommandResult::Ok => {}
            _ => warn!("Status query failed: {:?}", response.result),
        }
    }

    fn link_lost(&mut self) {
        self.ip_assigned = false;
        self.attempts = 0;

        if self.max_reconnect_attempts == 0 {
            self.transition(ConnectionState::Failed);
            return;
        }

        self.transition(ConnectionState::Reconnecting);
    }

    /// Next automatic join attempt using the stored credentials
    fn rejoin<S: Write, const N: usize>(
        &mut self,
        channel: &mut CommandChannel<S, TIMER_HZ, N>,
        now: TimerInstantU32<TIMER_HZ>,
    ) -> Result<(), Error> {
        let Some(credentials) = self.credentials.clone() else {
            self.transition(ConnectionState::Failed);
            return Ok(());
        };

        self.join(&credentials, channel, now)?;
        self.attempts += 1;
        debug!("Reconnect attempt {}/{}", self.attempts, self.max_reconnect_attempts);
        Ok(())
    }

    fn service_status_poll<S: Write, const N: usize>(
        &mut self,
        channel: &mut CommandChannel<S, TIMER_HZ, N>,
        now: TimerInstantU32<TIMER_HZ>,
    ) -> Result<(), Error> {
        let Some(interval) = self.status_poll_interval else {
            return Ok(());
        };

        let Some(last_poll) = self.last_status_poll else {
            self.last_status_poll = Some(now);
            return Ok(());
        };

        if now.checked_duration_since(last_poll).is_some_and(|elapsed| elapsed >= interval) {
            return self.poll_status(channel, now);
        }

        Ok(())
    }

    /// Sends the command for joining the access point
    fn join<S: Write, const N: usize>(
        &mut self,
        credentials: &Credentials,
        channel: &mut CommandChannel<S, TIMER_HZ, N>,
        now: TimerInstantU32<TIMER_HZ>,
    ) -> Result<(), Error> {
        let command = AccessPointConnectCommand::new(credentials.ssid.as_str(), credentials.passphrase.as_str())?;
        channel.send_command(&command, self.join_timeout, now, Origin::Wifi)?;
        self.step = Some(Step::Join);
        Ok(())
    }

    fn transition(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Connection state {:?} -> {:?}", self.state, state);
        }

        self.state = state;
    }
}
