//! # Serial manager
//!
//! Single entry point for the application, combining [ByteStreamFramer], [CommandChannel] and
//! [WifiConnectionManager]. All work happens inside [SerialManager::poll], which must be called
//! repeatedly by the main loop. Asynchronous messages of the module are returned as [Event]s.
//!
//! ## Example
//!
//! ````
//! # use esp8266_serial_manager::example::{ExampleSerial, ExampleTimer};
//! use esp8266_serial_manager::config::Config;
//! use esp8266_serial_manager::manager::{Event, SerialManager};
//! use esp8266_serial_manager::wifi::ConnectionState;
//!
//! let mut manager: SerialManager<_, _, 1_000_000, 256> =
//!     SerialManager::new(ExampleSerial::default(), ExampleTimer::default());
//! manager.begin(Config::default().with_max_reconnect_attempts(5));
//!
//! // Joining the access point
//! manager.connect("test_wifi", "secret").unwrap();
//! assert_eq!(ConnectionState::Connecting, manager.status());
//!
//! while manager.status() == ConnectionState::Connecting {
//!     manager.poll().unwrap();
//! }
//! assert_eq!(ConnectionState::Connected, manager.status());
//! assert!(manager.ip_assigned());
//!
//! // Querying the local address
//! manager.request_address().unwrap();
//!
//! let address = loop {
//!     if let Some(Event::Address(address)) = manager.poll().unwrap() {
//!         break address;
//!     }
//! };
//! assert_eq!("10.0.0.181", address.ipv4.unwrap().to_string());
//! assert_eq!("10:fe:ed:05:ba:50", address.mac.unwrap().as_str());
//! ````
use crate::channel::{CommandChannel, Origin, Response};
use crate::commands::{ObtainLocalAddressCommand, WifiModeCommand};
use crate::config::Config;
use crate::error::Error;
use crate::framer::{ByteStreamFramer, Frame, FrameKind};
use crate::notification::Notification;
use crate::responses::LocalAddress;
use crate::wifi::{ConnectionState, Credentials, WifiConnectionManager};
use atat::AtatCmd;
use embedded_io::{Read, ReadReady, Write};
use fugit::TimerDurationU32;
use fugit_timer::Timer;
use heapless::Deque;

/// Max. number of events buffered between two `poll()` calls
const EVENT_QUEUE_SIZE: usize = 8;

/// Max. number of events a single frame or timeout may cause
const EVENTS_PER_FRAME: usize = 3;

/// Outcome of [SerialManager::poll]
#[derive(Clone, Debug, PartialEq)]
pub enum Event<const N: usize> {
    /// Connection state changed
    StateChanged { from: ConnectionState, to: ConnectionState },

    /// Asynchronous message of the module
    Notification(Notification),

    /// Response to a command issued by [SerialManager::send_raw] or [SerialManager::send_command].
    /// Also returned if the address query of [SerialManager::request_address] failed.
    Response(Response<N>),

    /// Local address information requested by [SerialManager::request_address]
    Address(LocalAddress),

    /// Non-fatal protocol error, e.g. [Error::Malformed] or [Error::UnsolicitedReply].
    /// [Error::Timeout] precedes the response of a timed out command, [Error::ConnectionFailed] follows the
    /// change to [ConnectionState::Failed].
    Error(Error),
}

/// Facade for the application
///
/// TIMER_HZ: Tick rate of the timer used for timeout measurement
///
/// N: Buffer size in bytes. Limits the line length accepted by the framer, the command length and the
/// collected reply body of a single command.
pub struct SerialManager<S, T, const TIMER_HZ: u32, const N: usize>
where
    S: Read + ReadReady + Write,
    T: Timer<TIMER_HZ>,
{
    /// Reassembles received bytes to frames
    framer: ByteStreamFramer<N>,

    /// Command in flight, owns the UART
    channel: CommandChannel<S, TIMER_HZ, N>,

    /// Connection state machine
    wifi: WifiConnectionManager<TIMER_HZ>,

    /// Timer used for timeout measurement
    timer: T,

    /// Active configuration
    config: Config,

    /// Events not yet returned by poll()
    events: Deque<Event<N>, EVENT_QUEUE_SIZE>,
}

impl<S, T, const TIMER_HZ: u32, const N: usize> SerialManager<S, T, TIMER_HZ, N>
where
    S: Read + ReadReady + Write,
    T: Timer<TIMER_HZ>,
{
    /// Creates a new manager using the default configuration
    pub fn new(serial: S, timer: T) -> Self {
        let config = Config::default();

        let mut manager = Self {
            framer: ByteStreamFramer::new(),
            channel: CommandChannel::new(serial),
            wifi: WifiConnectionManager::new(&config),
            timer,
            config: config.clone(),
            events: Deque::new(),
        };

        manager.begin(config);
        manager
    }

    /// Applies the given configuration. Any partially received line is dropped.
    pub fn begin(&mut self, config: Config) {
        self.framer.configure(&config);
        self.channel.set_terminator(config.reply_terminator);
        self.wifi.configure(&config);
        self.config = config;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Processes received data and timeouts. Returns the next event, if any.
    ///
    /// Needs to be called repeatedly. UART errors are returned, but leave the manager in a consistent state,
    /// so the next call continues normally.
    pub fn poll(&mut self) -> Result<Option<Event<N>>, Error> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }

        let now = self.timer.now();

        // Timeouts are just evaluated if all received data was processed
        if self.drain()? && self.free_slots() >= 2 * EVENTS_PER_FRAME {
            if let Some(response) = self.channel.tick(now) {
                self.push_event(Event::Error(Error::Timeout));
                self.on_response(response);
            }

            let state = self.wifi.state();
            let result = self.wifi.service(&mut self.channel, now);
            self.on_state_change(state);
            result?;
        }

        Ok(self.events.pop_front())
    }

    /// Current connection state
    pub fn status(&self) -> ConnectionState {
        self.wifi.state()
    }

    /// True if an IP was assigned by the access point
    pub fn ip_assigned(&self) -> bool {
        self.wifi.ip_assigned()
    }

    /// True if a command is in flight
    pub fn is_busy(&self) -> bool {
        self.channel.is_busy()
    }

    /// Joins the given access point. Returns [Error::Busy] if a connection attempt is in progress or another
    /// command is in flight.
    pub fn connect(&mut self, ssid: &str, passphrase: &str) -> Result<(), Error> {
        let credentials = Credentials::new(ssid, passphrase)?;
        let now = self.timer.now();

        let state = self.wifi.state();
        let result = self.wifi.connect(credentials, &mut self.channel, now);
        self.on_state_change(state);
        result
    }

    /// Leaves the access point
    pub fn disconnect(&mut self) -> Result<(), Error> {
        let now = self.timer.now();
        self.wifi.disconnect(&mut self.channel, now)
    }

    /// Queries the join status immediately, independent of the configured poll interval
    pub fn poll_status(&mut self) -> Result<(), Error> {
        let now = self.timer.now();
        self.wifi.poll_status(&mut self.channel, now)
    }

    /// Sends a command not covered by the connection manager. The terminator is appended if missing.
    /// The result is returned as [Event::Response].
    pub fn send_raw(&mut self, command: &[u8], timeout: TimerDurationU32<TIMER_HZ>) -> Result<(), Error> {
        let now = self.timer.now();
        self.channel.send(command, timeout, now, Origin::Application)
    }

    /// Sends a typed AT command using its default timeout. The result is returned as [Event::Response].
    pub fn send_command<Cmd: AtatCmd>(&mut self, command: &Cmd) -> Result<(), Error> {
        let now = self.timer.now();
        let timeout = TimerDurationU32::millis(Cmd::MAX_TIMEOUT_MS);
        self.channel.send_command(command, timeout, now, Origin::Application)
    }

    /// Switches the module to station mode
    pub fn set_station_mode(&mut self) -> Result<(), Error> {
        self.send_command(&WifiModeCommand::station_mode())
    }

    /// Requests local address information, which is returned as [Event::Address]
    pub fn request_address(&mut self) -> Result<(), Error> {
        let now = self.timer.now();
        let timeout = TimerDurationU32::millis(self.config.frame_timeout_ms);
        self.channel.send_command(&ObtainLocalAddressCommand, timeout, now, Origin::Address)
    }

    /// Returns the UART and timer
    pub fn release(self) -> (S, T) {
        (self.channel.release(), self.timer)
    }

    /// Reads available bytes until the UART is empty or the event queue is close to full.
    /// Returns true if all available bytes were processed.
    fn drain(&mut self) -> Result<bool, Error> {
        while self.channel.serial_mut().read_ready().map_err(Error::serial)? {
            if self.free_slots() < EVENTS_PER_FRAME {
                return Ok(false);
            }

            let mut byte = [0x0; 1];
            if self.channel.serial_mut().read(&mut byte).map_err(Error::serial)? == 0 {
                break;
            }

            if let Some(frame) = self.framer.feed(byte[0]) {
                self.dispatch(frame);
            }
        }

        Ok(true)
    }

    /// Routes a frame to the channel or the connection manager
    fn dispatch(&mut self, frame: Frame<N>) {
        match frame.kind() {
            FrameKind::Malformed => self.push_event(Event::Error(Error::Malformed)),
            FrameKind::Notification => {
                let notification = Notification::from_payload(frame.payload());
                self.push_event(Event::Notification(notification));

                let state = self.wifi.state();
                self.wifi.on_notification(notification);
                self.on_state_change(state);
            }
            FrameKind::Reply => match self.channel.on_frame(&frame) {
                Ok(Some(response)) => self.on_response(response),
                Ok(None) => {}
                Err(error) => self.push_event(Event::Error(error)),
            },
        }
    }

    /// Routes a command response to its origin
    fn on_response(&mut self, response: Response<N>) {
        match response.origin {
            Origin::Wifi => {
                let state = self.wifi.state();
                self.wifi.on_response(&response);
                self.on_state_change(state);
            }
            Origin::Address if response.result.is_ok() => match LocalAddress::from_lines(response.lines()) {
                Ok(address) => self.push_event(Event::Address(address)),
                Err(error) => self.push_event(Event::Error(error)),
            },
            Origin::Address | Origin::Application => self.push_event(Event::Response(response)),
        }
    }

    /// Emits the state change events, if the state differs from the given previous one
    fn on_state_change(&mut self, previous: ConnectionState) {
        let current = self.wifi.state();
        if current == previous {
            return;
        }

        self.push_event(Event::StateChanged {
            from: previous,
            to: current,
        });

        if current == ConnectionState::Failed {
            self.push_event(Event::Error(Error::ConnectionFailed));
        }
    }

    fn free_slots(&self) -> usize {
        self.events.capacity() - self.events.len()
    }

    /// Queues an event. The oldest event is dropped if the queue is full.
    fn push_event(&mut self, event: Event<N>) {
        if self.events.is_full() {
            warn!("Event queue full, dropping oldest event");
            self.events.pop_front();
        }

        let _ = self.events.push_back(event);
    }
}
