use crate::channel::{CommandChannel, Origin, Response};
use crate::config::Config;
use crate::error::Error;
use crate::framer::{Frame, FrameKind, Terminator};
use crate::notification::Notification;
use crate::tests::mock::{MockSerial, MockTimer};
use crate::wifi::{ConnectionState, Credentials, WifiConnectionManager};
use alloc::string::{String, ToString};
use alloc::vec;
use fugit::TimerDurationU32;

type ChannelType = CommandChannel<MockSerial, 1_000_000, 256>;
type WifiType = WifiConnectionManager<1_000_000>;

struct Fixture {
    serial: MockSerial,
    channel: ChannelType,
    wifi: WifiType,
}

impl Fixture {
    fn new(config: Config) -> Self {
        let serial = MockSerial::new();

        Self {
            channel: ChannelType::new(serial.clone()),
            wifi: WifiType::new(&config),
            serial,
        }
    }

    fn connect(&mut self, ssid: &str, passphrase: &str, now_ms: u32) -> Result<(), Error> {
        let credentials = Credentials::new(ssid, passphrase)?;
        self.wifi.connect(credentials, &mut self.channel, MockTimer::instant_ms(now_ms))
    }

    /// Connects and confirms the join command
    fn connected(config: Config) -> Self {
        let mut fixture = Self::new(config);
        fixture.connect("net", "pass", 0).unwrap();
        fixture.reply(&[b"OK"]);
        assert_eq!(ConnectionState::Connected, fixture.wifi.state());
        fixture
    }

    /// Delivers reply lines to the channel and forwards the response to the manager
    fn reply(&mut self, lines: &[&[u8]]) -> Option<Response<256>> {
        for line in lines {
            let frame = Frame::new(FrameKind::Reply, heapless::Vec::from_slice(line).unwrap(), Terminator::Reply);

            if let Some(response) = self.channel.on_frame(&frame).unwrap() {
                assert_eq!(Origin::Wifi, response.origin);
                self.wifi.on_response(&response);
                return Some(response);
            }
        }

        None
    }

    /// Resolves the pending command by timeout
    fn tick(&mut self, now_ms: u32) -> bool {
        match self.channel.tick(MockTimer::instant_ms(now_ms)) {
            Some(response) => {
                self.wifi.on_response(&response);
                true
            }
            None => false,
        }
    }

    fn service(&mut self, now_ms: u32) {
        self.wifi.service(&mut self.channel, MockTimer::instant_ms(now_ms)).unwrap();
    }

    fn writes(&self) -> vec::Vec<String> {
        self.serial.get_writes_as_strings()
    }
}

#[test]
fn test_connect_joined() {
    let mut fixture = Fixture::new(Config::default());

    fixture.connect("net", "pass", 0).unwrap();
    assert_eq!(ConnectionState::Connecting, fixture.wifi.state());
    assert!(fixture.wifi.is_connecting());
    assert_eq!(vec!["AT+CWJAP=\"net\",\"pass\"\r\n".to_string()], fixture.writes());

    fixture.reply(&[b"AT+CWJAP=\"net\",\"pass\"", b"WIFI CONNECTED", b"OK"]).unwrap();
    assert_eq!(ConnectionState::Connected, fixture.wifi.state());
    assert_eq!("net", fixture.wifi.credentials().unwrap().ssid());
    assert!(!fixture.channel.is_busy());
}

#[test]
fn test_connect_error() {
    let mut fixture = Fixture::new(Config::default());
    fixture.connect("net", "wrong", 0).unwrap();

    fixture.reply(&[b"+CWJAP:2", b"FAIL"]).unwrap();
    assert_eq!(ConnectionState::Failed, fixture.wifi.state());

    // No automatic retry
    fixture.service(100);
    assert_eq!(1, fixture.serial.write_count());

    // Explicit connect leaves Failed
    fixture.connect("net", "pass", 200).unwrap();
    assert_eq!(ConnectionState::Connecting, fixture.wifi.state());
    fixture.reply(&[b"OK"]).unwrap();
    assert_eq!(ConnectionState::Connected, fixture.wifi.state());
}

#[test]
fn test_connect_timeout() {
    let mut fixture = Fixture::new(Config::default().with_join_timeout_ms(10_000));
    fixture.connect("net", "pass", 0).unwrap();

    assert!(!fixture.tick(9_999));
    assert_eq!(ConnectionState::Connecting, fixture.wifi.state());

    assert!(fixture.tick(10_000));
    assert_eq!(ConnectionState::Failed, fixture.wifi.state());
}

#[test]
fn test_connect_busy_while_connecting() {
    let mut fixture = Fixture::new(Config::default());
    fixture.connect("net", "pass", 0).unwrap();

    assert_eq!(Error::Busy, fixture.connect("other", "pass", 10).unwrap_err());
    assert_eq!(1, fixture.serial.write_count());
    assert_eq!("net", fixture.wifi.credentials().unwrap().ssid());
}

#[test]
fn test_connect_busy_channel() {
    let mut fixture = Fixture::new(Config::default());
    fixture
        .channel
        .send(b"AT+GMR", MockTimer::duration_ms(100), MockTimer::instant_ms(0), Origin::Application)
        .unwrap();

    assert_eq!(Error::Busy, fixture.connect("net", "pass", 0).unwrap_err());
    assert_eq!(ConnectionState::Idle, fixture.wifi.state());
    assert!(fixture.wifi.credentials().is_none());
}

#[test]
fn test_credentials_length_limits() {
    let ssid = "S".repeat(32);
    let passphrase = "P".repeat(63);
    assert!(Credentials::new(&ssid, &passphrase).is_ok());

    let ssid = "S".repeat(33);
    assert_eq!(Error::InvalidSsidLength, Credentials::new(&ssid, "pass").unwrap_err());

    let passphrase = "P".repeat(64);
    assert_eq!(Error::InvalidPassphraseLength, Credentials::new("net", &passphrase).unwrap_err());
}

#[test]
fn test_link_lost_reconnects_with_stored_credentials() {
    let mut fixture = Fixture::connected(Config::default());

    fixture.wifi.on_notification(Notification::LinkLost);
    assert_eq!(ConnectionState::Reconnecting, fixture.wifi.state());
    assert_eq!(0, fixture.wifi.attempts());

    fixture.service(100);
    assert_eq!(1, fixture.wifi.attempts());
    assert_eq!(
        vec![
            "AT+CWJAP=\"net\",\"pass\"\r\n".to_string(),
            "AT+CWJAP=\"net\",\"pass\"\r\n".to_string()
        ],
        fixture.writes()
    );

    // Further service calls wait for the outstanding join
    fixture.service(200);
    assert_eq!(2, fixture.serial.write_count());

    fixture.reply(&[b"OK"]).unwrap();
    assert_eq!(ConnectionState::Connected, fixture.wifi.state());
    assert_eq!(0, fixture.wifi.attempts());
}

#[test]
fn test_reconnect_budget_exhausted() {
    let mut fixture = Fixture::connected(Config::default().with_max_reconnect_attempts(3));
    fixture.wifi.on_notification(Notification::WifiDisconnected);

    let mut now = 1_000;
    for attempt in 1..=3 {
        assert_eq!(ConnectionState::Reconnecting, fixture.wifi.state());

        fixture.service(now);
        assert_eq!(attempt, fixture.wifi.attempts());

        now += 20_000;
        assert!(fixture.tick(now));
    }

    assert_eq!(ConnectionState::Failed, fixture.wifi.state());

    // No fourth attempt
    fixture.service(now + 1_000);
    assert_eq!(4, fixture.serial.write_count());
    assert!(!fixture.channel.is_busy());
}

#[test]
fn test_reconnect_failure_retried() {
    let mut fixture = Fixture::connected(Config::default().with_max_reconnect_attempts(2));
    fixture.wifi.on_notification(Notification::LinkLost);

    fixture.service(100);
    fixture.reply(&[b"ERROR"]).unwrap();
    assert_eq!(ConnectionState::Reconnecting, fixture.wifi.state());

    fixture.service(200);
    fixture.reply(&[b"OK"]).unwrap();
    assert_eq!(ConnectionState::Connected, fixture.wifi.state());
    assert_eq!(3, fixture.serial.write_count());
}

#[test]
fn test_no_reconnect_budget() {
    let mut fixture = Fixture::connected(Config::default().with_max_reconnect_attempts(0));

    fixture.wifi.on_notification(Notification::LinkLost);
    assert_eq!(ConnectionState::Failed, fixture.wifi.state());

    fixture.service(100);
    assert_eq!(1, fixture.serial.write_count());
}

#[test]
fn test_link_loss_ignored_unless_connected() {
    let mut fixture = Fixture::new(Config::default());

    fixture.wifi.on_notification(Notification::LinkLost);
    assert_eq!(ConnectionState::Idle, fixture.wifi.state());

    fixture.connect("net", "pass", 0).unwrap();
    fixture.wifi.on_notification(Notification::WifiDisconnected);
    assert_eq!(ConnectionState::Connecting, fixture.wifi.state());
}

#[test]
fn test_ready_while_connected_is_link_loss() {
    let mut fixture = Fixture::connected(Config::default());

    fixture.wifi.on_notification(Notification::Ready);
    assert_eq!(ConnectionState::Reconnecting, fixture.wifi.state());
}

#[test]
fn test_status_poll_no_access_point() {
    let mut fixture = Fixture::connected(Config::default());

    fixture.wifi.poll_status(&mut fixture.channel, MockTimer::instant_ms(100)).unwrap();
    assert_eq!("AT+CWJAP?\r\n", fixture.writes()[1]);

    fixture.reply(&[b"AT+CWJAP?", b"No AP", b"OK"]).unwrap();
    assert_eq!(ConnectionState::Reconnecting, fixture.wifi.state());
}

#[test]
fn test_status_poll_joined() {
    let mut fixture = Fixture::connected(Config::default());

    fixture.wifi.poll_status(&mut fixture.channel, MockTimer::instant_ms(100)).unwrap();
    fixture.reply(&[b"+CWJAP:\"net\",\"10:fe:ed:05:ba:01\",6,-52", b"OK"]).unwrap();

    assert_eq!(ConnectionState::Connected, fixture.wifi.state());
}

#[test]
fn test_status_poll_error_keeps_state() {
    let mut fixture = Fixture::connected(Config::default());

    fixture.wifi.poll_status(&mut fixture.channel, MockTimer::instant_ms(100)).unwrap();
    fixture.reply(&[b"ERROR"]).unwrap();

    assert_eq!(ConnectionState::Connected, fixture.wifi.state());
}

#[test]
fn test_status_poll_timeout() {
    let mut fixture = Fixture::connected(Config::default().with_frame_timeout_ms(500));

    fixture.wifi.poll_status(&mut fixture.channel, MockTimer::instant_ms(100)).unwrap();
    assert!(!fixture.tick(599));
    assert!(fixture.tick(600));

    assert_eq!(ConnectionState::Reconnecting, fixture.wifi.state());
}

#[test]
fn test_status_poll_interval() {
    let mut fixture = Fixture::connected(Config::default().with_status_poll_interval_ms(5_000));

    // First call starts the interval
    fixture.service(100);
    fixture.service(5_099);
    assert_eq!(1, fixture.serial.write_count());

    fixture.service(5_100);
    assert_eq!("AT+CWJAP?\r\n", fixture.writes()[1]);

    fixture.reply(&[b"+CWJAP:\"net\"", b"OK"]).unwrap();
    fixture.service(10_099);
    assert_eq!(2, fixture.serial.write_count());

    fixture.service(10_100);
    assert_eq!(3, fixture.serial.write_count());
}

#[test]
fn test_status_poll_disabled_by_default() {
    let mut fixture = Fixture::connected(Config::default());

    fixture.service(100);
    fixture.service(1_000_000);
    assert_eq!(1, fixture.serial.write_count());
}

#[test]
fn test_disconnect() {
    let mut fixture = Fixture::connected(Config::default());
    fixture.wifi.on_notification(Notification::GotIp);

    fixture.wifi.disconnect(&mut fixture.channel, MockTimer::instant_ms(100)).unwrap();
    assert_eq!("AT+CWQAP\r\n", fixture.writes()[1]);

    // Notification of the requested disconnect
    fixture.wifi.on_notification(Notification::WifiDisconnected);
    assert_eq!(ConnectionState::Connected, fixture.wifi.state());

    fixture.reply(&[b"OK"]).unwrap();
    assert_eq!(ConnectionState::Idle, fixture.wifi.state());
    assert!(fixture.wifi.credentials().is_none());
    assert!(!fixture.wifi.ip_assigned());
}

#[test]
fn test_disconnect_failed_after_link_loss() {
    let mut fixture = Fixture::connected(Config::default());

    fixture.wifi.disconnect(&mut fixture.channel, MockTimer::instant_ms(100)).unwrap();
    fixture.wifi.on_notification(Notification::WifiDisconnected);
    assert_eq!(ConnectionState::Connected, fixture.wifi.state());

    fixture.reply(&[b"ERROR"]).unwrap();
    assert_eq!(ConnectionState::Reconnecting, fixture.wifi.state());
    assert!(fixture.wifi.credentials().is_some());
}

#[test]
fn test_disconnect_timeout_after_link_loss() {
    let mut fixture = Fixture::connected(Config::default().with_frame_timeout_ms(500));

    fixture.wifi.disconnect(&mut fixture.channel, MockTimer::instant_ms(100)).unwrap();
    fixture.wifi.on_notification(Notification::LinkLost);

    assert!(fixture.tick(600));
    assert_eq!(ConnectionState::Reconnecting, fixture.wifi.state());
}

#[test]
fn test_disconnect_failed_without_link_loss() {
    let mut fixture = Fixture::connected(Config::default());

    fixture.wifi.disconnect(&mut fixture.channel, MockTimer::instant_ms(100)).unwrap();
    fixture.reply(&[b"ERROR"]).unwrap();
    assert_eq!(ConnectionState::Connected, fixture.wifi.state());

    // Flag of an earlier disconnect is not carried over
    fixture.wifi.disconnect(&mut fixture.channel, MockTimer::instant_ms(200)).unwrap();
    fixture.reply(&[b"ERROR"]).unwrap();
    assert_eq!(ConnectionState::Connected, fixture.wifi.state());
}

#[test]
fn test_disconnect_busy_while_connecting() {
    let mut fixture = Fixture::new(Config::default());
    fixture.connect("net", "pass", 0).unwrap();

    let result = fixture.wifi.disconnect(&mut fixture.channel, MockTimer::instant_ms(10));
    assert_eq!(Error::Busy, result.unwrap_err());
    assert_eq!(1, fixture.serial.write_count());
}

#[test]
fn test_disconnect_stops_reconnecting() {
    let mut fixture = Fixture::connected(Config::default());
    fixture.wifi.on_notification(Notification::LinkLost);

    fixture.wifi.disconnect(&mut fixture.channel, MockTimer::instant_ms(10)).unwrap();
    fixture.reply(&[b"OK"]).unwrap();
    assert_eq!(ConnectionState::Idle, fixture.wifi.state());

    fixture.service(100);
    assert_eq!(2, fixture.serial.write_count());
}

#[test]
fn test_ip_assigned() {
    let mut fixture = Fixture::connected(Config::default());
    assert!(!fixture.wifi.ip_assigned());

    fixture.wifi.on_notification(Notification::GotIp);
    assert!(fixture.wifi.ip_assigned());

    fixture.wifi.on_notification(Notification::LinkLost);
    assert!(!fixture.wifi.ip_assigned());
}

#[test]
fn test_unrelated_response_ignored() {
    let mut fixture = Fixture::new(Config::default());
    let timeout: TimerDurationU32<1_000_000> = TimerDurationU32::millis(100);

    fixture
        .channel
        .send(b"AT+GMR", timeout, MockTimer::instant_ms(0), Origin::Application)
        .unwrap();
    let frame = Frame::new(FrameKind::Reply, heapless::Vec::from_slice(b"OK").unwrap(), Terminator::Reply);
    let response = fixture.channel.on_frame(&frame).unwrap().unwrap();

    fixture.wifi.on_response(&response);
    assert_eq!(ConnectionState::Idle, fixture.wifi.state());
}
