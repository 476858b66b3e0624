//! Mocks for doc examples
use core::convert::Infallible;
use embedded_io::{ErrorType, Read, ReadReady, Write};
use fugit::{TimerDurationU32, TimerInstantU32};
use fugit_timer::Timer;
use heapless::{Deque, Vec};

/// UART mock, answering commands like an ESP8266 running AT firmware
#[derive(Default)]
pub struct ExampleSerial {
    /// Bytes of the current command line
    command: Vec<u8, 128>,

    /// Bytes waiting to be read
    rx: Deque<u8, 512>,
}

impl ExampleSerial {
    /// Simulates the module sending the given data
    pub fn receive(&mut self, data: &[u8]) {
        for byte in data {
            let _ = self.rx.push_back(*byte);
        }
    }

    fn respond(&mut self) {
        let command = core::mem::take(&mut self.command);

        // Echo, terminated by CR CR LF
        let line = command.strip_suffix(b"\r\n").unwrap_or(command.as_slice());
        self.receive(line);
        self.receive(b"\r\r\n");

        match command.as_slice() {
            b"AT+CWJAP=\"test_wifi\",\"secret\"\r\n" => {
                self.receive(b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n");
            }
            b"AT+CWJAP?\r\n" => self.receive(b"+CWJAP:\"test_wifi\",\"10:fe:ed:05:ba:01\",6,-52\r\n\r\nOK\r\n"),
            b"AT+CWQAP\r\n" => self.receive(b"\r\nOK\r\nWIFI DISCONNECT\r\n"),
            b"AT+CIFSR\r\n" => {
                self.receive(b"+CIFSR:STAIP,\"10.0.0.181\"\r\n+CIFSR:STAMAC,\"10:fe:ed:05:ba:50\"\r\n\r\nOK\r\n");
            }
            &_ => self.receive(b"\r\nOK\r\n"),
        }
    }
}

impl ErrorType for ExampleSerial {
    type Error = Infallible;
}

impl Read for ExampleSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut length = 0;

        while length < buf.len() {
            let Some(byte) = self.rx.pop_front() else {
                break;
            };

            buf[length] = byte;
            length += 1;
        }

        Ok(length)
    }
}

impl ReadReady for ExampleSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl Write for ExampleSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for byte in buf {
            let _ = self.command.push(*byte);

            if *byte == b'\n' {
                self.respond();
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Timer mock, advancing by one millisecond on each `now()` call
#[derive(Default)]
pub struct ExampleTimer {
    /// Current time in ms
    millis: u32,
}

impl Timer<1_000_000> for ExampleTimer {
    type Error = u32;

    fn now(&mut self) -> TimerInstantU32<1000000> {
        self.millis = self.millis.wrapping_add(1);
        TimerInstantU32::from_ticks(self.millis.wrapping_mul(1_000))
    }

    fn start(&mut self, _duration: TimerDurationU32<1000000>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn wait(&mut self) -> nb::Result<(), Self::Error> {
        nb::Result::Err(nb::Error::WouldBlock)
    }
}
