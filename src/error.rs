use embedded_io::ErrorKind;

/// Errors of the serial link and the connection manager
///
/// None of them is fatal. Operations returning [Error::Busy] may simply be retried later, all
/// other variants are either returned once or reported as [Event::Error](crate::manager::Event::Error).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Operation rejected, as a command or connection attempt is already in flight
    Busy,

    /// No final reply was received within the command timeout
    Timeout,

    /// Received an unparsable line or a line exceeding the buffer capacity
    Malformed,

    /// Received a reply while no command was pending. Signals a protocol desynchronization.
    UnsolicitedReply,

    /// Joining the access point failed and the reconnect budget is exhausted
    ConnectionFailed,

    /// Given SSID is longer then the max. size of 32 bytes
    InvalidSsidLength,

    /// Given passphrase is longer then the max. size of 63 bytes
    InvalidPassphraseLength,

    /// Encoded command does not fit in the command buffer
    CommandTooLong,

    /// Upstream UART error
    Serial(ErrorKind),
}

impl Error {
    /// Maps an [embedded_io] error of the UART collaborator
    pub(crate) fn serial<E: embedded_io::Error>(error: E) -> Self {
        Error::Serial(error.kind())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Busy => defmt::write!(f, "Error::Busy"),
            Error::Timeout => defmt::write!(f, "Error::Timeout"),
            Error::Malformed => defmt::write!(f, "Error::Malformed"),
            Error::UnsolicitedReply => defmt::write!(f, "Error::UnsolicitedReply"),
            Error::ConnectionFailed => defmt::write!(f, "Error::ConnectionFailed"),
            Error::InvalidSsidLength => defmt::write!(f, "Error::InvalidSsidLength"),
            Error::InvalidPassphraseLength => defmt::write!(f, "Error::InvalidPassphraseLength"),
            Error::CommandTooLong => defmt::write!(f, "Error::CommandTooLong"),
            Error::Serial(kind) => defmt::write!(f, "Error::Serial({})", kind),
        }
    }
}
