use crate::error::Error;
use crate::responses::NoResponse;
use atat::atat_derive::AtatCmd;
use atat::heapless::String;
use core::str::FromStr;

/// Sets the WIFI mode
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CWMODE", NoResponse, timeout_ms = 1_000)]
pub struct WifiModeCommand {
    /// WIFI mode:
    ///     0: Null mode. Wi-Fi RF will be disabled.
    ///     1: Station mode.
    ///     2: SoftAP mode.
    ///     3: SoftAP+Station mode.
    #[at_arg(position = 0)]
    mode: usize,
}

impl WifiModeCommand {
    pub fn station_mode() -> Self {
        Self { mode: 1 }
    }
}

/// Command for joining the target WIFI access point
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CWJAP", NoResponse, timeout_ms = 20_000)]
pub struct AccessPointConnectCommand {
    /// The SSID of the target access point
    #[at_arg(position = 0)]
    ssid: String<32>,

    /// The password/key of the target access point
    #[at_arg(position = 1)]
    password: String<64>,
}

impl AccessPointConnectCommand {
    /// Validates the length limits of ESP-AT
    pub fn new(ssid: &str, password: &str) -> Result<Self, Error> {
        if ssid.len() > 32 {
            return Err(Error::InvalidSsidLength);
        }

        if password.len() > 63 {
            return Err(Error::InvalidPassphraseLength);
        }

        Ok(Self {
            ssid: String::from_str(ssid).map_err(|_| Error::InvalidSsidLength)?,
            password: String::from_str(password).map_err(|_| Error::InvalidPassphraseLength)?,
        })
    }
}

/// Queries the access point the station is joined to. Responds with `+CWJAP:<ssid>,...` or `No AP`.
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CWJAP?", NoResponse, timeout_ms = 1_000)]
pub struct JoinStatusCommand;

/// Disconnects from the access point
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CWQAP", NoResponse, timeout_ms = 1_000)]
pub struct DisconnectCommand;

/// Queries the local IP and MAC addresses
#[derive(Clone, Default, AtatCmd)]
#[at_cmd("+CIFSR", NoResponse, timeout_ms = 1_000)]
pub struct ObtainLocalAddressCommand;
