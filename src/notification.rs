use atat::AtatUrc;

/// Asynchronous messages of ESP-AT, parsed from [FrameKind::Notification](crate::framer::FrameKind) payloads
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Notification {
    /// Modem (re)started and is ready for receiving AT commands
    Ready,
    /// WIFi connection state changed to to connected
    WifiConnected,
    /// Wifi connection state changed to disconnected
    WifiDisconnected,
    /// Received an IP from the access point
    GotIp,
    /// Link to the access point was lost
    LinkLost,
    /// Unknown notification, e.g. a prefix configured by the application
    Unknown,
}

impl AtatUrc for Notification {
    type Response = Self;

    /// Parses a notification line without terminator
    fn parse(resp: &[u8]) -> Option<Self::Response> {
        if resp.starts_with(b"+LINK_LOST") {
            return Some(Self::LinkLost);
        }

        match resp {
            b"ready" => Some(Self::Ready),
            b"WIFI CONNECTED" => Some(Self::WifiConnected),
            b"WIFI DISCONNECT" => Some(Self::WifiDisconnected),
            b"WIFI GOT IP" => Some(Self::GotIp),
            _ => Some(Self::Unknown),
        }
    }
}

impl Notification {
    /// Parses the payload of a notification frame
    pub fn from_payload(payload: &[u8]) -> Self {
        <Self as AtatUrc>::parse(payload).unwrap_or(Self::Unknown)
    }

    /// True if the message signals that the module is no longer associated with the access point.
    /// Includes `ready`, as a restarted module has lost its association.
    pub fn is_link_loss(&self) -> bool {
        matches!(self, Self::LinkLost | Self::WifiDisconnected | Self::Ready)
    }
}
