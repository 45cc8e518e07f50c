use std::fmt;
use serde::{Deserialize, Serialize};

/// Every header field an SSDP message may carry.
///
/// The catalog is closed: a header line whose token is not listed here makes
/// the whole datagram malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Header {
    /// Multicast address and port, e.g. `239.255.255.250:1900`
    Host,
    /// `max-age=N`, seconds the advertisement stays valid
    CacheControl,
    /// URL of the device description
    Location,
    /// Notification type (NT)
    NotificationType,
    /// Notification sub-type (NTS): alive, byebye or update
    NotificationSubType,
    /// Product tokens of the advertising device
    Server,
    /// Unique service name (USN)
    UniqueServiceName,
    BootId,
    NextBootId,
    ConfigId,
    /// Port the device answers unicast M-SEARCH on, when not 1900
    SearchPort,
    SecureLocation,
    /// MAN, always `"ssdp:discover"`
    ManagedAwarenessNumber,
    /// MX, seconds a device may delay its response
    MaxWaitTime,
    /// ST
    SearchTarget,
    UserAgent,
    TcpPort,
    ControlPointFriendlyName,
    ControlPointUuid,
    Date,
    /// Empty-valued marker required in search responses
    Ext,
}

impl Header {
    pub const ALL: [Header; 21] = [
        Header::Host,
        Header::CacheControl,
        Header::Location,
        Header::NotificationType,
        Header::NotificationSubType,
        Header::Server,
        Header::UniqueServiceName,
        Header::BootId,
        Header::NextBootId,
        Header::ConfigId,
        Header::SearchPort,
        Header::SecureLocation,
        Header::ManagedAwarenessNumber,
        Header::MaxWaitTime,
        Header::SearchTarget,
        Header::UserAgent,
        Header::TcpPort,
        Header::ControlPointFriendlyName,
        Header::ControlPointUuid,
        Header::Date,
        Header::Ext,
    ];

    /// Wire token for this header
    pub fn token(self) -> &'static str {
        match self {
            Header::Host => "HOST",
            Header::CacheControl => "CACHE-CONTROL",
            Header::Location => "LOCATION",
            Header::NotificationType => "NT",
            Header::NotificationSubType => "NTS",
            Header::Server => "SERVER",
            Header::UniqueServiceName => "USN",
            Header::BootId => "BOOTID.UPNP.ORG",
            Header::NextBootId => "NEXTBOOTID.UPNP.ORG",
            Header::ConfigId => "CONFIGID.UPNP.ORG",
            Header::SearchPort => "SEARCHPORT.UPNP.ORG",
            Header::SecureLocation => "SECURELOCATION.UPNP.ORG",
            Header::ManagedAwarenessNumber => "MAN",
            Header::MaxWaitTime => "MX",
            Header::SearchTarget => "ST",
            Header::UserAgent => "USER-AGENT",
            Header::TcpPort => "TCPPORT.UPNP.ORG",
            Header::ControlPointFriendlyName => "CPFN.UPNP.ORG",
            Header::ControlPointUuid => "CPUUID.UPNP.ORG",
            Header::Date => "DATE",
            Header::Ext => "EXT",
        }
    }

    /// Look up a header by wire token. Field names are case-insensitive.
    pub fn from_token(token: &str) -> Option<Header> {
        Header::ALL
            .iter()
            .copied()
            .find(|h| h.token().eq_ignore_ascii_case(token))
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
