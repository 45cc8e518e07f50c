use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MessageError, Result};
use crate::headers::Header;
use crate::protocol::{
    NOTIFY_LINE, NTS_ALIVE, NTS_BYEBYE, NTS_UPDATE, RESPONSE_LINE, SEARCH_LINE, SSDP_ALL, SSDP_MAN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Search,
    SearchResponse,
    NotifyAlive,
    NotifyByeBye,
    NotifyUpdate,
}

impl MessageType {
    pub fn start_line(self) -> &'static str {
        match self {
            MessageType::Search => SEARCH_LINE,
            MessageType::SearchResponse => RESPONSE_LINE,
            MessageType::NotifyAlive | MessageType::NotifyByeBye | MessageType::NotifyUpdate => {
                NOTIFY_LINE
            }
        }
    }

    /// Headers every new message of this type starts with. Each message gets
    /// its own copy; the template itself is never mutated.
    fn default_headers(self) -> &'static [(Header, &'static str)] {
        match self {
            MessageType::Search => &[
                (Header::ManagedAwarenessNumber, SSDP_MAN),
                (Header::MaxWaitTime, "1"),
                (Header::SearchTarget, SSDP_ALL),
            ],
            MessageType::SearchResponse => &[],
            MessageType::NotifyAlive => &[(Header::NotificationSubType, NTS_ALIVE)],
            MessageType::NotifyByeBye => &[(Header::NotificationSubType, NTS_BYEBYE)],
            MessageType::NotifyUpdate => &[(Header::NotificationSubType, NTS_UPDATE)],
        }
    }

    /// Resolve the type from the start line and, for NOTIFY, the NTS header.
    fn resolve(start_line: &str, headers: &BTreeMap<Header, String>) -> Result<Self> {
        match start_line {
            SEARCH_LINE => Ok(MessageType::Search),
            RESPONSE_LINE => Ok(MessageType::SearchResponse),
            NOTIFY_LINE => {
                let nts = headers.get(&Header::NotificationSubType).ok_or_else(|| {
                    MessageError::UnknownMessageType("NOTIFY without NTS header".to_string())
                })?;
                match nts.as_str() {
                    NTS_ALIVE => Ok(MessageType::NotifyAlive),
                    NTS_BYEBYE => Ok(MessageType::NotifyByeBye),
                    NTS_UPDATE => Ok(MessageType::NotifyUpdate),
                    other => Err(MessageError::UnknownMessageType(format!(
                        "unknown NOTIFY sub type {other:?}"
                    ))),
                }
            }
            other => Err(MessageError::UnknownMessageType(format!(
                "unknown start line {other:?}"
            ))),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Search => "M-SEARCH",
            MessageType::SearchResponse => "search response",
            MessageType::NotifyAlive => "ssdp:alive",
            MessageType::NotifyByeBye => "ssdp:byebye",
            MessageType::NotifyUpdate => "ssdp:update",
        };
        f.write_str(name)
    }
}

/// One SSDP message, inbound or outbound
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    kind: MessageType,
    timestamp: DateTime<Utc>,
    sender: Option<SocketAddr>,
    boot_id: u32,
    headers: BTreeMap<Header, String>,
}

impl Message {
    /// Fresh outbound message seeded with the default headers of `kind`
    pub fn new(kind: MessageType) -> Self {
        let headers = kind
            .default_headers()
            .iter()
            .map(|(header, value)| (*header, value.to_string()))
            .collect();

        Self {
            kind,
            timestamp: Utc::now(),
            sender: None,
            boot_id: 0,
            headers,
        }
    }

    pub fn with_header(mut self, header: Header, value: impl Into<String>) -> Self {
        self.set_header(header, value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set a header, replacing any previous value. Setting BOOTID also
    /// updates the message boot id when the value is numeric.
    pub fn set_header(&mut self, header: Header, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        if header == Header::BootId {
            if let Ok(boot_id) = value.trim().parse() {
                self.boot_id = boot_id;
            }
        }
        self.headers.insert(header, value);
        self
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Address the datagram came from; `None` for locally built messages
    pub fn sender(&self) -> Option<SocketAddr> {
        self.sender
    }

    pub fn boot_id(&self) -> u32 {
        self.boot_id
    }

    pub fn set_boot_id(&mut self, boot_id: u32) {
        self.boot_id = boot_id;
        self.headers.insert(Header::BootId, boot_id.to_string());
    }

    pub fn header(&self, header: Header) -> Option<&str> {
        self.headers.get(&header).map(String::as_str)
    }

    pub fn required_header(&self, header: Header) -> Result<&str> {
        self.header(header).ok_or(MessageError::MissingHeader(header))
    }

    /// Parse an optional header into `T`
    pub fn parsed<T: FromStr>(&self, header: Header) -> Result<Option<T>> {
        self.header(header)
            .map(|value| parse_value(header, value))
            .transpose()
    }

    /// Parse a required header into `T`
    pub fn required_parsed<T: FromStr>(&self, header: Header) -> Result<T> {
        parse_value(header, self.required_header(header)?)
    }

    pub fn headers(&self) -> impl Iterator<Item = (Header, &str)> {
        self.headers.iter().map(|(h, v)| (*h, v.as_str()))
    }

    /// `max-age` of the CACHE-CONTROL header, `None` if the header is absent
    pub fn max_age(&self) -> Result<Option<u64>> {
        match self.header(Header::CacheControl) {
            Some(value) => parse_max_age(value).map(Some).ok_or_else(|| {
                MessageError::InvalidValue {
                    header: Header::CacheControl,
                    value: value.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    /// True once `max-age` seconds have passed since the message timestamp.
    /// Messages without a usable CACHE-CONTROL never expire here.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.max_age() {
            Ok(Some(max_age)) => now >= expiry(self.timestamp, max_age),
            _ => false,
        }
    }

    /// Decode one datagram payload.
    pub fn decode(payload: &[u8], sender: Option<SocketAddr>) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| MessageError::Malformed(format!("payload is not UTF-8: {e}")))?;

        let mut lines = text.split("\r\n").filter(|line| !line.trim().is_empty());
        let start_line = lines
            .next()
            .ok_or_else(|| MessageError::Malformed("empty datagram".to_string()))?
            .trim();

        let mut headers = BTreeMap::new();
        for line in lines {
            let (header, value) = parse_header_line(line)?;
            headers.insert(header, value);
        }

        let kind = MessageType::resolve(start_line, &headers)?;
        let boot_id = match headers.get(&Header::BootId) {
            Some(value) => parse_value(Header::BootId, value)?,
            None => return Err(MessageError::MissingBootId),
        };

        Ok(Self {
            kind,
            timestamp: Utc::now(),
            sender,
            boot_id,
            headers,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::with_capacity(256);
        out.push_str(self.kind.start_line());
        out.push_str("\r\n");
        for (header, value) in &self.headers {
            out.push_str(header.token());
            out.push(':');
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.into_bytes()
    }
}

fn parse_header_line(line: &str) -> Result<(Header, String)> {
    let (token, value) = line
        .split_once(':')
        .ok_or_else(|| MessageError::Malformed(format!("invalid header format: {line:?}")))?;

    let header = Header::from_token(token.trim())
        .ok_or_else(|| MessageError::Malformed(format!("unknown header: {line:?}")))?;

    Ok((header, value.trim().to_string()))
}

fn parse_value<T: FromStr>(header: Header, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| MessageError::InvalidValue {
        header,
        value: value.to_string(),
    })
}

/// Extract `max-age` from a CACHE-CONTROL value; other directives are ignored.
pub fn parse_max_age(value: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        let (name, secs) = directive.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            secs.trim().parse().ok()
        } else {
            None
        }
    })
}

/// `base + secs`, saturating at the largest representable instant
pub(crate) fn expiry(base: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| base.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alive_payload() -> String {
        [
            "NOTIFY * HTTP/1.1",
            "HOST:239.255.255.250:1900",
            "CACHE-CONTROL:max-age=1800",
            "LOCATION:http://192.168.1.20:8080/desc.xml",
            "NT:upnp:rootdevice",
            "NTS:ssdp:alive",
            "SERVER:unix/5.1 UPnP/2.0 Lamp/1.0",
            "USN:uuid:abc::upnp:rootdevice",
            "BOOTID.UPNP.ORG:7",
            "CONFIGID.UPNP.ORG:1",
            "",
            "",
        ]
        .join("\r\n")
    }

    #[test]
    fn test_decode_alive() {
        let sender: SocketAddr = "192.168.1.20:1900".parse().unwrap();
        let msg = Message::decode(alive_payload().as_bytes(), Some(sender)).unwrap();

        assert_eq!(msg.kind(), MessageType::NotifyAlive);
        assert_eq!(msg.boot_id(), 7);
        assert_eq!(msg.sender(), Some(sender));
        assert_eq!(msg.header(Header::UniqueServiceName), Some("uuid:abc::upnp:rootdevice"));
        assert_eq!(msg.header(Header::Host), Some("239.255.255.250:1900"));
        assert_eq!(msg.max_age().unwrap(), Some(1800));
    }

    #[test]
    fn test_round_trip_preserves_type_boot_id_and_headers() {
        let original = Message::new(MessageType::NotifyUpdate)
            .with_header(Header::Host, "239.255.255.250:1900")
            .with_header(Header::Location, "http://10.0.0.2/d.xml")
            .with_header(Header::UniqueServiceName, "uuid:x::upnp:rootdevice")
            .with_header(Header::BootId, "3")
            .with_header(Header::NextBootId, "4")
            .with_header(Header::ConfigId, "9");

        let decoded = Message::decode(&original.encode(), None).unwrap();

        assert_eq!(decoded.kind(), original.kind());
        assert_eq!(decoded.boot_id(), 3);
        let headers: Vec<_> = original.headers().collect();
        assert_eq!(decoded.headers().collect::<Vec<_>>(), headers);
    }

    #[test]
    fn test_round_trip_search_response() {
        let original = Message::new(MessageType::SearchResponse)
            .with_header(Header::Ext, "")
            .with_header(Header::SearchTarget, "upnp:rootdevice")
            .with_header(Header::BootId, "1");

        let decoded = Message::decode(&original.encode(), None).unwrap();
        assert_eq!(decoded.kind(), MessageType::SearchResponse);
        assert_eq!(decoded.header(Header::Ext), Some(""));
    }

    #[test]
    fn test_encode_layout() {
        let msg = Message::new(MessageType::NotifyByeBye).with_header(Header::BootId, "1");
        let text = String::from_utf8(msg.encode()).unwrap();

        assert!(text.starts_with("NOTIFY * HTTP/1.1\r\n"));
        assert!(text.contains("NTS:ssdp:byebye\r\n"));
        assert!(text.contains("BOOTID.UPNP.ORG:1\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_missing_boot_id() {
        let payload = "NOTIFY * HTTP/1.1\r\nNTS:ssdp:byebye\r\nUSN:uuid:y\r\n\r\n";
        assert_eq!(
            Message::decode(payload.as_bytes(), None),
            Err(MessageError::MissingBootId)
        );

        let search = Message::new(MessageType::Search).encode();
        assert_eq!(Message::decode(&search, None), Err(MessageError::MissingBootId));
    }

    #[test]
    fn test_unknown_header_is_malformed() {
        let payload = alive_payload().replace("SERVER:", "X-VENDOR:");
        assert!(matches!(
            Message::decode(payload.as_bytes(), None),
            Err(MessageError::Malformed(_))
        ));
    }

    #[test]
    fn test_header_without_separator_is_malformed() {
        let payload = "NOTIFY * HTTP/1.1\r\nNTS ssdp:alive\r\nBOOTID.UPNP.ORG:1\r\n\r\n";
        assert!(matches!(
            Message::decode(payload.as_bytes(), None),
            Err(MessageError::Malformed(_))
        ));
    }

    #[test]
    fn test_unknown_start_line() {
        let payload = "GET / HTTP/1.1\r\nBOOTID.UPNP.ORG:1\r\n\r\n";
        assert!(matches!(
            Message::decode(payload.as_bytes(), None),
            Err(MessageError::UnknownMessageType(_))
        ));
    }

    #[test]
    fn test_notify_without_or_with_unknown_nts() {
        let payload = "NOTIFY * HTTP/1.1\r\nBOOTID.UPNP.ORG:1\r\n\r\n";
        assert!(matches!(
            Message::decode(payload.as_bytes(), None),
            Err(MessageError::UnknownMessageType(_))
        ));

        let payload = "NOTIFY * HTTP/1.1\r\nNTS:ssdp:propchange\r\nBOOTID.UPNP.ORG:1\r\n\r\n";
        assert!(matches!(
            Message::decode(payload.as_bytes(), None),
            Err(MessageError::UnknownMessageType(_))
        ));
    }

    #[test]
    fn test_empty_and_non_numeric_boot_id() {
        assert!(matches!(
            Message::decode(b"\r\n\r\n", None),
            Err(MessageError::Malformed(_))
        ));

        let payload = "NOTIFY * HTTP/1.1\r\nNTS:ssdp:alive\r\nBOOTID.UPNP.ORG:abc\r\n\r\n";
        assert!(matches!(
            Message::decode(payload.as_bytes(), None),
            Err(MessageError::InvalidValue { header: Header::BootId, .. })
        ));
    }

    #[test]
    fn test_blank_lines_and_value_whitespace() {
        let payload = "HTTP/1.1 200 OK\r\n\r\nST: upnp:rootdevice \r\n\r\nBOOTID.UPNP.ORG: 0012\r\n\r\n";
        let msg = Message::decode(payload.as_bytes(), None).unwrap();
        assert_eq!(msg.header(Header::SearchTarget), Some("upnp:rootdevice"));
        assert_eq!(msg.boot_id(), 12);
    }

    #[test]
    fn test_last_header_wins() {
        let payload = "HTTP/1.1 200 OK\r\nST:a\r\nST:b\r\nBOOTID.UPNP.ORG:1\r\n\r\n";
        let msg = Message::decode(payload.as_bytes(), None).unwrap();
        assert_eq!(msg.header(Header::SearchTarget), Some("b"));
    }

    #[test]
    fn test_default_headers_are_per_instance() {
        let mut first = Message::new(MessageType::Search);
        first.set_header(Header::SearchTarget, "upnp:rootdevice");

        let second = Message::new(MessageType::Search);
        assert_eq!(second.header(Header::SearchTarget), Some(SSDP_ALL));
        assert_eq!(second.header(Header::ManagedAwarenessNumber), Some(SSDP_MAN));
        assert_eq!(second.header(Header::MaxWaitTime), Some("1"));
    }

    #[test]
    fn test_required_header() {
        let msg = Message::new(MessageType::NotifyAlive);
        assert_eq!(msg.required_header(Header::NotificationSubType), Ok(NTS_ALIVE));
        assert_eq!(
            msg.required_header(Header::Location),
            Err(MessageError::MissingHeader(Header::Location))
        );
    }

    #[test]
    fn test_set_boot_id_updates_header() {
        let mut msg = Message::new(MessageType::NotifyAlive).with_header(Header::BootId, "1");
        msg.set_boot_id(2);
        assert_eq!(msg.boot_id(), 2);
        assert_eq!(msg.header(Header::BootId), Some("2"));
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        let msg = Message::new(MessageType::NotifyAlive)
            .with_header(Header::CacheControl, "max-age=10")
            .with_timestamp(now);

        assert!(!msg.is_expired_at(now));
        assert!(!msg.is_expired_at(now + Duration::seconds(9)));
        assert!(msg.is_expired_at(now + Duration::seconds(10)));

        let no_cache = Message::new(MessageType::NotifyAlive).with_timestamp(now);
        assert!(!no_cache.is_expired_at(now + Duration::days(365)));
    }

    #[test]
    fn test_parse_max_age() {
        assert_eq!(parse_max_age("max-age=1800"), Some(1800));
        assert_eq!(parse_max_age("no-cache, max-age = 60"), Some(60));
        assert_eq!(parse_max_age("MAX-AGE=5"), Some(5));
        assert_eq!(parse_max_age("no-cache"), None);
        assert_eq!(parse_max_age("max-age=soon"), None);
    }
}
