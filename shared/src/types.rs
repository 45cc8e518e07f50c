use std::net::SocketAddr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::error::{MessageError, Result};
use crate::headers::Header;
use crate::message::{expiry, Message, MessageType};

/// A device or service announcing itself, projected from an `ssdp:alive`
/// notification or a search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    /// URL of the description document
    pub location: String,

    /// NT of a notification, ST of a search response
    pub device_type: String,

    /// Product tokens, e.g. "unix/5.1 UPnP/2.0 Lamp/1.0"
    pub server: String,

    /// Unique service name
    pub usn: String,

    pub boot_id: u32,

    pub config_id: u32,

    pub search_port: Option<u16>,

    /// Instant after which the advertisement must be treated as stale
    pub expires_at: DateTime<Utc>,
}

impl Advertisement {
    /// Project a message onto an advertisement. Fails if any header the
    /// advertisement needs is absent or unparsable.
    pub fn from_message(message: &Message) -> Result<Self> {
        let type_header = match message.kind() {
            MessageType::SearchResponse => Header::SearchTarget,
            _ => Header::NotificationType,
        };

        let max_age = message
            .max_age()?
            .ok_or(MessageError::MissingHeader(Header::CacheControl))?;

        // DATE, when sent, is the origin of max-age; otherwise receipt time
        let issued_at = match message.header(Header::Date) {
            Some(date) => DateTime::parse_from_rfc2822(date)
                .map_err(|_| MessageError::InvalidValue {
                    header: Header::Date,
                    value: date.to_string(),
                })?
                .with_timezone(&Utc),
            None => message.timestamp(),
        };

        Ok(Self {
            location: message.required_header(Header::Location)?.to_string(),
            device_type: message.required_header(type_header)?.to_string(),
            server: message.required_header(Header::Server)?.to_string(),
            usn: message.required_header(Header::UniqueServiceName)?.to_string(),
            boot_id: message.required_parsed(Header::BootId)?,
            config_id: message.required_parsed(Header::ConfigId)?,
            search_port: message.parsed(Header::SearchPort)?,
            expires_at: expiry(issued_at, max_age),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Valid strictly before the expiry instant
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// A planned boot id rollover announced with `ssdp:update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub location: String,
    pub usn: String,
    pub boot_id: u32,
    pub config_id: u32,
    pub search_port: Option<u16>,
    pub next_boot_id: u32,
    pub sender: Option<SocketAddr>,
}

impl Update {
    pub fn from_message(message: &Message) -> Result<Self> {
        Ok(Self {
            location: message.required_header(Header::Location)?.to_string(),
            usn: message.required_header(Header::UniqueServiceName)?.to_string(),
            boot_id: message.required_parsed(Header::BootId)?,
            config_id: message.required_parsed(Header::ConfigId)?,
            search_port: message.parsed(Header::SearchPort)?,
            next_boot_id: message.required_parsed(Header::NextBootId)?,
            sender: message.sender(),
        })
    }

    /// The `uuid:...` part of the USN, before `::`
    pub fn device_uuid(&self) -> &str {
        device_uuid(&self.usn)
    }
}

/// Strip the `::type` suffix from a USN
pub fn device_uuid(usn: &str) -> &str {
    usn.split("::").next().unwrap_or(usn)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Add,
    Remove,
}

/// Change to the set of known devices, delivered to the consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub command: Command,

    pub usn: String,

    /// Where to fetch the description document (Add only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Absolute expiry of the advertisement (Add only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn add(ad: &Advertisement) -> Self {
        Self {
            command: Command::Add,
            usn: ad.usn.clone(),
            location: Some(ad.location.clone()),
            server: Some(ad.server.clone()),
            ttl: Some(ad.expires_at),
        }
    }

    pub fn remove(usn: impl Into<String>) -> Self {
        Self {
            command: Command::Remove,
            usn: usn.into(),
            location: None,
            server: None,
            ttl: None,
        }
    }
}
