use thiserror::Error;

use crate::headers::Header;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("Malformed SSDP message: {0}")]
    Malformed(String),

    #[error("Unknown SSDP message type: {0}")]
    UnknownMessageType(String),

    #[error("SSDP message has no required header {0}")]
    MissingHeader(Header),

    #[error("SSDP message must have a {} header", Header::BootId)]
    MissingBootId,

    #[error("Invalid value for {header}: {value:?}")]
    InvalidValue { header: Header, value: String },
}

pub type Result<T> = std::result::Result<T, MessageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MessageError::MissingHeader(Header::Location);
        assert_eq!(err.to_string(), "SSDP message has no required header LOCATION");

        let err = MessageError::MissingBootId;
        assert!(err.to_string().contains("BOOTID.UPNP.ORG"));
    }
}
