use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Discovery scope is already shut down")]
    ScopeClosed,

    #[error("Cannot open SSDP socket on {interface}: {source}")]
    SocketSetup {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("SSDP socket on {0} is not open")]
    NotRunning(String),

    #[error("Failed to send on {interface}: {source}")]
    Send {
        interface: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::SocketSetup {
            interface: "eth0".to_string(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "Cannot open SSDP socket on eth0: in use");
        assert!(std::error::Error::source(&err).is_some());

        let err = TransportError::NotRunning("wlan0".to_string());
        assert!(err.to_string().contains("wlan0"));
    }
}
