use std::net::{Ipv4Addr, Ipv6Addr};

/// IANA multicast group for SSDP over IPv4
pub const SSDP_ADDRESS_V4: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Link-local multicast group for SSDP over IPv6 (FF02::C)
pub const SSDP_ADDRESS_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x000c);

/// SSDP port for both address families
pub const SSDP_PORT: u16 = 1900;

/// Request/status lines
pub const SEARCH_LINE: &str = "M-SEARCH * HTTP/1.1";
pub const NOTIFY_LINE: &str = "NOTIFY * HTTP/1.1";
pub const RESPONSE_LINE: &str = "HTTP/1.1 200 OK";

/// NTS values
pub const NTS_ALIVE: &str = "ssdp:alive";
pub const NTS_BYEBYE: &str = "ssdp:byebye";
pub const NTS_UPDATE: &str = "ssdp:update";

/// MAN value for M-SEARCH. Quoted on the wire, unlike NTS and ST.
pub const SSDP_MAN: &str = "\"ssdp:discover\"";

/// Wildcard search target
pub const SSDP_ALL: &str = "ssdp:all";

/// Largest datagram a transport will read
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// How many times each M-SEARCH is sent, UDP being unreliable
pub const SEARCH_REPEAT: u32 = 3;

/// Bounds on MX (seconds)
pub const MIN_WAIT_SECS: u32 = 1;
pub const MAX_WAIT_SECS: u32 = 5;

/// Capacity of the merged inbound queue shared by all transports
pub const INBOUND_QUEUE_CAPACITY: usize = 1000;

/// Multicast TTL / hop limit for outbound traffic
pub const MULTICAST_TTL: u32 = 4;
