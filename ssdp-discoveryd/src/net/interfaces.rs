use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use serde::Deserialize;
use shared::protocol::{SSDP_ADDRESS_V4, SSDP_ADDRESS_V6, SSDP_PORT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub ip: IpAddr,
    pub netmask: Option<IpAddr>,
}

impl InterfaceAddr {
    pub fn new(ip: IpAddr, netmask: Option<IpAddr>) -> Self {
        Self { ip, netmask }
    }

    /// Whether `addr` lies in this address's subnet
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.ip, self.netmask, addr) {
            (IpAddr::V4(ip), Some(IpAddr::V4(mask)), IpAddr::V4(other)) => {
                let mask = u32::from(mask);
                (u32::from(ip) & mask) == (u32::from(other) & mask)
            }
            (IpAddr::V6(ip), Some(IpAddr::V6(mask)), IpAddr::V6(other)) => {
                let mask = u128::from(mask);
                (u128::from(ip) & mask) == (u128::from(other) & mask)
            }
            _ => false,
        }
    }
}

/// A network interface a transport can bind to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub index: u32,
    pub addrs: Vec<InterfaceAddr>,
}

impl LocalInterface {
    pub fn new(name: impl Into<String>, index: u32, addrs: Vec<InterfaceAddr>) -> Self {
        Self {
            name: name.into(),
            index,
            addrs,
        }
    }

    /// List the host's interfaces, merging per-address entries by name
    pub fn enumerate() -> Result<Vec<LocalInterface>, network_interface::Error> {
        let mut interfaces: Vec<LocalInterface> = Vec::new();

        for iface in NetworkInterface::show()? {
            let addrs = iface.addr.iter().map(|addr| match addr {
                Addr::V4(v4) => InterfaceAddr::new(IpAddr::V4(v4.ip), v4.netmask.map(IpAddr::V4)),
                Addr::V6(v6) => InterfaceAddr::new(IpAddr::V6(v6.ip), v6.netmask.map(IpAddr::V6)),
            });

            match interfaces.iter_mut().find(|known| known.name == iface.name) {
                Some(known) => known.addrs.extend(addrs),
                None => interfaces.push(LocalInterface::new(
                    iface.name.clone(),
                    iface.index,
                    addrs.collect(),
                )),
            }
        }

        Ok(interfaces)
    }

    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.addrs.iter().find_map(|addr| match addr.ip {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
    }

    pub fn has_ipv4(&self) -> bool {
        self.ipv4().is_some()
    }

    pub fn has_ipv6(&self) -> bool {
        self.addrs.iter().any(|addr| addr.ip.is_ipv6())
    }

    pub fn is_loopback(&self) -> bool {
        !self.addrs.is_empty() && self.addrs.iter().all(|addr| addr.ip.is_loopback())
    }

    /// The interface carries `addr` itself
    pub fn owns(&self, addr: IpAddr) -> bool {
        self.addrs.iter().any(|a| a.ip == addr)
    }

    /// `addr` is reachable on-link through this interface
    pub fn on_link(&self, addr: IpAddr) -> bool {
        self.addrs.iter().any(|a| a.contains(addr))
    }

    /// SSDP group for this interface: IPv4 when it has an IPv4 address
    pub fn multicast_group(&self) -> SocketAddr {
        if self.has_ipv4() {
            SocketAddr::V4(SocketAddrV4::new(SSDP_ADDRESS_V4, SSDP_PORT))
        } else {
            SocketAddr::V6(SocketAddrV6::new(SSDP_ADDRESS_V6, SSDP_PORT, 0, self.index))
        }
    }

    /// HOST header value for searches sent from this interface
    pub fn multicast_host(&self) -> String {
        if self.has_ipv4() {
            format!("{SSDP_ADDRESS_V4}:{SSDP_PORT}")
        } else {
            format!("[{}]:{SSDP_PORT}", SSDP_ADDRESS_V6.to_string().to_uppercase())
        }
    }
}

/// Which IP families qualify an interface for discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IpStack {
    Ipv4Only,
    Ipv6Only,
    #[default]
    DualStack,
}

impl IpStack {
    pub fn qualifies(self, iface: &LocalInterface) -> bool {
        if iface.is_loopback() {
            return false;
        }
        match self {
            IpStack::Ipv4Only => iface.has_ipv4(),
            IpStack::Ipv6Only => iface.has_ipv6(),
            IpStack::DualStack => iface.has_ipv4() || iface.has_ipv6(),
        }
    }

    pub fn select(self, interfaces: impl IntoIterator<Item = LocalInterface>) -> Vec<LocalInterface> {
        interfaces
            .into_iter()
            .filter(|iface| self.qualifies(iface))
            .collect()
    }
}
