use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use shared::message::Message;
use shared::protocol::{INBOUND_QUEUE_CAPACITY, SSDP_PORT};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::net::interfaces::LocalInterface;
use crate::net::search::SearchEmitter;
use crate::net::transport::{InboundFilter, Transport};
use crate::scope::Scope;

/// MX used for searches issued through the pool
pub const DEFAULT_MAX_WAIT_SECS: u32 = 1;

/// What the pool needs from each per-interface member
pub trait PoolMember: Send + Sync {
    fn interface(&self) -> &LocalInterface;
    fn start(&self) -> Result<()>;
    fn stop(&self);
    fn is_active(&self) -> bool;
    fn search(&self, target: Option<&str>);
}

impl PoolMember for SearchEmitter {
    fn interface(&self) -> &LocalInterface {
        self.transport().interface()
    }

    fn start(&self) -> Result<()> {
        self.transport().start()
    }

    fn stop(&self) {
        self.transport().stop()
    }

    fn is_active(&self) -> bool {
        self.transport().is_active()
    }

    fn search(&self, target: Option<&str>) {
        SearchEmitter::search(self, target, DEFAULT_MAX_WAIT_SECS);
    }
}

/// Control surface the discovery service drives
pub trait ControlPool: Send + Sync + 'static {
    fn start(&self, interfaces: Option<&[String]>) -> usize;
    fn stop(&self, interfaces: Option<&[String]>);
    fn search(&self, target: Option<&str>, sender: Option<SocketAddr>);
}

/// Fixed map of interface name to member, built once
pub struct InterfacePool<M: PoolMember = SearchEmitter> {
    members: BTreeMap<String, M>,
}

impl InterfacePool<SearchEmitter> {
    /// Build one transport per interface, all feeding the returned queue
    pub fn new(
        control_point: &str,
        interfaces: Vec<LocalInterface>,
        scope: &Scope,
    ) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);

        let members = interfaces.into_iter().map(|iface| {
            let transport = Arc::new(Transport::new(iface, SSDP_PORT, tx.clone(), scope.clone()));
            SearchEmitter::new(transport, control_point, scope.clone())
        });

        (Self::from_members(members), rx)
    }

    /// Same inbound filter on every transport
    pub fn set_filter(&self, filter: Option<InboundFilter>) {
        for member in self.members.values() {
            member.transport().set_filter(filter.clone());
        }
    }
}

impl<M: PoolMember> InterfacePool<M> {
    pub fn from_members(members: impl IntoIterator<Item = M>) -> Self {
        let members = members
            .into_iter()
            .map(|member| (member.interface().name.clone(), member))
            .collect();
        Self { members }
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn active_interfaces(&self) -> Vec<String> {
        self.members
            .iter()
            .filter(|(_, member)| member.is_active())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn member(&self, name: &str) -> Option<&M> {
        self.members.get(name)
    }

    /// Members named in `names`, or all of them. Unknown names are skipped.
    fn selected<'a>(&'a self, names: Option<&'a [String]>) -> Vec<&'a M> {
        match names {
            Some(names) => names
                .iter()
                .filter_map(|name| {
                    let member = self.members.get(name);
                    if member.is_none() {
                        tracing::warn!("No SSDP transport for interface {}", name);
                    }
                    member
                })
                .collect(),
            None => self.members.values().collect(),
        }
    }

    /// Interface a sender was heard on. An IPv6 scope id names it directly;
    /// otherwise an exact address match wins, then the subnet. Link-local
    /// subnets exist on every link, so they never decide.
    fn resolve(&self, sender: SocketAddr) -> Option<&M> {
        if let SocketAddr::V6(v6) = sender {
            if v6.scope_id() != 0 {
                return self
                    .members
                    .values()
                    .find(|member| member.interface().index == v6.scope_id());
            }
        }

        let address = sender.ip();
        self.members
            .values()
            .find(|member| member.interface().owns(address))
            .or_else(|| {
                if is_link_local(address) {
                    return None;
                }
                self.members
                    .values()
                    .find(|member| member.interface().on_link(address))
            })
    }
}

impl<M: PoolMember + 'static> ControlPool for InterfacePool<M> {
    /// Start the selected transports; returns how many are running after
    fn start(&self, interfaces: Option<&[String]>) -> usize {
        self.selected(interfaces)
            .into_iter()
            .filter(|member| match member.start() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Interface {} not started: {}", member.interface().name, e);
                    false
                }
            })
            .count()
    }

    fn stop(&self, interfaces: Option<&[String]>) {
        for member in self.selected(interfaces) {
            member.stop();
        }
    }

    /// Search on the interface `sender` was heard on, or on every interface
    fn search(&self, target: Option<&str>, sender: Option<SocketAddr>) {
        if let Some(member) = sender.and_then(|sender| self.resolve(sender)) {
            member.search(target);
            return;
        }

        for member in self.members.values() {
            member.search(target);
        }
    }
}

fn is_link_local(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}
