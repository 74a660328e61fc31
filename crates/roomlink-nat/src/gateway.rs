//! Collaborator traits for NAT control and local network inspection.
//!
//! The manager only talks to these traits, so tests can swap in scripted
//! gateways and networks while production uses the UPnP, NAT-PMP and
//! system implementations in this crate.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use async_trait::async_trait;
use roomlink_protocol::TransportProtocol;

use crate::NatError;

/// Which protocol a discovered gateway speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayKind {
    Upnp,
    NatPmp,
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upnp => f.write_str("UPnP"),
            Self::NatPmp => f.write_str("NAT-PMP"),
        }
    }
}

/// One entry of a gateway's mapping table.
///
/// The gateway is the source of truth; instances are snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortMapping {
    pub protocol: TransportProtocol,
    /// Host and port on the private network.
    pub private: SocketAddrV4,
    /// Port opened on the gateway's external address.
    pub public_port: u16,
    pub description: String,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :{} -> {}", self.protocol, self.public_port, self.private)
    }
}

/// Finds a gateway on the local network.
#[async_trait]
pub trait GatewayProvider: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Looks for a gateway, giving up after `timeout`.
    async fn discover(
        &self,
        timeout: Duration,
    ) -> Result<Box<dyn NatGateway>, NatError>;
}

/// A discovered gateway that can hold port mappings.
#[async_trait]
pub trait NatGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// The gateway's address on the private network.
    fn gateway_ip(&self) -> Ipv4Addr;

    async fn external_ip(&self) -> Result<IpAddr, NatError>;

    /// Reads the current mapping table.
    async fn list_mappings(&self) -> Result<Vec<PortMapping>, NatError>;

    /// Registers `mapping`. A zero `lease` asks for a mapping that lasts
    /// until it is removed.
    async fn add_mapping(
        &self,
        mapping: &PortMapping,
        lease: Duration,
    ) -> Result<(), NatError>;

    async fn remove_mapping(
        &self,
        protocol: TransportProtocol,
        public_port: u16,
    ) -> Result<(), NatError>;
}

/// An IPv4 address assigned to a local interface, with its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalNetwork {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl LocalNetwork {
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            address,
            prefix_len: prefix_len.min(32),
        }
    }

    /// Returns `true` if `ip` is on this network.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask = match self.prefix_len {
            0 => 0,
            n => u32::MAX << (32 - u32::from(n.min(32))),
        };
        u32::from(self.address) & mask == u32::from(ip) & mask
    }
}

/// Read-only view of the host's network configuration.
pub trait NetworkInfo: Send + Sync {
    /// IPv4 networks of the non-loopback interfaces.
    fn local_networks(&self) -> Vec<LocalNetwork>;

    /// Returns `true` if something on this host already holds `port`.
    fn is_port_in_use(&self, protocol: TransportProtocol, port: u16) -> bool;
}
