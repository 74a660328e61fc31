//! UPnP IGD gateway control via `igd-next`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use async_trait::async_trait;
use igd_next::aio::Gateway;
use igd_next::aio::tokio::Tokio;
use igd_next::{GetGenericPortMappingEntryError, PortMappingProtocol, SearchOptions};
use roomlink_protocol::TransportProtocol;

use crate::gateway::{GatewayKind, GatewayProvider, NatGateway, PortMapping};
use crate::NatError;

/// Upper bound on mapping-table entries read in one listing.
const MAX_LISTED_ENTRIES: u32 = 1024;

/// Discovers an Internet Gateway Device over SSDP.
#[derive(Debug, Default, Clone, Copy)]
pub struct UpnpProvider;

#[async_trait]
impl GatewayProvider for UpnpProvider {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Upnp
    }

    async fn discover(
        &self,
        timeout: Duration,
    ) -> Result<Box<dyn NatGateway>, NatError> {
        let options = SearchOptions {
            timeout: Some(timeout),
            ..Default::default()
        };
        let gateway = igd_next::aio::tokio::search_gateway(options).await?;
        let gateway_ip = match gateway.addr.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(ip) => {
                return Err(NatError::Discovery(format!(
                    "IPv6 gateway {ip} is not supported"
                )));
            }
        };
        tracing::debug!(%gateway_ip, "UPnP gateway found");
        Ok(Box::new(UpnpGateway {
            gateway,
            gateway_ip,
        }))
    }
}

struct UpnpGateway {
    gateway: Gateway<Tokio>,
    gateway_ip: Ipv4Addr,
}

fn to_igd(protocol: TransportProtocol) -> PortMappingProtocol {
    match protocol {
        TransportProtocol::Tcp => PortMappingProtocol::TCP,
        TransportProtocol::Udp => PortMappingProtocol::UDP,
    }
}

fn from_igd(protocol: PortMappingProtocol) -> TransportProtocol {
    match protocol {
        PortMappingProtocol::TCP => TransportProtocol::Tcp,
        PortMappingProtocol::UDP => TransportProtocol::Udp,
    }
}

#[async_trait]
impl NatGateway for UpnpGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Upnp
    }

    fn gateway_ip(&self) -> Ipv4Addr {
        self.gateway_ip
    }

    async fn external_ip(&self) -> Result<IpAddr, NatError> {
        Ok(self.gateway.get_external_ip().await?)
    }

    async fn list_mappings(&self) -> Result<Vec<PortMapping>, NatError> {
        let mut mappings = Vec::new();
        for index in 0..MAX_LISTED_ENTRIES {
            let entry = match self.gateway.get_generic_port_mapping_entry(index).await {
                Ok(entry) => entry,
                Err(GetGenericPortMappingEntryError::SpecifiedArrayIndexInvalid) => break,
                Err(e) => return Err(e.into()),
            };
            let Ok(client) = entry.internal_client.parse::<Ipv4Addr>() else {
                tracing::debug!(
                    client = %entry.internal_client,
                    "skipping mapping with non-IPv4 client"
                );
                continue;
            };
            mappings.push(PortMapping {
                protocol: from_igd(entry.protocol),
                private: SocketAddrV4::new(client, entry.internal_port),
                public_port: entry.external_port,
                description: entry.port_mapping_description,
            });
        }
        Ok(mappings)
    }

    async fn add_mapping(
        &self,
        mapping: &PortMapping,
        lease: Duration,
    ) -> Result<(), NatError> {
        let lease_secs = u32::try_from(lease.as_secs()).unwrap_or(u32::MAX);
        self.gateway
            .add_port(
                to_igd(mapping.protocol),
                mapping.public_port,
                SocketAddr::V4(mapping.private),
                lease_secs,
                &mapping.description,
            )
            .await?;
        Ok(())
    }

    async fn remove_mapping(
        &self,
        protocol: TransportProtocol,
        public_port: u16,
    ) -> Result<(), NatError> {
        self.gateway.remove_port(to_igd(protocol), public_port).await?;
        Ok(())
    }
}
