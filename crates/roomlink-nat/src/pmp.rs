//! NAT-PMP gateway control via the `natpmp` crate.
//!
//! NAT-PMP has no way to enumerate the gateway's table, so the gateway
//! object remembers the mappings it created and reports only those.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use natpmp::{new_tokio_natpmp, NatpmpAsync, Protocol, Response};
use roomlink_protocol::TransportProtocol;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::gateway::{GatewayKind, GatewayProvider, NatGateway, PortMapping};
use crate::NatError;

/// Reply wait for a single NAT-PMP request after discovery.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Finds a NAT-PMP gateway at the default route.
#[derive(Debug, Default, Clone, Copy)]
pub struct NatPmpProvider;

#[async_trait]
impl GatewayProvider for NatPmpProvider {
    fn kind(&self) -> GatewayKind {
        GatewayKind::NatPmp
    }

    async fn discover(
        &self,
        timeout: Duration,
    ) -> Result<Box<dyn NatGateway>, NatError> {
        let gateway_ip = default_gateway()?;
        let mut client = new_tokio_natpmp()
            .await
            .map_err(|e| NatError::Discovery(e.to_string()))?;

        // A public-address round trip proves the gateway speaks NAT-PMP.
        let external_ip = tokio::time::timeout(timeout, public_address(&mut client))
            .await
            .map_err(|_| NatError::Timeout("NAT-PMP discovery"))??;
        tracing::debug!(%gateway_ip, %external_ip, "NAT-PMP gateway found");

        Ok(Box::new(NatPmpGateway {
            client: Mutex::new(client),
            gateway_ip,
            created: std::sync::Mutex::new(Vec::new()),
        }))
    }
}

fn default_gateway() -> Result<Ipv4Addr, NatError> {
    netdev::get_default_gateway()
        .ok()
        .and_then(|gateway| gateway.ipv4.first().copied())
        .ok_or_else(|| NatError::Discovery("no default IPv4 gateway".into()))
}

async fn public_address(
    client: &mut NatpmpAsync<UdpSocket>,
) -> Result<Ipv4Addr, NatError> {
    client
        .send_public_address_request()
        .await
        .map_err(|e| NatError::Discovery(e.to_string()))?;
    match client
        .read_response_or_retry()
        .await
        .map_err(|e| NatError::Discovery(e.to_string()))?
    {
        Response::Gateway(reply) => Ok(*reply.public_address()),
        other => Err(NatError::Discovery(format!(
            "expected public address response, got {other:?}"
        ))),
    }
}

struct NatPmpGateway {
    /// Requests and responses share one socket; one exchange at a time.
    client: Mutex<NatpmpAsync<UdpSocket>>,
    gateway_ip: Ipv4Addr,
    created: std::sync::Mutex<Vec<PortMapping>>,
}

impl NatPmpGateway {
    async fn request_mapping(
        &self,
        protocol: TransportProtocol,
        private_port: u16,
        public_port: u16,
        lifetime: u32,
    ) -> Result<u16, NatError> {
        let client = self.client.lock().await;
        let protocol = match protocol {
            TransportProtocol::Tcp => Protocol::TCP,
            TransportProtocol::Udp => Protocol::UDP,
        };
        client
            .send_port_mapping_request(protocol, private_port, public_port, lifetime)
            .await
            .map_err(|e| NatError::Mapping(e.to_string()))?;

        let response =
            tokio::time::timeout(RESPONSE_TIMEOUT, client.read_response_or_retry())
                .await
                .map_err(|_| NatError::Timeout("NAT-PMP mapping"))?
                .map_err(|e| NatError::Mapping(e.to_string()))?;
        match response {
            Response::TCP(reply) | Response::UDP(reply) => Ok(reply.public_port()),
            Response::Gateway(_) => Err(NatError::Mapping(
                "expected mapping response, got public address".into(),
            )),
        }
    }

    fn created(&self) -> std::sync::MutexGuard<'_, Vec<PortMapping>> {
        self.created
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl NatGateway for NatPmpGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::NatPmp
    }

    fn gateway_ip(&self) -> Ipv4Addr {
        self.gateway_ip
    }

    async fn external_ip(&self) -> Result<IpAddr, NatError> {
        let mut client = self.client.lock().await;
        let ip = tokio::time::timeout(RESPONSE_TIMEOUT, public_address(&mut client))
            .await
            .map_err(|_| NatError::Timeout("NAT-PMP public address"))??;
        Ok(IpAddr::V4(ip))
    }

    async fn list_mappings(&self) -> Result<Vec<PortMapping>, NatError> {
        Ok(self.created().clone())
    }

    async fn add_mapping(
        &self,
        mapping: &PortMapping,
        lease: Duration,
    ) -> Result<(), NatError> {
        // NAT-PMP has no infinite lease; a zero lifetime would delete.
        let lifetime = match lease.as_secs() {
            0 => u32::MAX,
            secs => u32::try_from(secs).unwrap_or(u32::MAX),
        };
        let granted = self
            .request_mapping(
                mapping.protocol,
                mapping.private.port(),
                mapping.public_port,
                lifetime,
            )
            .await?;
        if granted != mapping.public_port {
            // Release the port the gateway picked instead.
            if let Err(e) = self
                .request_mapping(mapping.protocol, mapping.private.port(), granted, 0)
                .await
            {
                tracing::warn!(
                    protocol = %mapping.protocol,
                    public_port = granted,
                    error = %e,
                    "failed to release substituted mapping"
                );
            }
            return Err(NatError::Mapping(format!(
                "gateway assigned public port {granted} instead of {}",
                mapping.public_port
            )));
        }
        self.created().push(mapping.clone());
        Ok(())
    }

    async fn remove_mapping(
        &self,
        protocol: TransportProtocol,
        public_port: u16,
    ) -> Result<(), NatError> {
        let private_port = self
            .created()
            .iter()
            .find(|m| m.protocol == protocol && m.public_port == public_port)
            .map(|m| m.private.port())
            .ok_or_else(|| {
                NatError::Mapping(format!(
                    "no NAT-PMP mapping for {protocol} port {public_port}"
                ))
            })?;

        self.request_mapping(protocol, private_port, 0, 0).await?;
        self.created()
            .retain(|m| !(m.protocol == protocol && m.public_port == public_port));
        Ok(())
    }
}
