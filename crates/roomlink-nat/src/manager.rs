//! Gateway discovery and candidate-based port mapping.
//!
//! The gateway's mapping table is shared with every other host (and every
//! other process) behind the same router and nobody locks it. The manager
//! therefore re-reads the table on every candidate selection instead of
//! caching what it saw last time, and accepts that another host may win a
//! race for the same port.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use roomlink_protocol::TransportProtocol;

use crate::gateway::{GatewayKind, GatewayProvider, NatGateway, NetworkInfo, PortMapping};
use crate::netinfo::SystemNetworkInfo;
use crate::pmp::NatPmpProvider;
use crate::upnp::UpnpProvider;
use crate::NatError;

/// Defaults applied to mappings the manager creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatConfig {
    /// Description stored with each mapping on the gateway.
    pub description: String,
    /// Requested lease; zero means "until removed".
    pub lease: Duration,
}

impl Default for NatConfig {
    fn default() -> Self {
        Self {
            description: "roomlink".into(),
            lease: Duration::ZERO,
        }
    }
}

/// A mapping this manager created, with the gateway it lives on.
struct OwnedMapping {
    gateway: Arc<dyn NatGateway>,
    mapping: PortMapping,
}

/// Discovers a NAT gateway and manages this process's port mappings.
///
/// Mappings created here are tracked until [`release_all`] removes them.
/// Call it explicitly before shutdown; dropping the manager with live
/// mappings only attempts a best-effort release in the background.
///
/// [`release_all`]: NatTraversalManager::release_all
pub struct NatTraversalManager {
    providers: Vec<Box<dyn GatewayProvider>>,
    network: Arc<dyn NetworkInfo>,
    config: NatConfig,
    discovered: bool,
    gateway: Option<Arc<dyn NatGateway>>,
    owned: Vec<OwnedMapping>,
}

impl NatTraversalManager {
    /// Creates a manager with explicit collaborators. Providers are tried
    /// in order during discovery.
    pub fn new(
        providers: Vec<Box<dyn GatewayProvider>>,
        network: Arc<dyn NetworkInfo>,
        config: NatConfig,
    ) -> Self {
        Self {
            providers,
            network,
            config,
            discovered: false,
            gateway: None,
            owned: Vec::new(),
        }
    }

    /// UPnP first, then NAT-PMP, with the system's network information.
    pub fn with_defaults(config: NatConfig) -> Self {
        Self::new(
            vec![Box::new(UpnpProvider), Box::new(NatPmpProvider)],
            Arc::new(SystemNetworkInfo),
            config,
        )
    }

    pub fn config(&self) -> &NatConfig {
        &self.config
    }

    /// Returns `true` once discovery has run, whatever its outcome.
    pub fn is_discovered(&self) -> bool {
        self.discovered
    }

    /// Returns `true` if the last discovery found a gateway.
    pub fn is_available(&self) -> bool {
        self.gateway.is_some()
    }

    pub fn gateway_kind(&self) -> Option<GatewayKind> {
        self.gateway.as_ref().map(|g| g.kind())
    }

    /// Number of mappings created and not yet released.
    pub fn owned_mapping_count(&self) -> usize {
        self.owned.len()
    }

    /// Runs discovery, replacing any previously found gateway.
    ///
    /// Each provider gets up to `timeout`. Returns whether a gateway was
    /// found. Mappings already created stay tracked against the gateway
    /// they were made on.
    pub async fn discover_gateway(&mut self, timeout: Duration) -> bool {
        self.gateway = None;
        for provider in &self.providers {
            let kind = provider.kind();
            match tokio::time::timeout(timeout, provider.discover(timeout)).await {
                Ok(Ok(gateway)) => {
                    tracing::info!(
                        %kind,
                        gateway_ip = %gateway.gateway_ip(),
                        "NAT gateway discovered"
                    );
                    self.gateway = Some(Arc::from(gateway));
                    break;
                }
                Ok(Err(e)) => tracing::debug!(%kind, error = %e, "gateway discovery failed"),
                Err(_) => tracing::debug!(%kind, "gateway discovery timed out"),
            }
        }
        self.discovered = true;
        if self.gateway.is_none() {
            tracing::info!("no NAT gateway found");
        }
        self.gateway.is_some()
    }

    /// Runs discovery only if it has never run. Returns availability.
    pub async fn ensure_discovered(&mut self, timeout: Duration) -> bool {
        if !self.discovered {
            self.discover_gateway(timeout).await;
        }
        self.is_available()
    }

    /// Whether `port` is already held by something on this host.
    pub fn is_port_in_use(&self, protocol: TransportProtocol, port: u16) -> bool {
        self.network.is_port_in_use(protocol, port)
    }

    fn gateway(&self) -> Result<Arc<dyn NatGateway>, NatError> {
        if !self.discovered {
            return Err(NatError::InvalidOperation(
                "gateway discovery has not run",
            ));
        }
        self.gateway.clone().ok_or(NatError::NoGateway)
    }

    /// Reads the gateway's current mapping table.
    pub async fn list_mappings(&self) -> Result<Vec<PortMapping>, NatError> {
        self.gateway()?.list_mappings().await
    }

    /// The address of this host on the gateway's network.
    ///
    /// Exactly one local network must contain the gateway address.
    pub fn host_address(&self, gateway_ip: Ipv4Addr) -> Result<Ipv4Addr, NatError> {
        let matches: Vec<Ipv4Addr> = self
            .network
            .local_networks()
            .into_iter()
            .filter(|net| net.contains(gateway_ip))
            .map(|net| net.address)
            .collect();
        match matches.as_slice() {
            [single] => Ok(*single),
            _ => Err(NatError::AmbiguousHost {
                gateway: gateway_ip,
                matches: matches.len(),
            }),
        }
    }

    /// Maps `public_port` on the gateway to `private_port` on this host.
    pub async fn create_mapping(
        &mut self,
        protocol: TransportProtocol,
        private_port: u16,
        public_port: u16,
        description: Option<&str>,
    ) -> Result<PortMapping, NatError> {
        let gateway = self.gateway()?;
        let host = self.host_address(gateway.gateway_ip())?;
        let mapping = PortMapping {
            protocol,
            private: SocketAddrV4::new(host, private_port),
            public_port,
            description: description.unwrap_or(&self.config.description).to_owned(),
        };
        self.add(gateway, mapping).await
    }

    /// Finds or creates a mapping between one of `private_candidates` and
    /// one of `public_candidates`.
    ///
    /// An existing mapping for this host that already pairs two candidates
    /// is reused as-is. Otherwise the first public port nobody has mapped
    /// and the first private port this host has not mapped are paired.
    pub async fn create_mapping_from_candidates(
        &mut self,
        protocol: TransportProtocol,
        private_candidates: &[u16],
        public_candidates: &[u16],
    ) -> Result<PortMapping, NatError> {
        let gateway = self.gateway()?;
        let host = self.host_address(gateway.gateway_ip())?;

        let table = gateway.list_mappings().await?;
        let same_protocol: Vec<&PortMapping> =
            table.iter().filter(|m| m.protocol == protocol).collect();
        let ours = |m: &PortMapping| *m.private.ip() == host;

        if let Some(existing) = same_protocol.iter().find(|m| {
            ours(m)
                && private_candidates.contains(&m.private.port())
                && public_candidates.contains(&m.public_port)
        }) {
            tracing::info!(mapping = %existing, "reusing existing port mapping");
            return Ok((*existing).clone());
        }

        let public_port = public_candidates
            .iter()
            .copied()
            .find(|port| !same_protocol.iter().any(|m| m.public_port == *port))
            .ok_or(NatError::NoAvailablePort { protocol })?;
        let private_port = private_candidates
            .iter()
            .copied()
            .find(|port| {
                !same_protocol
                    .iter()
                    .any(|m| ours(m) && m.private.port() == *port)
            })
            .ok_or(NatError::NoAvailablePort { protocol })?;

        let mapping = PortMapping {
            protocol,
            private: SocketAddrV4::new(host, private_port),
            public_port,
            description: self.config.description.clone(),
        };
        self.add(gateway, mapping).await
    }

    async fn add(
        &mut self,
        gateway: Arc<dyn NatGateway>,
        mapping: PortMapping,
    ) -> Result<PortMapping, NatError> {
        gateway.add_mapping(&mapping, self.config.lease).await?;
        tracing::info!(%mapping, kind = %gateway.kind(), "port mapping created");
        self.owned.push(OwnedMapping {
            gateway,
            mapping: mapping.clone(),
        });
        Ok(mapping)
    }

    /// Removes every mapping this manager created. Returns how many were
    /// removed; failures are logged and forgotten.
    pub async fn release_all(&mut self) -> usize {
        let owned = std::mem::take(&mut self.owned);
        if owned.is_empty() {
            return 0;
        }
        let removals = owned.into_iter().map(|owned| async move {
            let result = owned
                .gateway
                .remove_mapping(owned.mapping.protocol, owned.mapping.public_port)
                .await;
            (owned.mapping, result)
        });

        let mut released = 0;
        for (mapping, result) in futures_util::future::join_all(removals).await {
            match result {
                Ok(()) => {
                    tracing::info!(%mapping, "port mapping released");
                    released += 1;
                }
                Err(e) => {
                    tracing::warn!(%mapping, error = %e, "failed to release port mapping");
                }
            }
        }
        released
    }
}

impl Drop for NatTraversalManager {
    fn drop(&mut self) {
        if self.owned.is_empty() {
            return;
        }
        let owned = std::mem::take(&mut self.owned);
        tracing::warn!(
            count = owned.len(),
            "NAT manager dropped with live port mappings; call release_all before shutdown"
        );
        // Drop is synchronous, so the removal runs as a detached task.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn(async move {
            for owned in owned {
                let _ = owned
                    .gateway
                    .remove_mapping(owned.mapping.protocol, owned.mapping.public_port)
                    .await;
            }
        });
    }
}
