use std::net::Ipv4Addr;

use roomlink_protocol::TransportProtocol;

/// Errors from gateway discovery and port mapping.
///
/// All of these are recoverable: the caller may retry, pick other ports, or
/// fall back to manual configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NatError {
    /// The operation needs a prior call to `discover_gateway`.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// Discovery ran but no UPnP or NAT-PMP gateway answered.
    #[error("no NAT gateway available")]
    NoGateway,

    /// Not exactly one local IPv4 network contains the gateway address.
    #[error("cannot determine host address for gateway {gateway}: {matches} matching local networks")]
    AmbiguousHost { gateway: Ipv4Addr, matches: usize },

    /// Every candidate port is already taken on the gateway.
    #[error("no available {protocol} port among the candidates")]
    NoAvailablePort { protocol: TransportProtocol },

    /// Talking to the gateway during discovery failed.
    #[error("gateway discovery failed: {0}")]
    Discovery(String),

    /// The gateway refused or failed a mapping operation.
    #[error("port mapping failed: {0}")]
    Mapping(String),

    /// The gateway did not answer in time.
    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl From<igd_next::SearchError> for NatError {
    fn from(error: igd_next::SearchError) -> Self {
        Self::Discovery(error.to_string())
    }
}

impl From<igd_next::GetExternalIpError> for NatError {
    fn from(error: igd_next::GetExternalIpError) -> Self {
        Self::Mapping(error.to_string())
    }
}

impl From<igd_next::AddPortError> for NatError {
    fn from(error: igd_next::AddPortError) -> Self {
        Self::Mapping(error.to_string())
    }
}

impl From<igd_next::RemovePortError> for NatError {
    fn from(error: igd_next::RemovePortError) -> Self {
        Self::Mapping(error.to_string())
    }
}

impl From<igd_next::GetGenericPortMappingEntryError> for NatError {
    fn from(error: igd_next::GetGenericPortMappingEntryError) -> Self {
        Self::Mapping(error.to_string())
    }
}
