//! NAT traversal for Roomlink room hosts.
//!
//! A host behind a home router is unreachable from the internet unless the
//! router forwards a port to it. [`NatTraversalManager`] discovers a UPnP
//! or NAT-PMP gateway and negotiates those forwards:
//!
//! - **Discovery** tries each [`GatewayProvider`] in turn.
//! - **Candidate mapping** picks a free public/private port pair against
//!   the live gateway table, reusing a matching mapping when one exists.
//! - **Release** removes exactly the mappings this manager created.
//!
//! The gateway and host-network collaborators are traits
//! ([`NatGateway`], [`NetworkInfo`]) so they can be replaced in tests.

mod error;
mod gateway;
mod manager;
mod netinfo;
mod pmp;
mod upnp;

pub use error::NatError;
pub use gateway::{
    GatewayKind, GatewayProvider, LocalNetwork, NatGateway, NetworkInfo,
    PortMapping,
};
pub use manager::{NatConfig, NatTraversalManager};
pub use netinfo::SystemNetworkInfo;
pub use pmp::NatPmpProvider;
pub use upnp::UpnpProvider;
