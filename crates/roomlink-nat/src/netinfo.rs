//! Host network inspection backed by the operating system.

use std::net::{Ipv4Addr, SocketAddr, TcpListener, UdpSocket};

use roomlink_protocol::TransportProtocol;

use crate::gateway::{LocalNetwork, NetworkInfo};

/// Reads interfaces through `netdev` and probes ports by binding them.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNetworkInfo;

impl NetworkInfo for SystemNetworkInfo {
    fn local_networks(&self) -> Vec<LocalNetwork> {
        netdev::get_interfaces()
            .into_iter()
            .flat_map(|iface| iface.ipv4)
            .filter(|net| !net.addr().is_loopback())
            .map(|net| LocalNetwork::new(net.addr(), net.prefix_len()))
            .collect()
    }

    fn is_port_in_use(&self, protocol: TransportProtocol, port: u16) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        match protocol {
            TransportProtocol::Tcp => TcpListener::bind(addr).is_err(),
            TransportProtocol::Udp => UdpSocket::bind(addr).is_err(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_udp_port_is_in_use() {
        let held = UdpSocket::bind("0.0.0.0:0").expect("should bind");
        let port = held.local_addr().expect("addr").port();
        assert!(SystemNetworkInfo.is_port_in_use(TransportProtocol::Udp, port));
    }

    #[test]
    fn test_released_port_is_free() {
        let port = {
            let held = UdpSocket::bind("0.0.0.0:0").expect("should bind");
            held.local_addr().expect("addr").port()
        };
        assert!(!SystemNetworkInfo.is_port_in_use(TransportProtocol::Udp, port));
    }

    #[test]
    fn test_local_networks_exclude_loopback() {
        let networks = SystemNetworkInfo.local_networks();
        assert!(networks.iter().all(|n| !n.address.is_loopback()));
    }
}
