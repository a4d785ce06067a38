//! Edge inference between hosts sharing a subnet.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use netscope_core::types::{ConnectionType, Edge, Host};

/// Connect every pair of hosts inside each subnet.
///
/// Hosts are grouped by `(ip & mask, mask)`. A group of k hosts yields
/// k·(k−1)/2 edges pointing from the lower address to the higher one.
/// Hosts without a subnet mask yield no edges.
pub fn build_subnet_edges(hosts: &[Host]) -> Vec<Edge> {
    let mut groups: BTreeMap<(Ipv4Addr, Ipv4Addr), Vec<&Host>> = BTreeMap::new();
    for host in hosts {
        if let Some(mask) = host.subnet_mask {
            let network = Ipv4Addr::from(u32::from(host.ip) & u32::from(mask));
            groups.entry((network, mask)).or_default().push(host);
        }
    }

    let mut edges = Vec::new();
    for ((network, mask), mut members) in groups {
        members.sort_by_key(|h| h.ip);

        let label = format!("subnet {network}/{}", u32::from(mask).count_ones());
        for (i, from) in members.iter().enumerate() {
            for to in &members[i + 1..] {
                edges.push(Edge {
                    from: from.id,
                    to: to.id,
                    connection_type: ConnectionType::Subnet,
                    label: label.clone(),
                });
            }
        }
    }

    tracing::debug!(hosts = hosts.len(), edges = edges.len(), "Built subnet edges");
    edges
}
