//! Local NIC metadata used to enrich discovered hosts.

use async_trait::async_trait;
use netscope_core::types::NicRecord;
use pnet::datalink;
use pnet::ipnetwork::IpNetwork;

/// Source of interface metadata for the local machine.
///
/// Enrichment is optional: callers treat an error as "no metadata".
#[async_trait]
pub trait NicProvider: Send + Sync {
    async fn interfaces(&self) -> anyhow::Result<Vec<NicRecord>>;
}

/// Reads the interfaces the operating system reports.
///
/// MAC, address, and subnet mask are known; gateway, DHCP state, and
/// manufacturer are not exposed by the datalink layer and stay unset.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNicProvider;

#[async_trait]
impl NicProvider for SystemNicProvider {
    async fn interfaces(&self) -> anyhow::Result<Vec<NicRecord>> {
        let interfaces = tokio::task::spawn_blocking(datalink::interfaces).await?;

        let records: Vec<NicRecord> = interfaces
            .iter()
            .filter(|iface| !iface.is_loopback())
            .flat_map(|iface| {
                iface.ips.iter().filter_map(move |network| match network {
                    IpNetwork::V4(net) => Some(NicRecord {
                        ip: net.ip(),
                        mac: iface.mac.map(|m| m.to_string()),
                        manufacturer: None,
                        subnet_mask: Some(net.mask()),
                        gateway: None,
                        dhcp_enabled: false,
                        enabled: iface.is_up(),
                    }),
                    IpNetwork::V6(_) => None,
                })
            })
            .collect();

        tracing::debug!(
            interfaces = interfaces.len(),
            ipv4_records = records.len(),
            "Read local interface metadata"
        );
        Ok(records)
    }
}

/// Fixed records, typically from configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticNicProvider {
    records: Vec<NicRecord>,
}

impl StaticNicProvider {
    pub fn new(records: Vec<NicRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl NicProvider for StaticNicProvider {
    async fn interfaces(&self) -> anyhow::Result<Vec<NicRecord>> {
        Ok(self.records.clone())
    }
}
