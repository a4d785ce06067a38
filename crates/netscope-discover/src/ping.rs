//! Ping sweep: liveness and latency for every address in a range.
//!
//! A semaphore bounds how many probes are in flight. Permits are taken
//! before a probe task is spawned, so the number of live tasks never
//! exceeds the gate.

use std::fmt::Display;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use netscope_core::types::Host;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{DiscoverError, Result};
use crate::retry::{retry_probe, RetryPolicy};
use crate::transport::ProbeTransport;

/// Parameters of a ping sweep.
#[derive(Debug, Clone)]
pub struct PingSettings {
    pub timeout: Duration,
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

/// Probe every address and return the hosts that answered, sorted by
/// address. Silent addresses are simply absent.
pub async fn ping_sweep<T>(
    transport: Arc<T>,
    addresses: &[Ipv4Addr],
    settings: &PingSettings,
    cancel: &CancellationToken,
) -> Result<Vec<Host>>
where
    T: ProbeTransport + 'static,
{
    let gate = Arc::new(Semaphore::new(settings.max_concurrent));
    let mut tasks = JoinSet::new();
    let mut interrupted = false;

    tracing::info!(
        addresses = addresses.len(),
        max_concurrent = settings.max_concurrent,
        timeout_ms = settings.timeout.as_millis() as u64,
        "Starting ping sweep"
    );

    for &ip in addresses {
        let Some(permit) = admit(&gate, cancel, ip).await? else {
            interrupted = true;
            break;
        };
        let transport = Arc::clone(&transport);
        let cancel = cancel.clone();
        let settings = settings.clone();

        tasks.spawn(async move { probe_address(transport, permit, ip, &settings, &cancel).await });
    }

    let mut hosts = collect(&mut tasks).await?;
    if interrupted {
        return Err(DiscoverError::Cancelled);
    }
    hosts.sort_by_key(|h| h.ip);

    tracing::info!(
        addresses = addresses.len(),
        hosts_up = hosts.len(),
        "Ping sweep complete"
    );

    Ok(hosts)
}

async fn probe_address<T>(
    transport: Arc<T>,
    permit: OwnedSemaphorePermit,
    ip: Ipv4Addr,
    settings: &PingSettings,
    cancel: &CancellationToken,
) -> Result<Option<Host>>
where
    T: ProbeTransport,
{
    let rtt = retry_probe(&settings.retry, cancel, ip, |_| {
        transport.probe_host(ip, settings.timeout)
    })
    .await?;
    // The gate bounds liveness probes only.
    drop(permit);

    let Some(rtt) = rtt else {
        return Ok(None);
    };

    let hostname = transport
        .reverse_lookup(ip)
        .await
        .unwrap_or_else(|| Host::placeholder_hostname(ip));
    let latency_ms = rtt.as_micros() as f64 / 1000.0;

    tracing::debug!(ip = %ip, hostname = %hostname, latency_ms, "Host is up");

    Ok(Some(Host::discovered(ip, hostname, latency_ms)))
}

/// Wait for a permit from `gate`. `None` means `cancel` fired first.
pub(crate) async fn admit<D: Display>(
    gate: &Arc<Semaphore>,
    cancel: &CancellationToken,
    target: D,
) -> Result<Option<OwnedSemaphorePermit>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        permit = Arc::clone(gate).acquire_owned() => permit
            .map(Some)
            .map_err(|_| DiscoverError::Probe {
                target: target.to_string(),
                reason: "admission gate closed".into(),
            }),
    }
}

/// Drain a set of probe tasks into their results.
///
/// Cancellation lets already-dispatched tasks finish before it is reported.
/// Any other failure returns at once, aborting the remaining tasks.
pub(crate) async fn collect<R>(tasks: &mut JoinSet<Result<Option<R>>>) -> Result<Vec<R>>
where
    R: Send + 'static,
{
    let mut results = Vec::with_capacity(tasks.len());
    let mut cancelled = false;

    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(DiscoverError::Cancelled) => cancelled = true,
            Err(e) => {
                tasks.abort_all();
                return Err(e);
            }
        }
    }

    if cancelled {
        return Err(DiscoverError::Cancelled);
    }
    Ok(results)
}
