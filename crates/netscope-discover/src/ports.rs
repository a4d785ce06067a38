//! Port scan: which configured TCP ports accept connections on each live
//! host.
//!
//! Hosts are gated by a semaphore. Within a host every port is probed at
//! once unless a per-host bound is configured. Permits are taken before
//! tasks are spawned.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use netscope_core::events::{EventSink, ScanEvent};
use netscope_core::types::{Host, HostId};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{DiscoverError, Result};
use crate::notify::publish;
use crate::ping::{admit, collect};
use crate::retry::{retry_probe, RetryPolicy};
use crate::transport::ProbeTransport;

/// Parameters of a port scan.
#[derive(Debug, Clone)]
pub struct PortSettings {
    pub ports: Vec<u16>,
    pub timeout: Duration,
    pub max_concurrent_hosts: usize,
    pub max_concurrent_ports_per_host: Option<usize>,
    pub retry: RetryPolicy,
}

/// Probe `settings.ports` on every host and record the open ones.
///
/// Each open port is published as [`ScanEvent::PortDiscovered`] as soon as
/// it is found. A host with nothing open comes back with an empty set.
pub async fn port_scan<T, S>(
    transport: Arc<T>,
    sink: Arc<S>,
    hosts: Vec<Host>,
    settings: &PortSettings,
    cancel: &CancellationToken,
) -> Result<Vec<Host>>
where
    T: ProbeTransport + 'static,
    S: EventSink + 'static,
{
    let gate = Arc::new(Semaphore::new(settings.max_concurrent_hosts));
    let settings = Arc::new(settings.clone());
    let host_count = hosts.len();
    let mut tasks = JoinSet::new();

    tracing::info!(
        hosts = host_count,
        ports = settings.ports.len(),
        max_concurrent_hosts = settings.max_concurrent_hosts,
        "Starting port scan"
    );

    let mut interrupted = false;
    for host in hosts {
        let Some(permit) = admit(&gate, cancel, host.ip).await? else {
            interrupted = true;
            break;
        };
        let transport = Arc::clone(&transport);
        let sink = Arc::clone(&sink);
        let settings = Arc::clone(&settings);
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let _permit = permit;
            scan_host(transport, sink, host, settings, cancel).await.map(Some)
        });
    }

    let mut scanned = collect(&mut tasks).await?;
    if interrupted {
        return Err(DiscoverError::Cancelled);
    }
    scanned.sort_by_key(|h| h.ip);

    let ports_found: usize = scanned.iter().map(|h| h.open_ports.len()).sum();
    tracing::info!(hosts = host_count, ports_found, "Port scan complete");

    Ok(scanned)
}

/// Probe every port of one host. With a per-host bound, a port task is only
/// spawned once it holds a permit, so a full sweep keeps at most `bound`
/// port tasks alive.
async fn scan_host<T, S>(
    transport: Arc<T>,
    sink: Arc<S>,
    mut host: Host,
    settings: Arc<PortSettings>,
    cancel: CancellationToken,
) -> Result<Host>
where
    T: ProbeTransport + 'static,
    S: EventSink + 'static,
{
    let port_gate = settings
        .max_concurrent_ports_per_host
        .map(|n| Arc::new(Semaphore::new(n)));
    let mut tasks = JoinSet::new();
    let mut interrupted = false;

    for &port in &settings.ports {
        let permit = match &port_gate {
            Some(gate) => match admit(gate, &cancel, format!("{}:{port}", host.ip)).await? {
                Some(permit) => Some(permit),
                None => {
                    interrupted = true;
                    break;
                }
            },
            None => None,
        };
        let transport = Arc::clone(&transport);
        let sink = Arc::clone(&sink);
        let settings = Arc::clone(&settings);
        let cancel = cancel.clone();
        let (host_id, ip) = (host.id, host.ip);

        tasks.spawn(async move {
            let _permit = permit;
            probe_port(transport.as_ref(), sink.as_ref(), host_id, ip, port, &settings, &cancel)
                .await
        });
    }

    let open = collect(&mut tasks).await?;
    if interrupted {
        return Err(DiscoverError::Cancelled);
    }
    host.open_ports.extend(open);
    host.last_seen = Utc::now();

    tracing::debug!(ip = %host.ip, open_ports = ?host.open_ports, "Host port scan complete");

    Ok(host)
}

async fn probe_port<T, S>(
    transport: &T,
    sink: &S,
    host_id: HostId,
    ip: Ipv4Addr,
    port: u16,
    settings: &PortSettings,
    cancel: &CancellationToken,
) -> Result<Option<u16>>
where
    T: ProbeTransport,
    S: EventSink,
{
    let outcome = retry_probe(&settings.retry, cancel, format!("{ip}:{port}"), |_| {
        transport.probe_port(ip, port, settings.timeout)
    })
    .await?;

    if outcome.is_none() {
        return Ok(None);
    }

    tracing::debug!(ip = %ip, port, "Port open");
    publish(sink, ScanEvent::PortDiscovered { host_id, port });
    Ok(Some(port))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use netscope_core::events::ChannelSink;

    use super::*;
    use crate::transport::testing::ScriptedTransport;

    fn settings(ports: &[u16], hosts: usize, per_host: Option<usize>) -> PortSettings {
        PortSettings {
            ports: ports.to_vec(),
            timeout: Duration::from_millis(2000),
            max_concurrent_hosts: hosts,
            max_concurrent_ports_per_host: per_host,
            retry: RetryPolicy::port(),
        }
    }

    fn live(ip: Ipv4Addr) -> Host {
        Host::discovered(ip, Host::placeholder_hostname(ip), 1.0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_ports_recorded_and_published() {
        let a = Ipv4Addr::new(192, 168, 1, 10);
        let b = Ipv4Addr::new(192, 168, 1, 20);
        let transport = Arc::new(
            ScriptedTransport::new(Duration::from_millis(3))
                .with_host(a, 1, &[22, 443])
                .with_host(b, 1, &[]),
        );
        let (sink, mut rx) = ChannelSink::channel();
        let hosts = vec![live(b), live(a)];
        let a_id = hosts[1].id;

        let scanned = port_scan(
            transport,
            Arc::new(sink),
            hosts,
            &settings(&[22, 80, 443], 10, None),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(scanned[0].ip, a);
        assert_eq!(scanned[0].open_ports.iter().copied().collect::<Vec<_>>(), vec![22, 443]);
        // Nothing answering is an empty set, not an error.
        assert_eq!(scanned[1].ip, b);
        assert!(scanned[1].open_ports.is_empty());

        let mut published = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ScanEvent::PortDiscovered { host_id, port } = event {
                assert_eq!(host_id, a_id);
                published.push(port);
            }
        }
        published.sort_unstable();
        assert_eq!(published, vec![22, 443]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_gate_bounds_in_flight_probes() {
        let mut transport = ScriptedTransport::new(Duration::from_millis(10));
        let mut hosts = Vec::new();
        for i in 1..=6 {
            let ip = Ipv4Addr::new(10, 0, 0, i);
            transport = transport.with_host(ip, 1, &[]);
            hosts.push(live(ip));
        }
        let transport = Arc::new(transport);

        port_scan(
            Arc::clone(&transport),
            Arc::new(netscope_core::events::NullSink),
            hosts,
            &settings(&[21, 22, 23], 2, None),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        // 2 hosts at a time, all 3 ports of each at once.
        assert_eq!(transport.max_in_flight(), 6);
        assert_eq!(transport.port_probes.load(Ordering::SeqCst), 18);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_host_bound_is_honoured() {
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let transport =
            Arc::new(ScriptedTransport::new(Duration::from_millis(10)).with_host(ip, 1, &[80]));

        let scanned = port_scan(
            Arc::clone(&transport),
            Arc::new(netscope_core::events::NullSink),
            vec![live(ip)],
            &settings(&[20, 21, 22, 23, 80, 443, 8080, 8443], 10, Some(3)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(transport.max_in_flight(), 3);
        assert!(scanned[0].open_ports.contains(&80));
    }

    #[tokio::test(start_paused = true)]
    async fn test_filtered_ports_retried_once() {
        // Unscripted host: every port times out.
        let transport = Arc::new(ScriptedTransport::new(Duration::from_millis(1)));

        let scanned = port_scan(
            Arc::clone(&transport),
            Arc::new(netscope_core::events::NullSink),
            vec![live(Ipv4Addr::new(10, 9, 9, 9))],
            &settings(&[22, 80], 10, None),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(scanned[0].open_ports.is_empty());
        assert_eq!(transport.port_probes.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locally_denied_port_is_closed() {
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let mut transport =
            ScriptedTransport::new(Duration::from_millis(1)).with_host(ip, 1, &[22]);
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        transport
            .port_errors
            .insert((ip, 25), crate::transport::classify_io_error(&denied));

        let scanned = port_scan(
            Arc::new(transport),
            Arc::new(netscope_core::events::NullSink),
            vec![live(ip)],
            &settings(&[22, 25, 80], 10, None),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(scanned[0].open_ports.iter().copied().collect::<Vec<_>>(), vec![22]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_sweep_keeps_task_count_bounded() {
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let transport =
            Arc::new(ScriptedTransport::new(Duration::from_millis(50)).with_host(ip, 1, &[22]));
        let ports: Vec<u16> = (1..=u16::MAX).collect();

        let scan = tokio::spawn({
            let transport = Arc::clone(&transport);
            async move {
                port_scan(
                    transport,
                    Arc::new(netscope_core::events::NullSink),
                    vec![live(ip)],
                    &settings(&ports, 10, Some(64)),
                    &CancellationToken::new(),
                )
                .await
            }
        });

        tokio::time::sleep(Duration::from_millis(120)).await;
        let alive = tokio::runtime::Handle::current().metrics().num_alive_tasks();
        // 64 port tasks, the host task and the scan itself.
        assert!(alive <= 64 + 2, "{alive} tasks alive");

        let scanned = scan.await.unwrap().unwrap();
        assert_eq!(transport.max_in_flight(), 64);
        assert_eq!(transport.port_probes.load(Ordering::SeqCst), 65535);
        assert!(scanned[0].open_ports.contains(&22));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_port_scan_reports_cancellation() {
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let transport =
            Arc::new(ScriptedTransport::new(Duration::from_millis(5)).with_host(ip, 1, &[22]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = port_scan(
            transport,
            Arc::new(netscope_core::events::NullSink),
            vec![live(ip)],
            &settings(&[22, 80], 1, Some(1)),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DiscoverError::Cancelled));
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_fail_scan() {
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let transport =
            Arc::new(ScriptedTransport::new(Duration::from_millis(1)).with_host(ip, 1, &[22]));
        let (sink, rx) = ChannelSink::channel();
        drop(rx);

        let scanned = port_scan(
            transport,
            Arc::new(sink),
            vec![live(ip)],
            &settings(&[22], 1, None),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(scanned[0].open_ports.contains(&22));
    }
}
