//! Heuristic anomaly rules over enriched hosts.
//!
//! Rules are independent: a host can trip several of them and receives one
//! anomaly per rule.

use chrono::Utc;
use netscope_core::config::AnomalyRules;
use netscope_core::types::{Anomaly, AnomalyCategory, Host, Severity};
use uuid::Uuid;

/// Apply every rule to every host.
pub fn detect_anomalies(hosts: &[Host], rules: &AnomalyRules) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    for host in hosts {
        anomalies.extend(unusual_port_pattern(host, rules));
        anomalies.extend(suspicious_services(host, rules));
    }

    tracing::debug!(
        hosts = hosts.len(),
        anomalies = anomalies.len(),
        "Anomaly rules applied"
    );
    anomalies
}

fn unusual_port_pattern(host: &Host, rules: &AnomalyRules) -> Option<Anomaly> {
    let count = host.open_ports.len();
    if count <= rules.port_count_threshold {
        return None;
    }
    Some(anomaly(
        host,
        AnomalyCategory::UnusualPortPattern,
        Severity::Medium,
        format!(
            "{} exposes {count} open ports (threshold {})",
            host.ip, rules.port_count_threshold
        ),
        "Review the services running on this host and close the ones that are not needed",
    ))
}

fn suspicious_services(host: &Host, rules: &AnomalyRules) -> Option<Anomaly> {
    let exposed: Vec<String> = rules
        .suspicious_ports
        .iter()
        .filter(|&p| host.open_ports.contains(p))
        .map(u16::to_string)
        .collect();
    if exposed.is_empty() {
        return None;
    }
    Some(anomaly(
        host,
        AnomalyCategory::SuspiciousService,
        Severity::High,
        format!(
            "{} exposes commonly attacked services on ports {}",
            host.ip,
            exposed.join(", ")
        ),
        "Restrict these ports with a firewall or disable the services",
    ))
}

fn anomaly(
    host: &Host,
    category: AnomalyCategory,
    severity: Severity,
    description: String,
    recommended_action: &str,
) -> Anomaly {
    Anomaly {
        id: Uuid::new_v4(),
        host_id: host.id,
        category,
        severity,
        description,
        recommended_action: recommended_action.to_string(),
        resolved: false,
        detected_at: Utc::now(),
    }
}
