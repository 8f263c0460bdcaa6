// SPDX-License-Identifier: MIT OR Apache-2.0
//! TCP connect scanning and banner grabbing.

use async_trait::async_trait;
use dm_core::{DiscoveredRecord, EntityKind, entity_id};
use dm_error::MeshError;
use dm_scan::TargetAnalyzer;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Ports scanned by default: common web, infra, and database ports.
pub const DEFAULT_PORTS: &[u16] = &[
    22, 80, 443, 1433, 1521, 3306, 5432, 5672, 5984, 6379, 8080, 8443, 9042, 9092, 9200, 27017,
];

/// Well-known database ports with candidate types.
const DATABASE_PORTS: &[(u16, &str)] = &[
    (3306, "mysql"),
    (5432, "postgresql"),
    (27017, "mongodb"),
    (6379, "redis"),
    (1433, "mssql"),
    (1521, "oracle"),
    (5984, "couchdb"),
    (9042, "cassandra"),
    (9200, "elasticsearch"),
];

/// Well-known service names used as a first guess.
fn service_name(port: u16) -> &'static str {
    match port {
        22 => "ssh",
        80 | 8080 => "http",
        443 | 8443 => "https",
        1433 => "mssql",
        1521 => "oracle",
        3306 => "mysql",
        5432 => "postgres",
        5672 => "amqp",
        5984 => "couchdb",
        6379 => "redis",
        9042 => "cassandra",
        9092 => "kafka",
        9200 => "elasticsearch",
        27017 => "mongodb",
        _ => "unknown",
    }
}

/// One open port with its grabbed banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortFinding {
    /// The open port.
    pub port: u16,
    /// Whatever the service volunteered, trimmed.
    pub banner: Option<String>,
}

/// TCP connect scanner.
pub struct PortScanner {
    ports: Vec<u16>,
    connect_timeout: Duration,
    banner_timeout: Duration,
}

impl PortScanner {
    /// Scanner over a port list with the given timeouts.
    pub fn new(ports: Vec<u16>, connect_timeout: Duration, banner_timeout: Duration) -> Self {
        Self {
            ports,
            connect_timeout,
            banner_timeout,
        }
    }

    /// Scan one host, returning findings for every open port.
    pub async fn scan_host(&self, host: &str) -> Vec<PortFinding> {
        let mut findings = Vec::new();
        for &port in &self.ports {
            match tokio::time::timeout(
                self.connect_timeout,
                TcpStream::connect((host, port)),
            )
            .await
            {
                Ok(Ok(stream)) => {
                    let banner = self.grab_banner(stream).await;
                    debug!(host, port, banner = banner.as_deref(), "port open");
                    findings.push(PortFinding { port, banner });
                }
                _ => {}
            }
        }
        findings
    }

    /// Read whatever the service says first. Some protocols (SSH, Redis
    /// after a PING) speak first; HTTP needs a nudge.
    async fn grab_banner(&self, mut stream: TcpStream) -> Option<String> {
        let mut buffer = [0u8; 512];
        let read = tokio::time::timeout(self.banner_timeout, stream.read(&mut buffer)).await;
        let n = match read {
            Ok(Ok(n)) if n > 0 => n,
            _ => {
                // Nudge quiet services, then listen once more.
                let _ = stream.write_all(b"\r\n").await;
                match tokio::time::timeout(self.banner_timeout, stream.read(&mut buffer)).await {
                    Ok(Ok(n)) if n > 0 => n,
                    _ => return None,
                }
            }
        };
        let banner = String::from_utf8_lossy(&buffer[..n]).trim().to_string();
        if banner.is_empty() { None } else { Some(banner) }
    }
}

/// Attach database-candidate metadata for well-known ports.
pub fn candidate_metadata(port: u16) -> serde_json::Value {
    match DATABASE_PORTS.iter().find(|(p, _)| *p == port) {
        Some((_, db_type)) => json!({
            "database_candidate": true,
            "candidate_type": db_type,
            "candidate_confidence": 0.5,
            "candidate_reason": format!("Port {port} matches {db_type} default port"),
        }),
        None => json!({}),
    }
}

/// Scan-engine adapter producing `server` and `service` records.
pub struct HostAnalyzer {
    scanner: PortScanner,
}

impl HostAnalyzer {
    /// Wrap a configured scanner.
    pub fn new(scanner: PortScanner) -> Self {
        Self { scanner }
    }

    /// Build the records for one scanned host.
    pub fn records_for(&self, host: &str, findings: &[PortFinding]) -> Vec<DiscoveredRecord> {
        if findings.is_empty() {
            return Vec::new();
        }
        let server_id = entity_id(["server", host]);
        let open_ports: Vec<u16> = findings.iter().map(|f| f.port).collect();

        let mut records = vec![DiscoveredRecord::new(
            EntityKind::Server,
            json!({
                "server_id": server_id,
                "ip_addresses": [host],
                "open_ports": open_ports,
            }),
        )];

        for finding in findings {
            let service_id = entity_id(["service", host, &finding.port.to_string()]);
            let mut data = json!({
                "service_id": service_id,
                "server_id": server_id,
                "ip": host,
                "port": finding.port,
                "protocol": "tcp",
                "service": service_name(finding.port),
                "metadata": candidate_metadata(finding.port),
            });
            if let Some(banner) = &finding.banner {
                data["banner"] = json!(banner);
            }
            records.push(DiscoveredRecord::new(EntityKind::Service, data));
        }
        records
    }
}

#[async_trait]
impl TargetAnalyzer for HostAnalyzer {
    type Target = String;

    fn label(&self, target: &String) -> String {
        target.clone()
    }

    async fn analyze(&self, target: &String) -> Result<Vec<DiscoveredRecord>, MeshError> {
        let findings = self.scanner.scan_host(target).await;
        Ok(self.records_for(target, &findings))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
