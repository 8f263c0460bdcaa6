// SPDX-License-Identifier: MIT OR Apache-2.0
//! The SSH probe harness.
//!
//! SSH I/O is blocking (`ssh2`), so each probe runs on the blocking worker
//! pool via `spawn_blocking`, bridged back to the async runtime. A counting
//! semaphore bounds concurrent probes.
//!
//! Connect-phase failures are classified by error *type name* only:
//! upstream library messages can echo credential fragments and must never
//! reach logs or results.

use crate::credentials::ProbeCredentials;
use serde::{Deserialize, Serialize};
use ssh2::Session;
use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Result model
// ---------------------------------------------------------------------------

/// Operating-system descriptor assembled from probe commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatingSystem {
    /// Distribution name (`NAME` in os-release).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Distribution version (`VERSION_ID`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Distribution id (`ID`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,
    /// Kernel release (`uname -r`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    /// Machine architecture (`uname -m`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

/// Hardware descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hardware {
    /// CPU core count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<u32>,
    /// CPU model string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_model: Option<String>,
    /// Total memory in GiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<f64>,
    /// Root filesystem size in GiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_total_gb: Option<f64>,
    /// Root filesystem usage in GiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_used_gb: Option<f64>,
    /// Whether the host is virtualised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_virtual: Option<bool>,
    /// Hypervisor family when virtualised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtualization_type: Option<String>,
}

/// One installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Package manager that reported it (`apt`, `yum`).
    pub source: String,
}

/// One running service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningService {
    /// Service unit name without the `.service` suffix.
    pub name: String,
    /// Reported state; always `running`.
    pub status: String,
}

/// One network interface with an IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    /// Interface name.
    pub name: String,
    /// Assigned IPv4 address.
    pub ip_address: String,
}

/// Network configuration descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Interfaces with addresses.
    pub interfaces: Vec<NetworkInterface>,
    /// Default gateway, if found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_gateway: Option<String>,
    /// Configured DNS servers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_servers: Vec<String>,
}

/// Result of an infrastructure probe. Contains only system-derived
/// information, never credentials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Unique probe identifier.
    pub probe_id: String,
    /// The probed address.
    pub target_ip: String,
    /// Reference to an earlier network-scanner discovery, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// System hostname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// OS descriptor.
    pub operating_system: OperatingSystem,
    /// Hardware descriptor.
    pub hardware: Hardware,
    /// Installed packages (bounded).
    pub installed_software: Vec<InstalledPackage>,
    /// Running services (bounded).
    pub running_services: Vec<RunningService>,
    /// Network configuration.
    pub network_config: NetworkConfig,
    /// Whether the probe reached the target and collected data.
    pub success: bool,
    /// Classified failure, when unsuccessful. Never contains credential
    /// material; connect-phase errors are reduced to their type name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

const PACKAGE_LIMIT: usize = 100;
const SERVICE_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// SshProbe
// ---------------------------------------------------------------------------

/// SSH probe executor with bounded concurrency.
pub struct SshProbe {
    connect_timeout: Duration,
    command_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl SshProbe {
    /// Create a probe executor.
    pub fn new(connect_timeout: Duration, command_timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            connect_timeout,
            command_timeout,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Execute a probe. The credentials are consumed and scrubbed on every
    /// exit path, including failures.
    pub async fn probe(
        &self,
        target_ip: String,
        port: u16,
        credentials: ProbeCredentials,
        server_id: Option<String>,
    ) -> ProbeResult {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("probe semaphore is never closed");

        let probe_id = Uuid::new_v4().to_string();
        info!(
            probe_id = %probe_id,
            target = %format!("{target_ip}:{port}"),
            user = %credentials.username,
            "probe starting"
        );

        let connect_timeout = self.connect_timeout;
        let command_timeout = self.command_timeout;
        let task_probe_id = probe_id.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut creds = credentials;
            let result = blocking_probe(
                &task_probe_id,
                &target_ip,
                port,
                &creds,
                server_id,
                connect_timeout,
                command_timeout,
            );
            // Scrub before the result crosses back to the async side. The
            // Drop impl would repeat this, but the explicit call keeps the
            // invariant visible at the call site.
            creds.clear();
            result
        })
        .await;

        match outcome {
            Ok(result) => {
                if result.success {
                    info!(probe_id = %result.probe_id, "probe completed");
                } else {
                    warn!(
                        probe_id = %result.probe_id,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "probe failed"
                    );
                }
                result
            }
            Err(join_err) => {
                // Worker panicked; credentials were scrubbed by Drop.
                warn!(probe_id = %probe_id, "probe task aborted");
                let _ = join_err;
                ProbeResult {
                    probe_id,
                    success: false,
                    error: Some("Probe aborted: JoinError".to_string()),
                    ..Default::default()
                }
            }
        }
    }
}

/// Last path segment of a value's type name.
fn type_name_of<E>(_err: &E) -> &'static str {
    let full = std::any::type_name::<E>();
    full.rsplit("::").next().unwrap_or(full)
}

fn blocking_probe(
    probe_id: &str,
    target_ip: &str,
    port: u16,
    creds: &ProbeCredentials,
    server_id: Option<String>,
    connect_timeout: Duration,
    command_timeout: Duration,
) -> ProbeResult {
    let mut result = ProbeResult {
        probe_id: probe_id.to_string(),
        target_ip: target_ip.to_string(),
        server_id,
        ..Default::default()
    };

    let addr: SocketAddr = match resolve(target_ip, port) {
        Ok(addr) => addr,
        Err(kind) => {
            result.error = Some(format!("Connection failed: {kind}"));
            return result;
        }
    };

    let tcp = match TcpStream::connect_timeout(&addr, connect_timeout) {
        Ok(tcp) => tcp,
        Err(e) => {
            result.error = Some(format!("Connection failed: {}", type_name_of(&e)));
            return result;
        }
    };

    let mut session = match Session::new() {
        Ok(s) => s,
        Err(e) => {
            result.error = Some(format!("Connection failed: {}", type_name_of(&e)));
            return result;
        }
    };
    session.set_tcp_stream(tcp);
    session.set_timeout(command_timeout.as_millis() as u32);

    if let Err(e) = session.handshake() {
        result.error = Some(format!("Connection failed: {}", type_name_of(&e)));
        return result;
    }

    let auth = if let Some(key) = creds.private_key() {
        session.userauth_pubkey_memory(&creds.username, None, key, creds.passphrase())
    } else if let Some(password) = creds.password() {
        session.userauth_password(&creds.username, password)
    } else {
        result.error = Some("Authentication failed: NoCredentials".to_string());
        return result;
    };
    if let Err(e) = auth {
        result.error = Some(format!("Authentication failed: {}", type_name_of(&e)));
        return result;
    }

    // Command failures past this point are non-fatal; fields stay empty.
    result.hostname = run_command(&session, "hostname").map(|out| out.trim().to_string());
    result.operating_system = collect_os(&session);
    result.hardware = collect_hardware(&session);
    result.installed_software = collect_packages(&session);
    result.running_services = collect_services(&session);
    result.network_config = collect_network(&session);
    result.success = true;

    result
}

fn resolve(target_ip: &str, port: u16) -> Result<SocketAddr, &'static str> {
    match (target_ip, port).to_socket_addrs() {
        Ok(mut addrs) => addrs.next().ok_or("AddrResolution"),
        Err(_) => Err("AddrResolution"),
    }
}

/// Run a command, returning stdout when it exits zero.
fn run_command(session: &Session, command: &str) -> Option<String> {
    let mut channel = session.channel_session().ok()?;
    channel.exec(command).ok()?;
    let mut stdout = String::new();
    channel.read_to_string(&mut stdout).ok()?;
    channel.wait_close().ok()?;
    let code = channel.exit_status().ok()?;
    if code == 0 { Some(stdout) } else { None }
}

fn collect_os(session: &Session) -> OperatingSystem {
    let mut os = OperatingSystem::default();

    if let Some(release) = run_command(
        session,
        "cat /etc/os-release 2>/dev/null || cat /etc/redhat-release 2>/dev/null",
    ) {
        for line in release.lines() {
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim_matches('"').to_string();
                match key {
                    "NAME" => os.name = Some(value),
                    "VERSION_ID" => os.version = Some(value),
                    "ID" => os.distribution = Some(value),
                    _ => {}
                }
            }
        }
    }
    os.kernel = run_command(session, "uname -r").map(|o| o.trim().to_string());
    os.architecture = run_command(session, "uname -m").map(|o| o.trim().to_string());
    os
}

fn collect_hardware(session: &Session) -> Hardware {
    let mut hw = Hardware::default();

    if let Some(out) = run_command(session, "nproc 2>/dev/null || grep -c processor /proc/cpuinfo")
    {
        hw.cpu_cores = out.trim().parse().ok();
    }
    if let Some(out) = run_command(
        session,
        "grep 'model name' /proc/cpuinfo | head -1 | cut -d: -f2",
    ) {
        let model = out.trim().to_string();
        if !model.is_empty() {
            hw.cpu_model = Some(model);
        }
    }
    if let Some(out) = run_command(session, "free -g | grep Mem | awk '{print $2}'") {
        hw.memory_gb = out.trim().parse().ok();
    }
    if let Some(out) = run_command(session, "df -BG / | tail -1 | awk '{print $2, $3}'") {
        let parts: Vec<&str> = out.split_whitespace().collect();
        if parts.len() >= 2 {
            hw.disk_total_gb = parts[0].trim_end_matches('G').parse().ok();
            hw.disk_used_gb = parts[1].trim_end_matches('G').parse().ok();
        }
    }
    if let Some(out) = run_command(
        session,
        "systemd-detect-virt 2>/dev/null || cat /sys/class/dmi/id/product_name 2>/dev/null",
    ) {
        let virt = out.trim().to_lowercase();
        if !virt.is_empty() {
            if virt == "none" {
                hw.is_virtual = Some(false);
                hw.virtualization_type = Some("none".to_string());
            } else {
                hw.is_virtual = Some(true);
                hw.virtualization_type = Some(classify_virt(&virt).to_string());
            }
        }
    }
    hw
}

fn classify_virt(virt: &str) -> &'static str {
    if virt.contains("vmware") {
        "vmware"
    } else if virt.contains("kvm") {
        "kvm"
    } else if virt.contains("hyperv") || virt.contains("hyper-v") {
        "hyperv"
    } else if virt.contains("xen") {
        "xen"
    } else if virt.contains("docker") {
        "docker"
    } else if virt.contains("lxc") {
        "lxc"
    } else {
        "unknown"
    }
}

fn collect_packages(session: &Session) -> Vec<InstalledPackage> {
    // Debian first, then RHEL.
    for (command, source) in [
        (
            "dpkg-query -W -f='${Package}|${Version}\\n' 2>/dev/null | head -100",
            "apt",
        ),
        (
            "rpm -qa --queryformat '%{NAME}|%{VERSION}\\n' 2>/dev/null | head -100",
            "yum",
        ),
    ] {
        if let Some(out) = run_command(session, command) {
            let packages: Vec<InstalledPackage> = out
                .lines()
                .take(PACKAGE_LIMIT)
                .filter_map(|line| {
                    let (name, version) = line.split_once('|')?;
                    Some(InstalledPackage {
                        name: name.to_string(),
                        version: version.to_string(),
                        source: source.to_string(),
                    })
                })
                .collect();
            if !packages.is_empty() {
                return packages;
            }
        }
    }
    Vec::new()
}

fn collect_services(session: &Session) -> Vec<RunningService> {
    if let Some(out) = run_command(
        session,
        "systemctl list-units --type=service --state=running --no-pager --plain 2>/dev/null | head -50",
    ) {
        let services: Vec<RunningService> = out
            .lines()
            .take(SERVICE_LIMIT)
            .filter_map(|line| {
                let unit = line.split_whitespace().next()?;
                let name = unit.strip_suffix(".service")?;
                Some(RunningService {
                    name: name.to_string(),
                    status: "running".to_string(),
                })
            })
            .collect();
        if !services.is_empty() {
            return services;
        }
    }
    Vec::new()
}

fn collect_network(session: &Session) -> NetworkConfig {
    let mut net = NetworkConfig::default();

    if let Some(out) = run_command(session, "ip -o addr show 2>/dev/null || ifconfig -a") {
        for line in out.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // `ip -o addr` format: "<idx>: <iface> inet <addr>/<prefix> ..."
            if fields.len() >= 4 && fields[2] == "inet" {
                let ip = fields[3].split('/').next().unwrap_or(fields[3]);
                net.interfaces.push(NetworkInterface {
                    name: fields[1].to_string(),
                    ip_address: ip.to_string(),
                });
            }
        }
    }
    if let Some(out) = run_command(session, "ip route | grep default | awk '{print $3}'") {
        let gw = out.trim().to_string();
        if !gw.is_empty() {
            net.default_gateway = Some(gw);
        }
    }
    if let Some(out) = run_command(
        session,
        "cat /etc/resolv.conf | grep nameserver | awk '{print $2}'",
    ) {
        net.dns_servers = out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
    }
    net
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_target_classifies_by_type_name() {
        let probe = SshProbe::new(Duration::from_millis(200), Duration::from_secs(1), 2);
        let creds = ProbeCredentials::with_password("admin", "hunter2");
        let result = probe
            .probe("127.0.0.1".to_string(), 1, creds, None)
            .await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.starts_with("Connection failed:"), "got {error}");
        // The classified error never carries the password.
        assert!(!error.contains("hunter2"));
    }

    #[tokio::test]
    async fn result_serialization_has_no_credential_fields() {
        let probe = SshProbe::new(Duration::from_millis(200), Duration::from_secs(1), 2);
        let creds = ProbeCredentials::with_password("admin", "sup3rsecret");
        let result = probe
            .probe("127.0.0.1".to_string(), 1, creds, Some("srv-1".into()))
            .await;

        let rendered = serde_json::to_string(&result).unwrap();
        assert!(!rendered.contains("sup3rsecret"));
        assert!(!rendered.contains("password"));
        assert!(rendered.contains("srv-1"));
    }

    #[tokio::test]
    async fn missing_credentials_fail_fast() {
        // Reaching auth requires a live SSH server, so drive the blocking
        // core directly for the no-credentials branch.
        let creds = ProbeCredentials::new("admin", None, None, None);
        let result = blocking_probe(
            "p-1",
            "127.0.0.1",
            1,
            &creds,
            None,
            Duration::from_millis(100),
            Duration::from_secs(1),
        );
        assert!(!result.success);
    }

    #[tokio::test]
    async fn semaphore_bounds_concurrency() {
        let probe = Arc::new(SshProbe::new(
            Duration::from_millis(100),
            Duration::from_secs(1),
            2,
        ));
        let mut handles = Vec::new();
        for i in 0..5 {
            let p = probe.clone();
            handles.push(tokio::spawn(async move {
                let creds = ProbeCredentials::with_password("u", "p");
                p.probe(format!("127.0.0.{}", i + 1), 1, creds, None).await
            }));
        }
        for h in handles {
            let result = h.await.unwrap();
            assert!(!result.success);
        }
    }

    #[test]
    fn virt_classification() {
        assert_eq!(classify_virt("vmware"), "vmware");
        assert_eq!(classify_virt("microsoft hyper-v"), "hyperv");
        assert_eq!(classify_virt("qemu"), "unknown");
    }

    #[test]
    fn probe_result_defaults_are_empty() {
        let r = ProbeResult::default();
        assert!(!r.success);
        assert!(r.installed_software.is_empty());
        assert!(r.network_config.interfaces.is_empty());
    }
}
