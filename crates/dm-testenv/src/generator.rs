// SPDX-License-Identifier: MIT OR Apache-2.0
//! Seeded environment generation.
//!
//! For the same seed, two invocations yield byte-identical compose and
//! manifest documents except for the manifest's `generated_at` stamp:
//! the RNG is a seeded ChaCha8 stream and every emitted map is a
//! `BTreeMap`, so nothing depends on hash ordering or wall clock.

use crate::pools::{
    APP_SERVERS, COMPANY_PREFIXES, DATABASES, DEPARTMENT_NAMES, INFRASTRUCTURE, MESSAGE_QUEUES,
    ServiceImage, WEB_SERVERS,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

const SUBNET_PREFIX: &str = "172.28.0";
const GATEWAY: &str = "172.28.0.1";
const NETWORK_NAME: &str = "target-network";

// ---------------------------------------------------------------------------
// Output documents
// ---------------------------------------------------------------------------

/// One service entry of the compose document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeService {
    /// Image reference.
    pub image: String,
    /// Fixed container name.
    pub container_name: String,
    /// Network attachment with a static address.
    pub networks: BTreeMap<String, NetworkAttachment>,
    /// `host:container` port publications.
    pub ports: Vec<String>,
    /// Discovery labels.
    pub labels: BTreeMap<String, String>,
    /// Override command, when the image needs one to idle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Service environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

/// Static-address network attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    /// The assigned IPv4 address.
    pub ipv4_address: String,
}

/// The generated docker-compose document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeDoc {
    /// Compose format version.
    pub version: String,
    /// Generated services keyed by name.
    pub services: BTreeMap<String, ComposeService>,
    /// The target bridge network.
    pub networks: serde_yaml::Value,
}

/// One manifest row describing a generated service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestService {
    /// Container name.
    pub name: String,
    /// Static IP inside the target network.
    pub ip: String,
    /// Tier (`web-server`, `app-server`, `database`, ...).
    #[serde(rename = "type")]
    pub service_type: String,
    /// Technology name.
    pub technology: String,
    /// Published `host:container` port pairs.
    pub ports: Vec<String>,
}

/// The JSON manifest accompanying the compose document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Seed the environment was generated from.
    pub seed: u64,
    /// Generation timestamp (the only field that varies per run).
    pub generated_at: String,
    /// Generated services, in generation order.
    pub services: Vec<ManifestService>,
}

/// A generated environment: compose document plus manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedEnvironment {
    /// Seed used.
    pub seed: u64,
    /// Compose document.
    pub compose: ComposeDoc,
    /// Manifest document.
    pub manifest: Manifest,
}

impl GeneratedEnvironment {
    /// Render the compose document as YAML.
    pub fn compose_yaml(&self) -> String {
        serde_yaml::to_string(&self.compose).expect("compose document is always serialisable")
    }

    /// Render the manifest as pretty JSON.
    pub fn manifest_json(&self) -> String {
        serde_json::to_string_pretty(&self.manifest)
            .expect("manifest is always serialisable")
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

struct Allocator {
    rng: ChaCha8Rng,
    used_ips: HashSet<String>,
    used_ports: HashSet<u16>,
    port_offset: u16,
}

impl Allocator {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            used_ips: HashSet::from([GATEWAY.to_string()]),
            used_ports: HashSet::new(),
            port_offset: 0,
        }
    }

    fn ip(&mut self) -> String {
        loop {
            let last_octet: u8 = self.rng.gen_range(10..=250);
            let ip = format!("{SUBNET_PREFIX}.{last_octet}");
            if self.used_ips.insert(ip.clone()) {
                return ip;
            }
        }
    }

    fn host_port(&mut self, container_port: u16) -> u16 {
        loop {
            let candidate = container_port.saturating_add(self.port_offset);
            if self.used_ports.insert(candidate) {
                self.port_offset += 1;
                return candidate;
            }
            self.port_offset += 1;
        }
    }

    fn department(&mut self) -> &'static str {
        DEPARTMENT_NAMES
            .choose(&mut self.rng)
            .copied()
            .expect("department pool is non-empty")
    }

    fn password(&mut self) -> String {
        const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        (0..16)
            .map(|_| CHARS[self.rng.gen_range(0..CHARS.len())] as char)
            .collect()
    }
}

/// Generate an environment from an explicit seed.
pub fn generate(seed: u64, generated_at: impl Into<String>) -> GeneratedEnvironment {
    let mut alloc = Allocator::new(seed);
    let mut services = BTreeMap::new();
    let mut manifest_services = Vec::new();

    let num_web = alloc.rng.gen_range(1..=2usize);
    let num_app = alloc.rng.gen_range(1..=2usize);
    let num_db = alloc.rng.gen_range(1..=2usize);
    let num_queues = alloc.rng.gen_range(0..=1usize);
    let num_infra = alloc.rng.gen_range(0..=1usize);

    add_tier(&mut alloc, &mut services, &mut manifest_services, WEB_SERVERS, num_web, "web-server");
    add_tier(&mut alloc, &mut services, &mut manifest_services, APP_SERVERS, num_app, "app-server");
    add_tier(&mut alloc, &mut services, &mut manifest_services, DATABASES, num_db, "database");
    add_tier(&mut alloc, &mut services, &mut manifest_services, MESSAGE_QUEUES, num_queues, "message-queue");
    add_tier(&mut alloc, &mut services, &mut manifest_services, INFRASTRUCTURE, num_infra, "infrastructure");

    let networks = serde_yaml::to_value(BTreeMap::from([(
        NETWORK_NAME.to_string(),
        serde_yaml::to_value(BTreeMap::from([
            (
                "driver".to_string(),
                serde_yaml::Value::String("bridge".to_string()),
            ),
            (
                "ipam".to_string(),
                serde_yaml::to_value(BTreeMap::from([(
                    "config".to_string(),
                    vec![BTreeMap::from([
                        ("subnet".to_string(), format!("{SUBNET_PREFIX}.0/24")),
                        ("gateway".to_string(), GATEWAY.to_string()),
                    ])],
                )]))
                .expect("ipam map is serialisable"),
            ),
        ]))
        .expect("network map is serialisable"),
    )]))
    .expect("networks map is serialisable");

    GeneratedEnvironment {
        seed,
        compose: ComposeDoc {
            version: "3.8".to_string(),
            services,
            networks,
        },
        manifest: Manifest {
            seed,
            generated_at: generated_at.into(),
            services: manifest_services,
        },
    }
}

fn add_tier(
    alloc: &mut Allocator,
    services: &mut BTreeMap<String, ComposeService>,
    manifest: &mut Vec<ManifestService>,
    pool: &[ServiceImage],
    count: usize,
    tier: &str,
) {
    if count == 0 {
        return;
    }
    let selected: Vec<&ServiceImage> = pool
        .choose_multiple(&mut alloc.rng, count.min(pool.len()))
        .collect();

    for (i, img) in selected.into_iter().enumerate() {
        let dept = alloc.department();
        let name = format!("target-{dept}-{}-{:02}", img.name, i + 1);
        let ip = alloc.ip();

        let ports: Vec<String> = img
            .ports
            .iter()
            .map(|&p| format!("{}:{p}", alloc.host_port(p)))
            .collect();

        let mut labels = BTreeMap::from([
            ("discovery.type".to_string(), tier.to_string()),
            ("discovery.technology".to_string(), img.name.to_string()),
        ]);
        if let Some(lang) = img.lang {
            labels.insert("discovery.language".to_string(), lang.to_string());
        }
        if let Some(db_type) = img.db_type {
            labels.insert("discovery.db-type".to_string(), db_type.to_string());
        }

        let command = match tier {
            "app-server" => Some("tail -f /dev/null".to_string()),
            "infrastructure" if img.name == "minio" => {
                Some("server /data --console-address ':9001'".to_string())
            }
            _ => None,
        };

        let environment = service_environment(alloc, img, dept);

        services.insert(
            name.clone(),
            ComposeService {
                image: img.image.to_string(),
                container_name: name.clone(),
                networks: BTreeMap::from([(
                    NETWORK_NAME.to_string(),
                    NetworkAttachment { ipv4_address: ip.clone() },
                )]),
                ports: ports.clone(),
                labels,
                command,
                environment,
            },
        );
        manifest.push(ManifestService {
            name,
            ip,
            service_type: tier.to_string(),
            technology: img.name.to_string(),
            ports,
        });
    }
}

fn service_environment(
    alloc: &mut Allocator,
    img: &ServiceImage,
    dept: &str,
) -> BTreeMap<String, String> {
    let name = img.name;
    if name.starts_with("postgres") {
        let user = format!("{}_user", alloc.department());
        BTreeMap::from([
            ("POSTGRES_USER".to_string(), user),
            ("POSTGRES_PASSWORD".to_string(), alloc.password()),
            ("POSTGRES_DB".to_string(), format!("{dept}_db")),
        ])
    } else if name.starts_with("mysql") || name.starts_with("mariadb") {
        let user = format!("{}_user", alloc.department());
        BTreeMap::from([
            ("MYSQL_ROOT_PASSWORD".to_string(), alloc.password()),
            ("MYSQL_DATABASE".to_string(), format!("{dept}_db")),
            ("MYSQL_USER".to_string(), user),
            ("MYSQL_PASSWORD".to_string(), alloc.password()),
        ])
    } else if name.starts_with("mongodb") {
        let user = format!("{}_user", alloc.department());
        BTreeMap::from([
            ("MONGO_INITDB_ROOT_USERNAME".to_string(), user),
            ("MONGO_INITDB_ROOT_PASSWORD".to_string(), alloc.password()),
        ])
    } else if name == "elasticsearch" {
        BTreeMap::from([
            ("discovery.type".to_string(), "single-node".to_string()),
            ("xpack.security.enabled".to_string(), "false".to_string()),
            ("ES_JAVA_OPTS".to_string(), "-Xms256m -Xmx256m".to_string()),
        ])
    } else if name == "couchdb" {
        let user = format!("{}_user", alloc.department());
        BTreeMap::from([
            ("COUCHDB_USER".to_string(), user),
            ("COUCHDB_PASSWORD".to_string(), alloc.password()),
        ])
    } else if name == "minio" {
        let prefix = COMPANY_PREFIXES
            .choose(&mut alloc.rng)
            .expect("prefix pool is non-empty");
        BTreeMap::from([
            ("MINIO_ROOT_USER".to_string(), format!("{prefix}_admin")),
            ("MINIO_ROOT_PASSWORD".to_string(), alloc.password()),
        ])
    } else {
        BTreeMap::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_is_byte_identical_except_timestamp() {
        let a = generate(1234, "2024-01-01T00:00:00Z");
        let b = generate(1234, "2024-06-30T12:00:00Z");
        assert_eq!(a.compose_yaml(), b.compose_yaml());

        let mut manifest_a = a.manifest.clone();
        let mut manifest_b = b.manifest.clone();
        assert_ne!(manifest_a.generated_at, manifest_b.generated_at);
        manifest_a.generated_at.clear();
        manifest_b.generated_at.clear();
        assert_eq!(manifest_a, manifest_b);
    }

    #[test]
    fn different_seeds_differ() {
        let a = generate(1, "t");
        let b = generate(2, "t");
        assert_ne!(a.compose_yaml(), b.compose_yaml());
    }

    #[test]
    fn ips_are_disjoint_and_in_subnet() {
        let env = generate(42, "t");
        let mut seen = HashSet::new();
        for service in &env.manifest.services {
            assert!(service.ip.starts_with("172.28.0."), "ip {}", service.ip);
            assert_ne!(service.ip, GATEWAY);
            assert!(seen.insert(service.ip.clone()), "duplicate ip {}", service.ip);
        }
    }

    #[test]
    fn host_ports_are_disjoint() {
        let env = generate(42, "t");
        let mut seen = HashSet::new();
        for service in &env.manifest.services {
            for pair in &service.ports {
                let host = pair.split(':').next().unwrap();
                assert!(seen.insert(host.to_string()), "duplicate host port {host}");
            }
        }
    }

    #[test]
    fn counts_stay_within_ranges() {
        for seed in 0..20 {
            let env = generate(seed, "t");
            let count_of = |tier: &str| {
                env.manifest
                    .services
                    .iter()
                    .filter(|s| s.service_type == tier)
                    .count()
            };
            assert!((1..=2).contains(&count_of("web-server")));
            assert!((1..=2).contains(&count_of("app-server")));
            assert!((1..=2).contains(&count_of("database")));
            assert!(count_of("message-queue") <= 1);
            assert!(count_of("infrastructure") <= 1);
        }
    }

    #[test]
    fn names_follow_the_convention() {
        let env = generate(7, "t");
        for service in &env.manifest.services {
            assert!(service.name.starts_with("target-"), "name {}", service.name);
            let suffix = service.name.rsplit('-').next().unwrap();
            assert_eq!(suffix.len(), 2);
            assert!(suffix.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn compose_document_is_valid_yaml_with_network() {
        let env = generate(99, "t");
        let yaml = env.compose_yaml();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed["version"], serde_yaml::Value::String("3.8".into()));
        assert!(parsed["networks"]["target-network"]["ipam"]["config"][0]["subnet"]
            .as_str()
            .unwrap()
            .contains("172.28.0.0/24"));
    }

    #[test]
    fn app_servers_idle() {
        for seed in 0..10 {
            let env = generate(seed, "t");
            for (name, service) in &env.compose.services {
                if service.labels.get("discovery.type").map(String::as_str) == Some("app-server") {
                    assert_eq!(
                        service.command.as_deref(),
                        Some("tail -f /dev/null"),
                        "{name} should idle"
                    );
                }
            }
        }
    }
}
