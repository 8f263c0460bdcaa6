// SPDX-License-Identifier: MIT OR Apache-2.0
//! Service image pools and naming pools.
//!
//! All the data constants the generator draws from: available service
//! images per tier, department names, and company prefixes.

/// One selectable service image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceImage {
    /// Image reference.
    pub image: &'static str,
    /// Container ports the service listens on.
    pub ports: &'static [u16],
    /// Short technology name used in container names and labels.
    pub name: &'static str,
    /// Implementation language, for app servers.
    pub lang: Option<&'static str>,
    /// Storage classification, for databases.
    pub db_type: Option<&'static str>,
}

const fn image(
    image: &'static str,
    ports: &'static [u16],
    name: &'static str,
) -> ServiceImage {
    ServiceImage {
        image,
        ports,
        name,
        lang: None,
        db_type: None,
    }
}

const fn app(
    image_ref: &'static str,
    ports: &'static [u16],
    name: &'static str,
    lang: &'static str,
) -> ServiceImage {
    ServiceImage {
        image: image_ref,
        ports,
        name,
        lang: Some(lang),
        db_type: None,
    }
}

const fn db(
    image_ref: &'static str,
    ports: &'static [u16],
    name: &'static str,
    db_type: &'static str,
) -> ServiceImage {
    ServiceImage {
        image: image_ref,
        ports,
        name,
        lang: None,
        db_type: Some(db_type),
    }
}

/// Web server pool.
pub const WEB_SERVERS: &[ServiceImage] = &[
    image("nginx:alpine", &[80, 443], "nginx"),
    image("httpd:alpine", &[80, 443], "apache"),
    image("caddy:alpine", &[80, 443], "caddy"),
    image("traefik:v2.10", &[80, 8080], "traefik"),
];

/// Application server pool.
pub const APP_SERVERS: &[ServiceImage] = &[
    app("python:3.11-slim", &[5000], "flask", "python"),
    app("python:3.11-slim", &[8000], "django", "python"),
    app("node:20-slim", &[3000], "express", "node"),
    app("node:20-slim", &[3000], "nextjs", "node"),
    app("eclipse-temurin:17-jdk-alpine", &[8080], "springboot", "java"),
    app("eclipse-temurin:17-jdk-alpine", &[8080], "quarkus", "java"),
    app("mcr.microsoft.com/dotnet/aspnet:8.0", &[5000], "dotnet", "dotnet"),
    app("ruby:3.2-slim", &[3000], "rails", "ruby"),
    app("golang:1.21-alpine", &[8080], "goapi", "go"),
];

/// Database pool.
pub const DATABASES: &[ServiceImage] = &[
    db("postgres:16", &[5432], "postgresql", "relational"),
    db("postgres:15", &[5432], "postgresql15", "relational"),
    db("mysql:8", &[3306], "mysql", "relational"),
    db("mariadb:11", &[3306], "mariadb", "relational"),
    db("mongo:7", &[27017], "mongodb", "document"),
    db("mongo:6", &[27017], "mongodb6", "document"),
    db("redis:7-alpine", &[6379], "redis", "cache"),
    db("memcached:alpine", &[11211], "memcached", "cache"),
    db("elasticsearch:8.11.0", &[9200, 9300], "elasticsearch", "search"),
    db("cassandra:4", &[9042], "cassandra", "wide-column"),
    db("couchdb:3", &[5984], "couchdb", "document"),
];

/// Message queue pool.
pub const MESSAGE_QUEUES: &[ServiceImage] = &[
    image("rabbitmq:3-management", &[5672, 15672], "rabbitmq"),
    image("apache/kafka:3.6.0", &[9092], "kafka"),
    image("nats:alpine", &[4222, 8222], "nats"),
    image("eclipse-mosquitto:2", &[1883, 9001], "mqtt"),
];

/// Infrastructure pool.
pub const INFRASTRUCTURE: &[ServiceImage] = &[
    image("vault:1.15", &[8200], "vault"),
    image("consul:1.17", &[8500, 8600], "consul"),
    image("minio/minio:latest", &[9000, 9001], "minio"),
    image("registry:2", &[5000], "docker-registry"),
    image("grafana/grafana:latest", &[3000], "grafana"),
    image("prom/prometheus:latest", &[9090], "prometheus"),
];

/// Department names used in container naming.
pub const DEPARTMENT_NAMES: &[&str] = &[
    "erp",
    "crm",
    "hrms",
    "finance",
    "inventory",
    "analytics",
    "billing",
    "logistics",
    "procurement",
    "manufacturing",
    "warehouse",
    "ecommerce",
    "marketing",
    "support",
    "legacy",
];

/// Company prefixes for generated admin accounts.
pub const COMPANY_PREFIXES: &[&str] = &[
    "acme",
    "globex",
    "initech",
    "umbrella",
    "waynetech",
    "starkindustries",
    "oscorp",
    "lexcorp",
    "cyberdyne",
    "tyrell",
];
