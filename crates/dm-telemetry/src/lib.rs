// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured logging bootstrap and lightweight service metrics.
//!
//! Every mesh service calls [`init_tracing`] once at startup and shares a
//! [`ServiceMetrics`] handle across its tasks. The metrics snapshot backs
//! each service's `GET /metrics` endpoint.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing bootstrap
// ---------------------------------------------------------------------------

/// Initialise the global tracing subscriber for a service.
///
/// `level` is a default directive (`"info"`, `"debug"`, ...); the `RUST_LOG`
/// environment variable overrides it when set. Safe to call once per
/// process; a second call is ignored.
pub fn init_tracing(service: &str, level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={level},dm={level}", service.replace('-', "_"))));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

// ---------------------------------------------------------------------------
// ServiceMetrics
// ---------------------------------------------------------------------------

/// Thread-safe counters shared across a service's tasks.
///
/// Cloning is cheap; all clones update the same underlying counters.
#[derive(Debug, Clone, Default)]
pub struct ServiceMetrics {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    events_published: AtomicU64,
    events_consumed: AtomicU64,
    events_failed: AtomicU64,
    scans_started: AtomicU64,
    scans_completed: AtomicU64,
    http_requests: AtomicU64,
}

/// Point-in-time snapshot of a [`ServiceMetrics`] handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Events published to the mesh.
    pub events_published: u64,
    /// Events consumed from the mesh.
    pub events_consumed: u64,
    /// Events whose processing failed.
    pub events_failed: u64,
    /// Scans accepted.
    pub scans_started: u64,
    /// Scans that reached a terminal status.
    pub scans_completed: u64,
    /// HTTP requests served.
    pub http_requests: u64,
}

impl ServiceMetrics {
    /// Create a fresh metrics handle with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one published event.
    pub fn incr_published(&self) {
        self.inner.events_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one consumed event.
    pub fn incr_consumed(&self) {
        self.inner.events_consumed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one failed event.
    pub fn incr_failed(&self) {
        self.inner.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one accepted scan.
    pub fn incr_scans_started(&self) {
        self.inner.scans_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one terminal scan.
    pub fn incr_scans_completed(&self) {
        self.inner.scans_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one served HTTP request.
    pub fn incr_http_requests(&self) {
        self.inner.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_published: self.inner.events_published.load(Ordering::Relaxed),
            events_consumed: self.inner.events_consumed.load(Ordering::Relaxed),
            events_failed: self.inner.events_failed.load(Ordering::Relaxed),
            scans_started: self.inner.scans_started.load(Ordering::Relaxed),
            scans_completed: self.inner.scans_completed.load(Ordering::Relaxed),
            http_requests: self.inner.http_requests.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Flatten into an ordered name → value map for the `/metrics` body.
    pub fn as_map(&self) -> BTreeMap<String, u64> {
        BTreeMap::from([
            ("events_consumed".into(), self.events_consumed),
            ("events_failed".into(), self.events_failed),
            ("events_published".into(), self.events_published),
            ("http_requests".into(), self.http_requests),
            ("scans_completed".into(), self.scans_completed),
            ("scans_started".into(), self.scans_started),
        ])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
