// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dry-run orchestrator.
//!
//! Spins up labelled workload containers against a shared Docker network
//! so collectors can be exercised end-to-end, then reliably tears them
//! down. Sessions are identified by a restricted `session_id` that is
//! safe to embed in Docker object names; every container a session owns
//! carries the `dryrun.session_id` label, so cleanup is a label query
//! rather than a bookkeeping exercise.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod models;
pub mod runtime;
pub mod service;

pub use models::SessionId;
pub use runtime::{ContainerRuntime, ContainerSpec, DockerRuntime};
