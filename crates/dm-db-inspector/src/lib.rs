// SPDX-License-Identifier: MIT OR Apache-2.0
//! Database inspector collector.
//!
//! Performs deep inspection of reachable database instances: server
//! version, database list, per-schema table counts, and foreign-key
//! relationships. Credentials arrive wrapped in an opaque secret type,
//! so string-converting a request can never reveal a password, and
//! connector failures are classified without echoing upstream messages
//! that might contain credential fragments.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod connectors;
pub mod service;

pub use connectors::{DatabaseConnector, InspectTarget, connector_for};
