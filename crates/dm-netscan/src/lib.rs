// SPDX-License-Identifier: MIT OR Apache-2.0
//! Network scanner collector.
//!
//! Probes target endpoints with TCP connect scans, grabs banners where
//! the service volunteers one, and publishes `server` and `service`
//! records. Services on well-known database ports are flagged as
//! database candidates at confidence 0.5 ("port only"); the processor
//! raises that to 0.85 when the banner confirms the type.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod scanner;
pub mod service;
pub mod targets;
