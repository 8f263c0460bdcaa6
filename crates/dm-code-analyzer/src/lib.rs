// SPDX-License-Identifier: MIT OR Apache-2.0
//! Code analyzer collector.
//!
//! Enumerates repository directories under the configured scan paths and,
//! per repository, detects languages, frameworks, and dependencies,
//! computes codebase metrics, and checks runtime end-of-life status. Each
//! analysed repository publishes `repository`, `codebase`, and
//! per-dependency `dependency` events.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod analyzer;
pub mod analyzers;
pub mod config;
pub mod service;
