// SPDX-License-Identifier: MIT OR Apache-2.0
//! SSH-based infrastructure probe.
//!
//! Collects system information from live servers over SSH. Credentials are
//! short-lived in-memory objects with a guaranteed scrub: every exit path
//! of a probe (success, connect failure, auth failure, panic unwind)
//! overwrites the secret bytes before they are released, and no formatting
//! path can render them.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod probe;
pub mod service;

pub use credentials::ProbeCredentials;
pub use probe::{ProbeResult, SshProbe};
