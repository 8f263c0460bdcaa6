// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-repository analyzers.

pub mod dependencies;
pub mod frameworks;
pub mod language;
pub mod metrics;
