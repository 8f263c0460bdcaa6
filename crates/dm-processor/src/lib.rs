// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified processor pipeline.
//!
//! Consumes discovered events from the mesh and mutates each payload
//! through an ordered chain of stages:
//!
//! 1. candidate identification: flag and validate database candidates
//! 2. connection extraction: masked connection strings for correlation
//! 3. enrichment: entity labels, environment, technology context
//! 4. PII redaction: sentinel-token replacement over the whole payload
//! 5. scoring: complexity, risk, effort, and overall on 1-10
//! 6. correlation: typed relationships against recently-seen entities
//!
//! Every stage is idempotent: re-running the pipeline on its own output
//! changes nothing, which makes at-least-once delivery harmless.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod candidate;
pub mod config;
pub mod correlation;
pub mod enrichment;
pub mod extraction;
pub mod pipeline;
pub mod redaction;
pub mod scoring;
pub mod service;

pub use pipeline::Processor;
