// SPDX-License-Identifier: MIT OR Apache-2.0
//! The transmitter: batching egress to the external analytics destination.
//!
//! Approved events accumulate in an in-memory FIFO; a background task
//! flushes them as gzipped batches over HTTPS. Every batch's lifecycle is
//! recorded in a relational ledger (`pending → sending → success|failed`),
//! transient failures retry with exponential backoff, and a per-client
//! circuit breaker sheds load once the destination stops accepting.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod breaker;
pub mod client;
pub mod config;
pub mod encode;
pub mod ledger;
pub mod service;

pub use batch::BatchProcessor;
pub use breaker::CircuitBreaker;
pub use client::{EgressClient, SendOutcome};
pub use ledger::{BatchLedger, LedgerStats, PgLedger};
