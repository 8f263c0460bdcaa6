// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared domain model for the Discovery Mesh.
//!
//! The mesh moves *discovered items* (records emitted by collectors about
//! entities observed in a customer environment) through enrichment,
//! scoring, and egress. This crate holds the vocabulary every service
//! agrees on: entity kinds, deterministic entity identifiers, typed
//! relationships, and the end-of-life support table consulted by the code
//! analyzer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod eol;
mod secret;

pub use entity::{
    DiscoveredRecord, EntityKind, Relationship, RelationshipType, dedup_relationships, entity_id,
};
pub use eol::{EolError, EolRecord, EolStatus, EolTable, SupportStatus, normalize_version};
pub use secret::Secret;
