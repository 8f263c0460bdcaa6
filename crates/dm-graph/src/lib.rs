// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph-oriented output encoding for scored discovery events.
//!
//! When the transmitter is configured for graph output, each scored event
//! becomes a node payload (label from the enrichment stage, pruned
//! properties, upper-snake-cased relationship types) plus a set of typed,
//! confidence-tagged claims for downstream decision tooling.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod claims;
mod mapper;

pub use claims::{Claim, ClaimBuilder, ClaimType, confidence};
pub use mapper::{GraphMapper, GraphNode, GraphRelationship};
