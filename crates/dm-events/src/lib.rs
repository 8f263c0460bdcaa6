// SPDX-License-Identifier: MIT OR Apache-2.0
//! CloudEvent fabric for the Discovery Mesh.
//!
//! Every record that moves through the mesh travels inside a CloudEvents
//! 1.0 envelope, published on one of two durable topic exchanges:
//!
//! - `discovery.events`: collectors publish `discovered.<entity>` keys;
//!   the processor and transmitter consume.
//! - `processing.events`: the processor publishes `scored.<entity>` keys.
//!
//! The envelope's `subject` carries the `scan_id` whenever the event was
//! produced under a scan, which is how every downstream component ties a
//! record back to its originating job.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod consume;
mod envelope;
mod publish;
mod routing;

pub use consume::{ConsumerBinding, EventConsumer};
pub use envelope::{CloudEvent, EnvelopeError, SPEC_VERSION};
pub use publish::EventPublisher;
pub use routing::{
    APPROVED_PATTERN, DISCOVERY_EXCHANGE, ENRICHMENT_BINDINGS, PROCESSING_EXCHANGE,
    TRANSMITTER_QUEUE, discovered_key, discovered_type, scored_key, scored_type,
};
