// SPDX-License-Identifier: MIT OR Apache-2.0
//! Seeded test-environment generator.
//!
//! Emits a randomized docker-compose document plus a JSON manifest so
//! collectors can be exercised against an environment nobody coded for.
//! Given the same seed the output is reproducible byte-for-byte (the
//! manifest's `generated_at` stamp aside).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod generator;
pub mod pools;

pub use generator::{ComposeDoc, GeneratedEnvironment, Manifest, ManifestService, generate};
