// SPDX-License-Identifier: MIT OR Apache-2.0
//! Opaque secret wrapper for request payloads.
//!
//! Wraps credentials carried on API requests so that formatting or
//! serialising the surrounding struct can never reveal the value. The only
//! way out is the explicit [`Secret::expose`] accessor. `Serialize` is
//! deliberately not implemented.

use serde::{Deserialize, Deserializer};
use std::fmt;

/// A value whose `Debug`/`Display` output is always `***`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    /// Wrap a secret value.
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Explicitly expose the inner value.
    pub fn expose(&self) -> &T {
        &self.0
    }

    /// Consume the wrapper, yielding the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Secret<T> {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        T::deserialize(de).map(Secret)
    }
}

impl<T> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_redact() {
        let s = Secret::new("hunter2".to_string());
        assert_eq!(format!("{s:?}"), "Secret(***)");
        assert_eq!(format!("{s}"), "***");
    }

    #[test]
    fn expose_returns_value() {
        let s = Secret::new("hunter2".to_string());
        assert_eq!(s.expose(), "hunter2");
        assert_eq!(s.into_inner(), "hunter2");
    }

    #[test]
    fn deserializes_from_plain_value() {
        #[derive(Deserialize)]
        struct Req {
            password: Secret<String>,
        }
        let req: Req = serde_json::from_str(r#"{"password": "pg_pass"}"#).unwrap();
        assert_eq!(req.password.expose(), "pg_pass");
    }

    #[test]
    fn struct_debug_does_not_leak() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Req {
            username: String,
            password: Secret<String>,
        }
        let req: Req = serde_json::from_str(r#"{"username": "u", "password": "pg_pass"}"#).unwrap();
        let rendered = format!("{req:?}");
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("pg_pass"));
    }
}
