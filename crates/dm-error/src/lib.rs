// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for the Discovery Mesh.
//!
//! Every mesh error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, and arbitrary key-value context.
//! The taxonomy drives retry policy: [`ErrorCode::is_transient`] decides
//! whether an operation is eligible for backoff-and-retry, and
//! [`ErrorCode::http_status`] maps a code onto the HTTP surface.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or out-of-range input; never retried.
    Validation,
    /// Transient transport failures (broker, HTTP egress, callbacks).
    Transport,
    /// Failures in paths that hold credentials; logged by type only.
    Credential,
    /// Scans where some targets failed and others succeeded.
    Partial,
    /// Unrecoverable startup problems; abort the process.
    Startup,
    /// Event-mesh envelope / routing problems.
    Envelope,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::Credential => "credential",
            Self::Partial => "partial",
            Self::Startup => "startup",
            Self::Envelope => "envelope",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Validation --
    /// A request field failed validation (bad session id, unknown db type).
    ValidationFailed,
    /// A required request field is missing.
    MissingField,
    /// The payload could not be parsed as JSON.
    InvalidJson,

    // -- Transport --
    /// The remote endpoint answered with a 5xx status.
    UpstreamUnavailable,
    /// The request did not complete within its timeout.
    TransportTimeout,
    /// The broker connection dropped or a publish was refused.
    BrokerDisconnected,
    /// The circuit breaker is open; the call was not attempted.
    CircuitOpen,

    // -- Credential --
    /// SSH or database authentication failed. Message bodies from the
    /// underlying library are never propagated.
    AuthFailed,
    /// A connect-phase failure in a credential-holding path.
    ConnectFailed,

    // -- Partial --
    /// Some scan targets failed while others produced events.
    ScanPartial,

    // -- Startup --
    /// A required configuration variable is absent.
    ConfigMissing,
    /// The batch ledger could not be opened or migrated.
    LedgerUnavailable,

    // -- Envelope --
    /// A CloudEvent envelope has missing or inconsistent fields.
    InvalidEnvelope,
    /// The routing key does not belong to the mesh taxonomy.
    UnknownRoutingKey,

    // -- Internal --
    /// Unexpected internal failure.
    Internal,
}

impl ErrorCode {
    /// The [`ErrorCategory`] this code belongs to.
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::ValidationFailed | Self::MissingField | Self::InvalidJson => {
                ErrorCategory::Validation
            }
            Self::UpstreamUnavailable
            | Self::TransportTimeout
            | Self::BrokerDisconnected
            | Self::CircuitOpen => ErrorCategory::Transport,
            Self::AuthFailed | Self::ConnectFailed => ErrorCategory::Credential,
            Self::ScanPartial => ErrorCategory::Partial,
            Self::ConfigMissing | Self::LedgerUnavailable => ErrorCategory::Startup,
            Self::InvalidEnvelope | Self::UnknownRoutingKey => ErrorCategory::Envelope,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Whether an operation failing with this code may be retried with
    /// backoff. Validation and credential failures never retry.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable | Self::TransportTimeout | Self::BrokerDisconnected
        )
    }

    /// Status code used when this error surfaces on an HTTP endpoint.
    pub fn http_status(self) -> u16 {
        match self.category() {
            ErrorCategory::Validation => 400,
            ErrorCategory::Credential => 403,
            ErrorCategory::Transport => 503,
            _ => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Matches the serde representation.
        let s = match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::MissingField => "MISSING_FIELD",
            Self::InvalidJson => "INVALID_JSON",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::TransportTimeout => "TRANSPORT_TIMEOUT",
            Self::BrokerDisconnected => "BROKER_DISCONNECTED",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::AuthFailed => "AUTH_FAILED",
            Self::ConnectFailed => "CONNECT_FAILED",
            Self::ScanPartial => "SCAN_PARTIAL",
            Self::ConfigMissing => "CONFIG_MISSING",
            Self::LedgerUnavailable => "LEDGER_UNAVAILABLE",
            Self::InvalidEnvelope => "INVALID_ENVELOPE",
            Self::UnknownRoutingKey => "UNKNOWN_ROUTING_KEY",
            Self::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// MeshError
// ---------------------------------------------------------------------------

/// A mesh error: stable code, message, and optional key-value context.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct MeshError {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Human-readable description. For credential-sensitive paths this is
    /// the exception *type name* only, never the upstream message body.
    pub message: String,
    /// Additional structured context (deterministic ordering).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl MeshError {
    /// Create an error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context key-value pair.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    /// Build a credential-safe error from an arbitrary error value,
    /// recording only its type name.
    pub fn credential_safe<E>(code: ErrorCode, _err: &E) -> Self
    where
        E: std::error::Error,
    {
        Self::new(code, short_type_name::<E>())
    }

    /// Whether this error is eligible for retry.
    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }
}

/// Last path segment of a type name (`lapin::Error` -> `Error`).
fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::UpstreamUnavailable).unwrap();
        assert_eq!(json, "\"UPSTREAM_UNAVAILABLE\"");
    }

    #[test]
    fn display_matches_serde() {
        for code in [
            ErrorCode::ValidationFailed,
            ErrorCode::TransportTimeout,
            ErrorCode::AuthFailed,
            ErrorCode::ScanPartial,
            ErrorCode::InvalidEnvelope,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{code}\""));
        }
    }

    #[test]
    fn transient_codes() {
        assert!(ErrorCode::UpstreamUnavailable.is_transient());
        assert!(ErrorCode::TransportTimeout.is_transient());
        assert!(ErrorCode::BrokerDisconnected.is_transient());
        assert!(!ErrorCode::ValidationFailed.is_transient());
        assert!(!ErrorCode::AuthFailed.is_transient());
        assert!(!ErrorCode::CircuitOpen.is_transient());
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ErrorCode::ValidationFailed.http_status(), 400);
        assert_eq!(ErrorCode::AuthFailed.http_status(), 403);
        assert_eq!(ErrorCode::UpstreamUnavailable.http_status(), 503);
        assert_eq!(ErrorCode::Internal.http_status(), 500);
    }

    #[test]
    fn credential_safe_keeps_type_name_only() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "password=hunter2");
        let err = MeshError::credential_safe(ErrorCode::AuthFailed, &io);
        assert_eq!(err.message, "Error");
        assert!(!format!("{err}").contains("hunter2"));
    }

    #[test]
    fn context_is_deterministic() {
        let err = MeshError::validation("bad field")
            .with_context("zeta", "1")
            .with_context("alpha", "2");
        let json = serde_json::to_string(&err).unwrap();
        let alpha = json.find("alpha").unwrap();
        let zeta = json.find("zeta").unwrap();
        assert!(alpha < zeta);
    }
}
