// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request and response models for the dry-run API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated dry-run session identifier.
///
/// Restricted to `^[A-Za-z0-9_-]{1,64}$` at the model boundary so it is
/// always safe to embed in Docker object names and label values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap a raw session id.
    pub fn parse(raw: &str) -> Result<Self, SessionIdError> {
        if raw.is_empty() || raw.len() > 64 {
            return Err(SessionIdError);
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SessionIdError);
        }
        Ok(Self(raw.to_string()))
    }

    /// The validated string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used in container names.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session_id must match ^[A-Za-z0-9_-]{{1,64}}$")]
pub struct SessionIdError;

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: serde::Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(de)?;
        SessionId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Request to start a dry-run session.
#[derive(Debug, Clone, Deserialize)]
pub struct StartSessionRequest {
    /// Session identifier.
    pub session_id: SessionId,
}

/// One started container in the session response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Short container id.
    pub container_id: String,
    /// Container name.
    pub name: String,
    /// Image used.
    pub image: String,
    /// Sample repository mounted into the container.
    pub repo: String,
    /// Reported status.
    pub status: String,
}

/// Response after starting a session.
#[derive(Debug, Clone, Serialize)]
pub struct StartSessionResponse {
    /// Number of containers started.
    pub container_count: usize,
    /// The shared network the containers joined.
    pub network_name: String,
    /// Started containers.
    pub containers: Vec<ContainerSummary>,
}

/// Request to clean up a session.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupRequest {
    /// Session identifier.
    pub session_id: SessionId,
}

/// Response after cleanup.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    /// Containers stopped and removed.
    pub cleaned_containers: usize,
    /// Echoed session id.
    pub session_id: SessionId,
}

/// Status of a labelled container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// Short container id.
    pub container_id: String,
    /// Container name.
    pub name: String,
    /// Docker-reported state.
    pub status: String,
    /// Image name.
    pub image: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_session_ids() {
        for raw in ["abc", "session-1", "A_b-9", &"x".repeat(64)] {
            assert!(SessionId::parse(raw).is_ok(), "{raw} should be valid");
        }
    }

    #[test]
    fn invalid_session_ids() {
        for raw in ["", "has space", "semi;colon", "sl/ash", "dot.dot", &"x".repeat(65)] {
            assert!(SessionId::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn deserialization_enforces_validation() {
        let ok: Result<StartSessionRequest, _> =
            serde_json::from_str(r#"{"session_id": "run-42"}"#);
        assert!(ok.is_ok());
        let bad: Result<StartSessionRequest, _> =
            serde_json::from_str(r#"{"session_id": "run 42; rm -rf /"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn short_prefix() {
        let id = SessionId::parse("abcdefghijkl").unwrap();
        assert_eq!(id.short(), "abcdefgh");
        let id = SessionId::parse("ab").unwrap();
        assert_eq!(id.short(), "ab");
    }
}
