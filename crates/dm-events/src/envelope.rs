// SPDX-License-Identifier: MIT OR Apache-2.0
//! The CloudEvents 1.0 envelope used on the wire.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The only spec version the mesh emits or accepts.
pub const SPEC_VERSION: &str = "1.0";

/// Envelope construction and validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// `specversion` differs from `1.0`.
    #[error("unsupported specversion: {0}")]
    BadSpecVersion(String),
    /// `source` is not a mesh source path.
    #[error("invalid source path: {0}")]
    BadSource(String),
    /// `type` does not follow the mesh taxonomy.
    #[error("invalid event type: {0}")]
    BadType(String),
    /// A mandatory field is empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// A CloudEvents 1.0 envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    /// Always `"1.0"`.
    pub specversion: String,
    /// Globally unique event id.
    pub id: String,
    /// Producer path, `/collectors/<name>` or `/platform/processor`.
    pub source: String,
    /// Dotted event type, e.g. `discovery.server.discovered`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// RFC-3339 production time.
    pub time: String,
    /// Always `"application/json"`.
    pub datacontenttype: String,
    /// `scan_id` when the event belongs to a scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Id of the event this one was derived from (scored events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlationid: Option<String>,
    /// The discovered payload.
    pub data: Value,
}

impl CloudEvent {
    /// Build a new envelope with a fresh id and the current time.
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: Value) -> Self {
        Self {
            specversion: SPEC_VERSION.to_string(),
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            event_type: event_type.into(),
            time: now_rfc3339(),
            datacontenttype: "application/json".to_string(),
            subject: None,
            correlationid: None,
            data,
        }
    }

    /// Attach the scan this event was produced under.
    pub fn with_subject(mut self, scan_id: impl Into<String>) -> Self {
        self.subject = Some(scan_id.into());
        self
    }

    /// Record the originating event id (scored events).
    pub fn with_correlation(mut self, original_id: impl Into<String>) -> Self {
        self.correlationid = Some(original_id.into());
        self
    }

    /// Check the envelope invariants: spec version, non-empty id/time,
    /// source path shape, and type taxonomy.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.specversion != SPEC_VERSION {
            return Err(EnvelopeError::BadSpecVersion(self.specversion.clone()));
        }
        if self.id.is_empty() {
            return Err(EnvelopeError::MissingField("id"));
        }
        if self.time.is_empty() {
            return Err(EnvelopeError::MissingField("time"));
        }
        if DateTime::parse_from_rfc3339(&self.time).is_err() {
            return Err(EnvelopeError::MissingField("time"));
        }
        if !self.source.starts_with("/collectors/") && self.source != "/platform/processor" {
            return Err(EnvelopeError::BadSource(self.source.clone()));
        }
        let well_formed = self.event_type.starts_with("discovery.")
            && (self.event_type.ends_with(".discovered") || self.event_type.ends_with(".scored"));
        if !well_formed {
            return Err(EnvelopeError::BadType(self.event_type.clone()));
        }
        Ok(())
    }

    /// Serialise for publication.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("CloudEvent is always serialisable")
    }

    /// Parse a received message body.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CloudEvent {
        CloudEvent::new(
            "/collectors/network-scanner",
            "discovery.server.discovered",
            json!({"hostname": "web-01"}),
        )
    }

    #[test]
    fn new_envelope_validates() {
        let ev = sample();
        assert_eq!(ev.specversion, "1.0");
        assert_eq!(ev.datacontenttype, "application/json");
        ev.validate().unwrap();
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(sample().id, sample().id);
    }

    #[test]
    fn subject_round_trips() {
        let ev = sample().with_subject("scan-42");
        let parsed = CloudEvent::from_bytes(&ev.to_bytes()).unwrap();
        assert_eq!(parsed.subject.as_deref(), Some("scan-42"));
        assert_eq!(parsed, ev);
    }

    #[test]
    fn subject_omitted_when_absent() {
        let raw = String::from_utf8(sample().to_bytes()).unwrap();
        assert!(!raw.contains("subject"));
        assert!(!raw.contains("correlationid"));
    }

    #[test]
    fn processor_source_is_valid() {
        let ev = CloudEvent::new(
            "/platform/processor",
            "discovery.server.scored",
            json!({}),
        )
        .with_correlation("original-id");
        ev.validate().unwrap();
    }

    #[test]
    fn bad_source_rejected() {
        let mut ev = sample();
        ev.source = "network-scanner".to_string();
        assert!(matches!(ev.validate(), Err(EnvelopeError::BadSource(_))));
    }

    #[test]
    fn bad_type_rejected() {
        let mut ev = sample();
        ev.event_type = "server.found".to_string();
        assert!(matches!(ev.validate(), Err(EnvelopeError::BadType(_))));
    }

    #[test]
    fn bad_spec_version_rejected() {
        let mut ev = sample();
        ev.specversion = "0.3".to_string();
        assert!(matches!(
            ev.validate(),
            Err(EnvelopeError::BadSpecVersion(_))
        ));
    }

    #[test]
    fn time_is_rfc3339() {
        let ev = sample();
        assert!(DateTime::parse_from_rfc3339(&ev.time).is_ok());
    }
}
