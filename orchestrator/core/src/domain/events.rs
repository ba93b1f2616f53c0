// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Signing Audit Events
//!
//! Correlated start/end/exception events written while a signature is
//! finalized. Intermediate events record each provider request the engine
//! makes (OCSP, TSA, or another service). On success the last OCSP/TSA events
//! are annotated with the issuing CA; on failure the request that failed is
//! located and marked as the exception.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventName {
    FinalizeSignature,
    OcspRequest,
    TsaRequest,
    ProviderRequest,
    SignatureStatusPoll,
    CertificateStatusPoll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Start,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventResult {
    Success,
    Exception,
}

/// Which provider an outbound finalize-time request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderRequestKind {
    Tsa,
    Ocsp,
    Other,
}

impl ProviderRequestKind {
    pub fn event_name(&self) -> EventName {
        match self {
            Self::Tsa => EventName::TsaRequest,
            Self::Ocsp => EventName::OcspRequest,
            Self::Other => EventName::ProviderRequest,
        }
    }
}

impl std::fmt::Display for ProviderRequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tsa => write!(f, "TSA"),
            Self::Ocsp => write!(f, "OCSP"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

pub mod param {
    pub const SIGNATURE_ID: &str = "signature_id";
    pub const ISSUING_CA: &str = "issuing_ca";
    pub const REQUEST_URL: &str = "request_url";
    pub const FAILED_SERVICE: &str = "failed_service";
    pub const CONTAINER_ID: &str = "container_id";
    pub const CERTIFICATE_ID: &str = "certificate_id";
    pub const PROVIDER_STATUS: &str = "provider_status";
}

pub mod error_code {
    pub const SIGNATURE_FINALIZING_ERROR: &str = "SIGNATURE_FINALIZING_ERROR";
    pub const SIGNATURE_FINALIZING_REQUEST_ERROR: &str = "SIGNATURE_FINALIZING_REQUEST_ERROR";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningEvent {
    pub id: EventId,
    pub name: EventName,
    pub event_type: EventType,
    /// Start event this one closes, for end and exception events.
    pub correlation_id: Option<EventId>,
    pub result: Option<EventResult>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub parameters: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl SigningEvent {
    pub fn start(name: EventName) -> Self {
        Self {
            id: EventId::new(),
            name,
            event_type: EventType::Start,
            correlation_id: None,
            result: None,
            error_code: None,
            error_message: None,
            parameters: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn finish(start: &SigningEvent, result: EventResult) -> Self {
        Self {
            id: EventId::new(),
            name: start.name,
            event_type: EventType::Finish,
            correlation_id: Some(start.id),
            result: Some(result),
            error_code: None,
            error_message: None,
            parameters: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn has_parameter_value(&self, value: &str) -> bool {
        self.parameters.values().any(|v| v == value)
    }

    pub fn mark_exception(&mut self, error_code: &str, error_message: &str) {
        self.result = Some(EventResult::Exception);
        self.error_code = Some(error_code.to_string());
        self.error_message = Some(error_message.to_string());
    }
}

/// Destination for flushed audit events. Shared by every operation.
pub trait AuditSink: Send + Sync {
    fn write(&self, events: Vec<SigningEvent>);
}

/// Audit trail of one operation. Events are buffered and handed to an
/// [`AuditSink`] on [`AuditLog::flush`].
pub trait AuditLog: Send + Sync {
    fn log_start_event(&self, name: EventName) -> EventId;

    fn add_parameter(&self, event: EventId, key: &str, value: &str);

    fn log_end_event(&self, start: EventId) -> EventId;

    fn log_exception_event(&self, start: EventId, error_code: &str, error_message: &str) -> EventId;

    /// Mark every event after `start` that has no result yet as an exception.
    fn log_exception_for_intermediate_events(&self, start: EventId, error_code: &str, error_message: &str);

    fn last_matching(&self, predicate: &dyn Fn(&SigningEvent) -> bool) -> Option<EventId>;

    fn first_matching_after(&self, after: EventId, predicate: &dyn Fn(&SigningEvent) -> bool) -> Option<EventId>;

    fn mark_exception(&self, event: EventId, error_code: &str, error_message: &str);

    fn events(&self) -> Vec<SigningEvent>;

    fn flush(&self);
}
