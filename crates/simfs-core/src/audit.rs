// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Audit event types and the sink collaborator interface.
//!
//! The facade emits one event per authorized or denied operation. Sinks are
//! fire-and-forget: a sink failure is reported by the caller but never fails
//! the file operation it describes.

use serde::{Deserialize, Serialize};

/// Severity level for audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Informational - routine successful operation
    Info,
    /// Low - denied operation, expected enforcement
    Low,
    /// Medium - repeated or suspicious denials
    Medium,
    /// High - security-relevant rejection (e.g. untrusted elevation)
    High,
    /// Critical - invariant violation or fail-closed fault
    Critical,
}

/// What kind of operation an audit event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    Access,
    Create,
    Delete,
    Rename,
    Execute,
    Elevation,
    SecurityViolation,
    Quota,
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Effective uid of the acting context.
    pub uid: u32,
    pub event_type: AuditEventType,
    pub severity: Severity,
    pub path: String,
    /// Facade operation name, e.g. "remove" or "execute".
    pub operation: String,
    pub success: bool,
    pub message: String,
}

/// Error returned by a sink that could not record an event.
#[derive(thiserror::Error, Debug)]
#[error("audit sink failure: {0}")]
pub struct AuditError(pub String);

/// Audit log collaborator. Implementations must not block; queue and return.
#[cfg_attr(test, mockall::automock)]
pub trait AuditSink: Send + Sync {
    fn log(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Default sink that forwards events to `tracing`.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        if event.severity >= Severity::High {
            tracing::warn!(
                uid = event.uid,
                path = %event.path,
                operation = %event.operation,
                success = event.success,
                "{}",
                event.message
            );
        } else {
            tracing::debug!(
                uid = event.uid,
                path = %event.path,
                operation = %event.operation,
                success = event.success,
                "{}",
                event.message
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn audit_event_round_trips_through_json() {
        let event = AuditEvent {
            uid: 1001,
            event_type: AuditEventType::SecurityViolation,
            severity: Severity::High,
            path: "/opt/tool".to_string(),
            operation: "execute".to_string(),
            success: false,
            message: "untrusted elevation target".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.uid, event.uid);
        assert_eq!(back.event_type, event.event_type);
        assert_eq!(back.severity, event.severity);
        assert_eq!(back.path, event.path);
        assert!(!back.success);
    }

    #[test]
    fn tracing_sink_accepts_events() {
        let sink = TracingAuditSink;
        let event = AuditEvent {
            uid: 0,
            event_type: AuditEventType::Create,
            severity: Severity::Info,
            path: "/".to_string(),
            operation: "mkdir".to_string(),
            success: true,
            message: "created".to_string(),
        };
        assert!(sink.log(event).is_ok());
    }
}
