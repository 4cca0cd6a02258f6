// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Registrations, logins, ledger mutations and privileged changes are
//! appended to daily JSONL files under `audit/`. Writes happen after the
//! database transaction commits and never fail the request.

use std::fs::{self, OpenOptions};
use std::io::Write;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::StoragePaths;

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Account events
    UserRegistered,
    UserUpdated,
    UserDeactivated,

    // Certificate events
    CertificateCreated,
    CertificateUpdated,
    CertificateDeleted,
    WipeCompleted,

    // Marketplace events
    ListingCreated,
    ListingUpdated,
    ListingDeleted,
    MediaChanged,
    CategoryChanged,

    // Subscription events
    PackageChanged,
    SubscriptionPurchased,
    SubscriptionUpdated,
    SubscriptionDeleted,

    // Ledger events
    CreditsRedeemed,
    CreditsAdjusted,
    CreditsRefunded,

    // Auth events
    AuthSuccess,
    AuthFailure,
    PermissionDenied,

    // Admin events
    AdminActionRecorded,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// User who triggered the event (if known).
    pub user_id: Option<String>,
    /// Resource affected (listing id, certificate id, etc.).
    pub resource_id: Option<String>,
    /// Resource type (listing, certificate, etc.).
    pub resource_type: Option<String>,
    /// IP address of the request (if available).
    pub ip_address: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            user_id: None,
            resource_id: None,
            resource_type: None,
            ip_address: None,
            details: None,
            success: true,
            error: None,
        }
    }

    /// Set the user ID.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the resource.
    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Set the IP address, when known.
    pub fn with_ip(mut self, ip: Option<&str>) -> Self {
        self.ip_address = ip.map(str::to_string);
        self
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize audit event: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid audit date: {0}")]
    InvalidDate(String),
}

/// Repository for audit events.
pub struct AuditRepository<'a> {
    paths: &'a StoragePaths,
}

impl<'a> AuditRepository<'a> {
    /// Create a new audit repository.
    pub fn new(paths: &'a StoragePaths) -> Self {
        Self { paths }
    }

    /// Log an audit event.
    ///
    /// Events are appended to a daily log file in JSONL format.
    pub fn log(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        fs::create_dir_all(self.paths.audit_date_dir(&date))?;

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.paths.audit_events_file(&date))?;
        file.write_all(&line)?;
        Ok(())
    }

    /// Log an event, reporting failures to the tracing subscriber only.
    pub fn record(&self, event: &AuditEvent) {
        if let Err(e) = self.log(event) {
            tracing::warn!(
                error = %e,
                event_type = ?event.event_type,
                "Failed to write audit event"
            );
        }
    }

    /// Read audit events for a specific date.
    pub fn read_events(&self, date: &str) -> Result<Vec<AuditEvent>, AuditError> {
        let path = self.paths.audit_events_file(date);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path)?;
        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }

    /// Read events for an inclusive date range (`YYYY-MM-DD`).
    pub fn read_events_range(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<AuditEvent>, AuditError> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| AuditError::InvalidDate(s.to_string()))
        };
        let start = parse(start_date)?;
        let end = parse(end_date)?;

        let mut all_events = Vec::new();
        let mut current = start;
        while current <= end {
            all_events.extend(self.read_events(&current.format("%Y-%m-%d").to_string())?);
            current = current
                .succ_opt()
                .ok_or_else(|| AuditError::InvalidDate(current.to_string()))?;
        }
        Ok(all_events)
    }
}

/// Helper macro for logging audit events against the app state.
#[macro_export]
macro_rules! audit_log {
    ($state:expr, $event_type:expr, $user:expr) => {{
        let event = $crate::storage::AuditEvent::new($event_type).with_user(&$user.user_id);
        $state.audit().record(&event);
    }};
    ($state:expr, $event_type:expr, $user:expr, $resource_type:expr, $resource_id:expr) => {{
        let event = $crate::storage::AuditEvent::new($event_type)
            .with_user(&$user.user_id)
            .with_resource($resource_type, $resource_id);
        $state.audit().record(&event);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_audit_event() {
        let event = AuditEvent::new(AuditEventType::CreditsRedeemed)
            .with_user("user_123")
            .with_resource("listing", "listing_abc")
            .with_ip(Some("192.168.1.1"));

        assert_eq!(event.event_type, AuditEventType::CreditsRedeemed);
        assert_eq!(event.user_id.as_deref(), Some("user_123"));
        assert_eq!(event.resource_type.as_deref(), Some("listing"));
        assert_eq!(event.ip_address.as_deref(), Some("192.168.1.1"));
        assert!(event.success);
    }

    #[test]
    fn failed_event() {
        let event = AuditEvent::new(AuditEventType::PermissionDenied)
            .with_user("user_123")
            .failed("Not authorized");

        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("Not authorized"));
    }

    #[test]
    fn log_and_read_events() {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp.path());
        let repo = AuditRepository::new(&paths);

        repo.log(&AuditEvent::new(AuditEventType::UserRegistered).with_user("u1"))
            .unwrap();
        repo.log(
            &AuditEvent::new(AuditEventType::CreditsAdjusted)
                .with_user("admin")
                .with_resource("user", "u1"),
        )
        .unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = repo.read_events(&today).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::UserRegistered);
        assert_eq!(events[1].event_type, AuditEventType::CreditsAdjusted);

        let ranged = repo.read_events_range(&today, &today).unwrap();
        assert_eq!(ranged.len(), 2);
    }

    #[test]
    fn missing_day_reads_empty() {
        let temp = TempDir::new().unwrap();
        let paths = StoragePaths::new(temp.path());
        let repo = AuditRepository::new(&paths);
        assert!(repo.read_events("2001-01-01").unwrap().is_empty());
        assert!(matches!(
            repo.read_events_range("nope", "2001-01-01"),
            Err(AuditError::InvalidDate(_))
        ));
    }
}
