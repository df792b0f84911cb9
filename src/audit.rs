//! Bounded, append-only audit trail of authorization decisions.
//!
//! Every entry is also emitted as a JSON log line on the
//! `school_rbac::audit` target when the `audit` feature is enabled, so
//! external log aggregation does not depend on the in-memory buffer.

#[cfg(feature = "audit")]
use log::{info, warn};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

/// Default number of entries retained before the oldest is evicted.
pub const DEFAULT_MAX_AUDIT_ENTRIES: usize = 1000;

/// A single recorded authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub user_id: String,
    pub role: String,
    pub extra_role: Option<String>,
    pub resource: String,
    pub action: String,
    pub granted: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Criteria for selecting audit entries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub granted: Option<bool>,
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub until: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn granted(mut self, granted: bool) -> Self {
        self.granted = Some(granted);
        self
    }

    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    /// Check whether an entry satisfies every set criterion.
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.user_id.as_ref().is_none_or(|u| *u == entry.user_id)
            && self.role.as_ref().is_none_or(|r| *r == entry.role)
            && self.granted.is_none_or(|g| g == entry.granted)
            && self.since.is_none_or(|since| entry.timestamp >= since)
            && self.until.is_none_or(|until| entry.timestamp <= until)
    }
}

/// Ring buffer of audit entries, oldest first.
#[derive(Debug)]
pub struct AuditLog {
    entries: RwLock<VecDeque<AuditLogEntry>>,
    max_entries: usize,
}

impl AuditLog {
    /// Create an empty log retaining at most `max_entries` (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max_entries.min(DEFAULT_MAX_AUDIT_ENTRIES))),
            max_entries,
        }
    }

    /// The configured capacity.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Append an entry, evicting the oldest ones once the capacity is exceeded.
    pub fn record(&self, entry: AuditLogEntry) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Entries matching `filter`, newest first.
    pub fn entries(&self, filter: &AuditFilter) -> Vec<AuditLogEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut selected: Vec<AuditLogEntry> = entries
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        // Insertion order already breaks timestamp ties; a stable sort keeps it.
        selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        selected
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Serialize the retained entries, oldest first.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_vec(&*entries)
    }

    /// Replace the retained entries with previously serialized ones.
    ///
    /// Malformed input is treated as an empty log.
    pub fn restore_from_bytes(&self, bytes: &[u8]) {
        let restored: VecDeque<AuditLogEntry> = match serde_json::from_slice(bytes) {
            Ok(entries) => entries,
            Err(_e) => {
                #[cfg(feature = "audit")]
                warn!("Discarding malformed persisted audit log: {_e}");
                VecDeque::new()
            }
        };

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        *entries = restored;
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AUDIT_ENTRIES)
    }
}

/// Emit the structured log line for a decision.
#[cfg(feature = "audit")]
pub(crate) fn emit(entry: &AuditLogEntry) {
    let payload = serde_json::json!({
        "timestamp": entry.timestamp.to_rfc3339(),
        "userId": entry.user_id,
        "role": entry.role,
        "extraRole": entry.extra_role,
        "resource": entry.resource,
        "action": entry.action,
        "granted": entry.granted,
    });
    if entry.granted {
        info!(target: "school_rbac::audit", "{payload}");
    } else {
        warn!(target: "school_rbac::audit", "{payload}");
    }
}

#[cfg(not(feature = "audit"))]
pub(crate) fn emit(_entry: &AuditLogEntry) {}
