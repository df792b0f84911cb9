//! Core permission engine.
//!
//! This module contains [`PermissionEngine`], the façade every caller goes
//! through to ask "may this role do that". It owns the permission catalog and
//! the audit trail; the role matrix and combination rules live in
//! [`crate::role`].
//!
//! # Evaluation
//!
//! A single check runs through these steps, stopping at the first denial:
//!
//! 1. Input validation (empty or oversized role / permission id)
//! 2. Catalog lookup of the permission id
//! 3. Role combination validation
//! 4. Membership test against the matrix and the extra-role overlay
//!
//! Every check is recorded in the bounded audit log and emitted as a
//! structured log line, whatever the outcome.
//!
//! # Thread Safety
//!
//! The catalog and matrix are immutable. The audit log is guarded by an
//! `RwLock`, so one engine instance can be shared across request handlers
//! behind an `Arc`.

#[cfg(feature = "audit")]
use log::{info, warn};

use crate::{
    audit::{self, AuditFilter, AuditLog, AuditLogEntry, DEFAULT_MAX_AUDIT_ENTRIES},
    context::RequestContext,
    custom_role::CustomRoleStore,
    error::{Error, Result},
    permission::{Permission, PermissionCatalog, is_forbidden_key, split_permission_id},
    role::{self, BaseRole, ExtraRole, display_extra, parse_combination},
    storage::Storage,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Storage key under which the audit log is persisted.
pub const AUDIT_LOG_KEY: &str = "audit_log";

/// Longest role or permission id accepted as input.
pub const MAX_INPUT_LEN: usize = 128;

/// The outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResult {
    pub granted: bool,
    /// Populated only on denial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_permission: Option<String>,
}

impl AccessResult {
    /// A grant, optionally naming the permission that was required.
    pub fn granted(required_permission: Option<String>) -> Self {
        Self {
            granted: true,
            reason: None,
            required_permission,
        }
    }

    /// A denial with a reason.
    pub fn denied(reason: impl Into<String>, required_permission: Option<String>) -> Self {
        Self {
            granted: false,
            reason: Some(reason.into()),
            required_permission,
        }
    }

    /// Returns true if access was granted.
    pub fn is_granted(&self) -> bool {
        self.granted
    }

    /// Returns true if access was denied.
    pub fn is_denied(&self) -> bool {
        !self.granted
    }

    /// Returns the denial reason if access was denied.
    pub fn denial_reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Configuration for the permission engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Number of audit entries retained in memory.
    pub max_audit_entries: usize,
    /// Whether decisions are appended to the in-memory audit log.
    pub enable_audit: bool,
    /// Whether decisions are emitted as structured log lines.
    pub log_decisions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_audit_entries: DEFAULT_MAX_AUDIT_ENTRIES,
            enable_audit: true,
            log_decisions: true,
        }
    }
}

impl EngineConfig {
    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_audit_entries == 0 {
            return Err(Error::InvalidConfiguration(
                "max_audit_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Builder for [`EngineConfig`].
///
/// # Example
/// ```rust
/// use school_rbac::core::EngineConfigBuilder;
///
/// let config = EngineConfigBuilder::new()
///     .max_audit_entries(500)
///     .log_decisions(false)
///     .build();
/// assert_eq!(config.max_audit_entries, 500);
/// ```
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the audit ring buffer capacity.
    pub fn max_audit_entries(mut self, max: usize) -> Self {
        self.config.max_audit_entries = max;
        self
    }

    pub fn enable_audit(mut self, enable: bool) -> Self {
        self.config.enable_audit = enable;
        self
    }

    pub fn log_decisions(mut self, enable: bool) -> Self {
        self.config.log_decisions = enable;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

/// The role-based permission engine.
pub struct PermissionEngine {
    catalog: PermissionCatalog,
    config: EngineConfig,
    audit_log: AuditLog,
    audit_storage: Option<Arc<dyn Storage>>,
}

impl PermissionEngine {
    /// Create an engine with the built-in catalog and default configuration.
    pub fn new() -> Self {
        Self::build(PermissionCatalog::builtin(), EngineConfig::default())
    }

    /// Create an engine with the built-in catalog and a custom configuration.
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        Self::with_catalog(PermissionCatalog::builtin(), config)
    }

    /// Create an engine with a custom catalog.
    pub fn with_catalog(catalog: PermissionCatalog, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(catalog, config))
    }

    fn build(catalog: PermissionCatalog, config: EngineConfig) -> Self {
        Self {
            audit_log: AuditLog::new(config.max_audit_entries),
            catalog,
            config,
            audit_storage: None,
        }
    }

    /// Attach a storage collaborator for the audit log and load any entries
    /// persisted by an earlier process.
    pub fn with_audit_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        match storage.load(AUDIT_LOG_KEY) {
            Ok(Some(bytes)) => self.audit_log.restore_from_bytes(&bytes),
            Ok(None) => {}
            Err(_e) => {
                #[cfg(feature = "audit")]
                warn!("Failed to load persisted audit log, starting empty: {_e}");
            }
        }
        self.audit_storage = Some(storage);
        self
    }

    /// The permission catalog.
    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Look up a permission by id.
    pub fn get_permission(&self, id: &str) -> Option<&Permission> {
        self.catalog.get_permission(id)
    }

    /// Decide whether a (role, extra role) pair is legal.
    pub fn is_valid_combination(&self, role: &str, extra_role: Option<&str>) -> bool {
        role::is_valid_combination(role, extra_role)
    }

    /// Effective permission ids for a role pair; empty for an illegal pair.
    pub fn effective_permission_ids(&self, role: &str, extra_role: Option<&str>) -> Vec<String> {
        parse_combination(role, extra_role)
            .map(|(base, extra)| role::effective_permissions(base, extra))
            .unwrap_or_default()
    }

    /// Check whether a role pair holds a single permission.
    pub fn has_permission(
        &self,
        role: &str,
        extra_role: Option<&str>,
        permission_id: &str,
        context: Option<&RequestContext>,
    ) -> AccessResult {
        self.evaluate(role, extra_role, permission_id, context, true)
    }

    /// Evaluate a check, optionally recording it.
    pub(crate) fn evaluate(
        &self,
        role: &str,
        extra_role: Option<&str>,
        permission_id: &str,
        context: Option<&RequestContext>,
        record: bool,
    ) -> AccessResult {
        let result = self.decide(role, extra_role, permission_id);
        if record {
            self.record(role, extra_role, permission_id, result.granted, context);
        }
        result
    }

    fn decide(&self, role: &str, extra_role: Option<&str>, permission_id: &str) -> AccessResult {
        if role.trim().is_empty() || role.len() > MAX_INPUT_LEN {
            return AccessResult::denied("Invalid role: role must be a non-empty string", None);
        }
        let permission = match self.lookup_permission(permission_id) {
            Ok(permission) => permission,
            Err(denial) => return denial,
        };
        let required = Some(permission.id().to_string());

        let Some((base, extra)) = parse_combination(role, extra_role) else {
            return AccessResult::denied(
                format!("Invalid role combination: {role} + {}", display_extra(extra_role)),
                required,
            );
        };

        if grants(base, extra, permission.id()) {
            AccessResult::granted(required)
        } else {
            AccessResult::denied(
                format!(
                    "Permission '{}' not granted for role '{role}'{}",
                    permission.name(),
                    extra_suffix(extra)
                ),
                required,
            )
        }
    }

    fn lookup_permission(&self, permission_id: &str) -> std::result::Result<&Permission, AccessResult> {
        if permission_id.trim().is_empty() {
            return Err(AccessResult::denied(
                "Invalid permission ID: permission ID must be a non-empty string",
                None,
            ));
        }
        if permission_id.len() > MAX_INPUT_LEN {
            return Err(AccessResult::denied(
                format!("Invalid permission ID: longer than {MAX_INPUT_LEN} characters"),
                None,
            ));
        }
        self.catalog.get_permission(permission_id).ok_or_else(|| {
            AccessResult::denied(
                format!("Permission '{permission_id}' does not exist"),
                Some(permission_id.to_string()),
            )
        })
    }

    /// Check whether a role pair holds any of several permissions.
    ///
    /// Blank, oversized and malformed entries are skipped without an audit
    /// entry. The first grant wins; every attempted check is audited.
    pub fn has_any_permission<P: AsRef<str>>(
        &self,
        role: &str,
        extra_role: Option<&str>,
        permission_ids: &[P],
        context: Option<&RequestContext>,
    ) -> AccessResult {
        if permission_ids.is_empty() {
            return AccessResult::denied(
                "Invalid permission list: at least one permission ID is required",
                None,
            );
        }

        for permission_id in permission_ids {
            let permission_id = permission_id.as_ref();
            if permission_id.len() > MAX_INPUT_LEN || split_permission_id(permission_id).is_none() {
                continue;
            }
            let result = self.has_permission(role, extra_role, permission_id, context);
            if result.granted {
                return result;
            }
        }

        let requested = permission_ids
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", ");
        AccessResult::denied(
            format!(
                "None of the requested permissions are granted for role '{role}' + {}: {requested}",
                display_extra(extra_role)
            ),
            Some(requested),
        )
    }

    /// Check a resource/action pair, sanitizing both halves first.
    pub fn can_access_resource(
        &self,
        role: &str,
        extra_role: Option<&str>,
        resource: &str,
        action: &str,
        context: Option<&RequestContext>,
    ) -> AccessResult {
        if resource.trim().is_empty() || action.trim().is_empty() {
            return AccessResult::denied(
                "Invalid resource or action: both must be non-empty strings",
                None,
            );
        }

        let resource = sanitize_segment(resource);
        let action = sanitize_segment(action);
        if resource.is_empty() || action.is_empty() {
            return AccessResult::denied(
                "Invalid resource or action: no valid characters after sanitization",
                None,
            );
        }
        if resource.len() + action.len() >= MAX_INPUT_LEN {
            return AccessResult::denied(
                format!("Invalid resource or action: longer than {MAX_INPUT_LEN} characters combined"),
                None,
            );
        }
        if is_forbidden_key(&resource) || is_forbidden_key(&action) {
            return AccessResult::denied(
                format!("Permission '{resource}.{action}' does not exist"),
                None,
            );
        }

        let permission_id = format!("{resource}.{action}");
        self.has_permission(role, extra_role, &permission_id, context)
    }

    /// Catalog entries for every permission a role pair holds.
    ///
    /// Empty for unknown roles and illegal combinations.
    pub fn get_user_permissions(&self, role: &str, extra_role: Option<&str>) -> Vec<Permission> {
        self.effective_permission_ids(role, extra_role)
            .iter()
            .filter_map(|id| self.catalog.get_permission(id).cloned())
            .collect()
    }

    /// Check a permission against a custom role's flattened permission set.
    ///
    /// Unknown custom role ids fall back to the matrix of `fallback_role`.
    pub fn check_custom_role<S: Storage>(
        &self,
        store: &CustomRoleStore<S>,
        role_id: &str,
        fallback_role: &str,
        permission_id: &str,
        context: Option<&RequestContext>,
    ) -> AccessResult {
        let known_role = store.get(role_id).is_some();
        let audited_role = if known_role { role_id } else { fallback_role };

        let result = match (self.lookup_permission(permission_id), fallback_role.parse::<BaseRole>()) {
            (Err(denial), _) => denial,
            (Ok(_), Err(_)) => AccessResult::denied(
                format!("Invalid role: '{fallback_role}' is not a base role"),
                Some(permission_id.to_string()),
            ),
            (Ok(permission), Ok(fallback)) => {
                let required = Some(permission.id().to_string());
                if store
                    .effective_permissions(role_id, fallback)
                    .iter()
                    .any(|id| id == permission.id())
                {
                    AccessResult::granted(required)
                } else {
                    AccessResult::denied(
                        format!(
                            "Permission '{}' not granted for custom role '{audited_role}'",
                            permission.name()
                        ),
                        required,
                    )
                }
            }
        };

        self.record(audited_role, None, permission_id, result.granted, context);
        result
    }

    /// Check a user's base role pair, then each custom role assigned to them.
    ///
    /// Custom roles only extend a legal identity: an illegal combination or an
    /// unknown permission is denied without consulting the store.
    pub fn has_user_permission<S: Storage>(
        &self,
        store: &CustomRoleStore<S>,
        user_id: &str,
        role: &str,
        extra_role: Option<&str>,
        permission_id: &str,
        context: Option<&RequestContext>,
    ) -> AccessResult {
        let mut context = context.cloned().unwrap_or_default();
        if context.user_id.is_none() {
            context.user_id = Some(user_id.to_string());
        }

        let base = self.has_permission(role, extra_role, permission_id, Some(&context));
        if base.granted
            || !self.is_valid_combination(role, extra_role)
            || !self.catalog.contains(permission_id)
        {
            return base;
        }

        for custom_role in store.get_user_roles(user_id) {
            let result = self.check_custom_role(
                store,
                &custom_role.id,
                custom_role.base_role_id.as_str(),
                permission_id,
                Some(&context),
            );
            if result.granted {
                return result;
            }
        }

        base
    }

    /// Audit entries matching `filter`, newest first.
    pub fn get_audit_logs(&self, filter: Option<&AuditFilter>) -> Vec<AuditLogEntry> {
        match filter {
            Some(filter) => self.audit_log.entries(filter),
            None => self.audit_log.entries(&AuditFilter::default()),
        }
    }

    /// Number of retained audit entries.
    pub fn audit_log_len(&self) -> usize {
        self.audit_log.len()
    }

    pub fn clear_audit_logs(&self) {
        self.audit_log.clear();

        #[cfg(feature = "audit")]
        info!("Audit log cleared");
    }

    /// Write the retained audit entries to the attached storage.
    ///
    /// Returns false when no storage is attached or the write fails.
    pub fn persist_audit_logs(&self) -> bool {
        let Some(storage) = &self.audit_storage else {
            return false;
        };

        let saved = self
            .audit_log
            .to_bytes()
            .map_err(Error::from)
            .and_then(|bytes| storage.save(AUDIT_LOG_KEY, &bytes));

        match saved {
            Ok(()) => true,
            Err(_e) => {
                #[cfg(feature = "audit")]
                warn!("Failed to persist audit log: {_e}");
                false
            }
        }
    }

    fn record(
        &self,
        role: &str,
        extra_role: Option<&str>,
        permission_id: &str,
        granted: bool,
        context: Option<&RequestContext>,
    ) {
        if !self.config.enable_audit && !self.config.log_decisions {
            return;
        }

        let (resource, action) = match self.catalog.get_permission(permission_id) {
            Some(permission) => (permission.resource(), permission.action()),
            None => {
                let id = clamp_input(permission_id);
                id.split_once('.').unwrap_or((id, ""))
            }
        };

        // Caller-supplied strings are clamped so each entry stays small.
        let entry = AuditLogEntry {
            user_id: clamp_input(
                context
                    .map(RequestContext::user_id_or_unknown)
                    .unwrap_or("unknown"),
            )
            .to_string(),
            role: clamp_input(role).to_string(),
            extra_role: extra_role
                .filter(|e| !e.is_empty())
                .map(|e| clamp_input(e).to_string()),
            resource: resource.to_string(),
            action: action.to_string(),
            granted,
            timestamp: Utc::now(),
            ip: context.and_then(|c| c.ip.as_deref()).map(|ip| clamp_input(ip).to_string()),
            user_agent: context
                .and_then(|c| c.user_agent.as_deref())
                .map(|agent| clamp_input(agent).to_string()),
        };

        if self.config.log_decisions {
            audit::emit(&entry);
        }
        if self.config.enable_audit {
            self.audit_log.record(entry);
        }
    }
}

impl Default for PermissionEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn grants(base: BaseRole, extra: Option<ExtraRole>, permission_id: &str) -> bool {
    base.permissions().contains(&permission_id)
        || extra.is_some_and(|extra| extra.permissions().contains(&permission_id))
}

/// Cut `value` to at most [`MAX_INPUT_LEN`] bytes on a char boundary.
fn clamp_input(value: &str) -> &str {
    if value.len() <= MAX_INPUT_LEN {
        return value;
    }
    let mut end = MAX_INPUT_LEN;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn extra_suffix(extra: Option<ExtraRole>) -> String {
    extra
        .map(|extra| format!(" with extra role '{extra}'"))
        .unwrap_or_default()
}

/// Strip tag-like `<...>` substrings, then truncate at the first character
/// outside `[A-Za-z0-9_]`.
pub fn sanitize_segment(input: &str) -> String {
    let mut stripped = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('<') {
        stripped.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = "";
                break;
            }
        }
    }
    stripped.push_str(rest);

    stripped
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
