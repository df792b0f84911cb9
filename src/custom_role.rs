//! Administrator-defined custom roles, role templates and user assignments.
//!
//! Custom roles bundle permission ids on top of a base role and may inherit
//! from other custom roles. Inheritance is resolved by flattening with a
//! visited set, so a cyclic `inherits_from` graph terminates and every role
//! contributes its permissions at most once.
//!
//! All state is kept in memory behind a single `RwLock` and written through to
//! a [`Storage`] collaborator. A write that fails to persist is not applied.

#[cfg(feature = "audit")]
use log::{info, warn};

use crate::{
    error::{Error, Result},
    permission::{is_forbidden_key, split_permission_id},
    role::BaseRole,
    storage::{MemoryStorage, Storage, load_json_or_default, save_json},
    template::{NewRoleTemplate, RoleTemplate, builtin_templates, is_builtin_template},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Storage key holding the custom roles.
pub const CUSTOM_ROLES_KEY: &str = "custom_roles";
/// Storage key holding administrator-created templates.
pub const ROLE_TEMPLATES_KEY: &str = "role_templates";
/// Storage key holding user to custom role assignments.
pub const ASSIGNMENTS_KEY: &str = "user_role_assignments";

/// A named permission bundle defined by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRole {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_role_id: BaseRole,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub inherits_from: Vec<String>,
    pub is_custom: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

/// Input for creating a custom role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_role_id: BaseRole,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub inherits_from: Vec<String>,
    pub created_by: String,
}

impl NewCustomRole {
    pub fn new(name: impl Into<String>, base_role_id: BaseRole, created_by: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            base_role_id,
            permissions: Vec::new(),
            inherits_from: Vec::new(),
            created_by: created_by.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn inheriting_from<I, P>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.inherits_from = parents.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial update for a custom role. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRolePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_role_id: Option<BaseRole>,
    pub permissions: Option<Vec<String>>,
    pub inherits_from: Option<Vec<String>>,
}

#[derive(Debug, Default)]
struct StoreState {
    roles: Vec<CustomRole>,
    templates: Vec<RoleTemplate>,
    assignments: BTreeMap<String, Vec<String>>,
}

impl StoreState {
    fn role(&self, id: &str) -> Option<&CustomRole> {
        self.roles.iter().find(|role| role.id == id)
    }
}

/// Store for custom roles, templates and assignments.
pub struct CustomRoleStore<S = MemoryStorage>
where
    S: Storage,
{
    storage: S,
    state: RwLock<StoreState>,
}

impl CustomRoleStore<MemoryStorage> {
    /// Create an empty store backed by memory storage.
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }
}

impl<S> CustomRoleStore<S>
where
    S: Storage,
{
    /// Create a store, loading any previously persisted state.
    ///
    /// Absent or malformed blobs load as empty collections.
    pub fn new(storage: S) -> Self {
        let state = StoreState {
            roles: load_json_or_default(&storage, CUSTOM_ROLES_KEY),
            templates: load_json_or_default::<Vec<RoleTemplate>>(&storage, ROLE_TEMPLATES_KEY)
                .into_iter()
                .filter(|t| !t.is_system && !is_builtin_template(&t.id))
                .collect(),
            assignments: load_json_or_default(&storage, ASSIGNMENTS_KEY),
        };

        Self {
            storage,
            state: RwLock::new(state),
        }
    }

    /// Access the storage collaborator.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// All custom roles, in creation order.
    pub fn list(&self) -> Vec<CustomRole> {
        self.read().roles.clone()
    }

    /// Get a custom role by id.
    pub fn get(&self, id: &str) -> Option<CustomRole> {
        self.read().role(id).cloned()
    }

    /// Create a new custom role.
    pub fn create(&self, new_role: NewCustomRole) -> Result<CustomRole> {
        validate_name(&new_role.name)?;
        validate_permission_ids(&new_role.permissions)?;
        validate_parent_ids(&new_role.inherits_from)?;

        let now = Utc::now();
        let role = CustomRole {
            id: format!("custom-{}", Uuid::new_v4()),
            name: new_role.name.trim().to_string(),
            description: new_role.description,
            base_role_id: new_role.base_role_id,
            permissions: new_role.permissions,
            inherits_from: new_role.inherits_from,
            is_custom: true,
            created_at: now,
            updated_at: now,
            created_by: new_role.created_by,
        };

        let mut state = self.write();
        let mut roles = state.roles.clone();
        roles.push(role.clone());
        save_json(&self.storage, CUSTOM_ROLES_KEY, &roles)?;
        state.roles = roles;

        #[cfg(feature = "audit")]
        info!("Custom role '{}' ({}) created by '{}'", role.name, role.id, role.created_by);

        Ok(role)
    }

    /// Apply a patch to an existing custom role.
    pub fn update(&self, id: &str, patch: CustomRolePatch) -> Result<CustomRole> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        if let Some(permissions) = &patch.permissions {
            validate_permission_ids(permissions)?;
        }
        if let Some(parents) = &patch.inherits_from {
            validate_parent_ids(parents)?;
        }

        let mut state = self.write();
        let mut roles = state.roles.clone();
        let role = roles
            .iter_mut()
            .find(|role| role.id == id)
            .ok_or_else(|| Error::CustomRoleNotFound(id.to_string()))?;

        if let Some(name) = patch.name {
            role.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            role.description = description;
        }
        if let Some(base_role_id) = patch.base_role_id {
            role.base_role_id = base_role_id;
        }
        if let Some(permissions) = patch.permissions {
            role.permissions = permissions;
        }
        if let Some(parents) = patch.inherits_from {
            role.inherits_from = parents;
        }
        role.updated_at = Utc::now();
        let updated = role.clone();

        save_json(&self.storage, CUSTOM_ROLES_KEY, &roles)?;
        state.roles = roles;

        #[cfg(feature = "audit")]
        info!("Custom role '{id}' updated");

        Ok(updated)
    }

    /// Delete a custom role. Returns whether a role was removed.
    ///
    /// Assignments referencing the role are cleaned up on a best-effort basis;
    /// any that survive a storage failure are ignored on read.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut state = self.write();
        if state.role(id).is_none() {
            return Ok(false);
        }

        let roles: Vec<CustomRole> = state.roles.iter().filter(|r| r.id != id).cloned().collect();
        save_json(&self.storage, CUSTOM_ROLES_KEY, &roles)?;
        state.roles = roles;

        let mut assignments = state.assignments.clone();
        for role_ids in assignments.values_mut() {
            role_ids.retain(|role_id| role_id != id);
        }
        assignments.retain(|_, role_ids| !role_ids.is_empty());
        if assignments != state.assignments {
            match save_json(&self.storage, ASSIGNMENTS_KEY, &assignments) {
                Ok(()) => state.assignments = assignments,
                Err(_e) => {
                    #[cfg(feature = "audit")]
                    warn!("Custom role '{id}' deleted but its assignments could not be cleaned up: {_e}");
                }
            }
        }

        #[cfg(feature = "audit")]
        info!("Custom role '{id}' deleted");

        Ok(true)
    }

    /// Flattened permission ids granted by a custom role.
    ///
    /// The role's own permissions come first, followed by those of each entry
    /// in `inherits_from`, depth first. If `role_id` does not name a custom
    /// role, the static matrix permissions of `fallback` are returned instead.
    pub fn effective_permissions(&self, role_id: &str, fallback: BaseRole) -> Vec<String> {
        let state = self.read();
        if state.role(role_id).is_none() {
            return fallback.permissions().iter().map(|p| p.to_string()).collect();
        }

        let mut visited = HashSet::new();
        let mut seen = HashSet::new();
        let mut permissions = Vec::new();
        collect_permissions(&state, role_id, &mut visited, &mut seen, &mut permissions);
        permissions
    }

    /// Built-in templates followed by administrator-created ones.
    pub fn list_templates(&self) -> Vec<RoleTemplate> {
        let mut templates = builtin_templates();
        templates.extend(self.read().templates.iter().cloned());
        templates
    }

    /// Get a template (built-in or custom) by id.
    pub fn get_template(&self, id: &str) -> Option<RoleTemplate> {
        self.list_templates().into_iter().find(|t| t.id == id)
    }

    /// Create an administrator template.
    pub fn create_template(&self, data: NewRoleTemplate) -> Result<RoleTemplate> {
        validate_name(&data.name)?;
        validate_permission_ids(&data.permissions)?;

        let template = RoleTemplate {
            id: format!("template-{}", Uuid::new_v4()),
            name: data.name.trim().to_string(),
            description: data.description,
            base_role_id: data.base_role_id,
            permissions: data.permissions,
            is_system: false,
        };

        let mut state = self.write();
        let mut templates = state.templates.clone();
        templates.push(template.clone());
        save_json(&self.storage, ROLE_TEMPLATES_KEY, &templates)?;
        state.templates = templates;

        #[cfg(feature = "audit")]
        info!("Role template '{}' ({}) created", template.name, template.id);

        Ok(template)
    }

    /// Delete an administrator template. System templates cannot be deleted.
    pub fn delete_template(&self, id: &str) -> Result<bool> {
        if is_builtin_template(id) {
            return Err(Error::SystemTemplate(id.to_string()));
        }

        let mut state = self.write();
        if !state.templates.iter().any(|t| t.id == id) {
            return Ok(false);
        }
        let templates: Vec<RoleTemplate> =
            state.templates.iter().filter(|t| t.id != id).cloned().collect();
        save_json(&self.storage, ROLE_TEMPLATES_KEY, &templates)?;
        state.templates = templates;

        #[cfg(feature = "audit")]
        info!("Role template '{id}' deleted");

        Ok(true)
    }

    /// Create a custom role pre-populated from a template.
    pub fn create_from_template(
        &self,
        template_id: &str,
        name: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Result<CustomRole> {
        let template = self
            .get_template(template_id)
            .ok_or_else(|| Error::TemplateNotFound(template_id.to_string()))?;

        let new_role = NewCustomRole::new(name, template.base_role_id, created_by)
            .with_description(template.description)
            .with_permissions(template.permissions);
        self.create(new_role)
    }

    /// Assign a custom role to a user. Assigning twice is a no-op.
    pub fn assign(&self, user_id: &str, role_id: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(Error::validation("user_id", "must be a non-empty string"));
        }

        let mut state = self.write();
        if state.role(role_id).is_none() {
            return Err(Error::CustomRoleNotFound(role_id.to_string()));
        }
        if state
            .assignments
            .get(user_id)
            .is_some_and(|ids| ids.iter().any(|id| id == role_id))
        {
            return Ok(());
        }

        let mut assignments = state.assignments.clone();
        assignments
            .entry(user_id.to_string())
            .or_default()
            .push(role_id.to_string());
        save_json(&self.storage, ASSIGNMENTS_KEY, &assignments)?;
        state.assignments = assignments;

        #[cfg(feature = "audit")]
        info!("Custom role '{role_id}' assigned to user '{user_id}'");

        Ok(())
    }

    /// Remove a custom role from a user. Returns whether an assignment was removed.
    pub fn unassign(&self, user_id: &str, role_id: &str) -> Result<bool> {
        let mut state = self.write();
        let assigned = state
            .assignments
            .get(user_id)
            .is_some_and(|ids| ids.iter().any(|id| id == role_id));
        if !assigned {
            return Ok(false);
        }

        let mut assignments = state.assignments.clone();
        if let Some(ids) = assignments.get_mut(user_id) {
            ids.retain(|id| id != role_id);
            if ids.is_empty() {
                assignments.remove(user_id);
            }
        }
        save_json(&self.storage, ASSIGNMENTS_KEY, &assignments)?;
        state.assignments = assignments;

        #[cfg(feature = "audit")]
        info!("Custom role '{role_id}' removed from user '{user_id}'");

        Ok(true)
    }

    /// Custom roles assigned to a user, in assignment order.
    ///
    /// Assignments that reference deleted roles are skipped.
    pub fn get_user_roles(&self, user_id: &str) -> Vec<CustomRole> {
        let state = self.read();
        state
            .assignments
            .get(user_id)
            .map(|ids| ids.iter().filter_map(|id| state.role(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Users holding a custom role, sorted by user id.
    pub fn users_with_role(&self, role_id: &str) -> Vec<String> {
        self.read()
            .assignments
            .iter()
            .filter(|(_, ids)| ids.iter().any(|id| id == role_id))
            .map(|(user_id, _)| user_id.clone())
            .collect()
    }
}

impl Default for CustomRoleStore<MemoryStorage> {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn collect_permissions(
    state: &StoreState,
    role_id: &str,
    visited: &mut HashSet<String>,
    seen: &mut HashSet<String>,
    permissions: &mut Vec<String>,
) {
    if !visited.insert(role_id.to_string()) {
        return;
    }
    let Some(role) = state.role(role_id) else {
        return;
    };

    for permission in &role.permissions {
        if seen.insert(permission.clone()) {
            permissions.push(permission.clone());
        }
    }
    for parent in &role.inherits_from {
        collect_permissions(state, parent, visited, seen, permissions);
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("name", "must be a non-empty string"));
    }
    Ok(())
}

fn validate_permission_ids(permissions: &[String]) -> Result<()> {
    for id in permissions {
        if is_forbidden_key(id) || split_permission_id(id).is_none() {
            return Err(Error::validation(
                "permissions",
                format!("'{id}' is not a valid resource.action id"),
            ));
        }
    }
    Ok(())
}

fn validate_parent_ids(parents: &[String]) -> Result<()> {
    if parents.iter().any(|id| id.trim().is_empty() || is_forbidden_key(id)) {
        return Err(Error::validation("inherits_from", "contains an invalid role id"));
    }
    Ok(())
}
