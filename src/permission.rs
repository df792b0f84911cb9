//! Permission definitions and the static permission catalog.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Substrings that are never accepted as part of a lookup key.
const FORBIDDEN_KEY_FRAGMENTS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Returns true if `key` contains a fragment associated with property-injection attacks.
pub fn is_forbidden_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    FORBIDDEN_KEY_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}

/// A permission is an atomic capability identified by a `resource.action` id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    id: String,
    name: String,
    description: String,
    resource: String,
    action: String,
}

impl Permission {
    /// Create a permission from its dotted id, deriving resource and action.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        let (resource, action) = split_permission_id(&id)
            .ok_or_else(|| Error::InvalidCatalog(format!("'{id}' is not a resource.action id")))?;

        Ok(Self {
            resource: resource.to_string(),
            action: action.to_string(),
            id,
            name: name.into(),
            description: description.into(),
        })
    }

    /// The globally unique permission id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The resource (category) this permission belongs to.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Split a `resource.action` id into its two halves.
///
/// Both halves must be non-empty and made of `[A-Za-z0-9_]`.
pub fn split_permission_id(id: &str) -> Option<(&str, &str)> {
    let (resource, action) = id.split_once('.')?;
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    (valid(resource) && valid(action)).then_some((resource, action))
}

/// A static permission definition.
#[derive(Debug, Clone, Copy)]
pub struct PermissionDef {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

const fn def(id: &'static str, name: &'static str, description: &'static str) -> PermissionDef {
    PermissionDef {
        id,
        name,
        description,
    }
}

/// Every permission known to the built-in catalog.
pub const BUILTIN_PERMISSIONS: &[PermissionDef] = &[
    def("system.admin", "System Administration", "Full administrative control of the system"),
    def("system.settings", "Manage Settings", "Change school-wide configuration"),
    def("system.audit", "View Audit Trail", "Inspect authorization audit records"),
    def("users.read", "View Users", "List and view user accounts"),
    def("users.create", "Create Users", "Register new user accounts"),
    def("users.update", "Update Users", "Edit existing user accounts"),
    def("users.delete", "Delete Users", "Remove user accounts"),
    def("students.read", "View Students", "View student profiles"),
    def("students.manage", "Manage Students", "Enroll, transfer and edit students"),
    def("classes.read", "View Classes", "View class rosters"),
    def("classes.manage", "Manage Classes", "Create classes and assign homeroom teachers"),
    def("grades.read", "View Grades", "View grade books and report cards"),
    def("grades.write", "Enter Grades", "Record and revise grades"),
    def("attendance.read", "View Attendance", "View attendance records"),
    def("attendance.write", "Record Attendance", "Take and correct attendance"),
    def("schedule.read", "View Schedule", "View lesson timetables"),
    def("schedule.manage", "Manage Schedule", "Build and publish lesson timetables"),
    def("curriculum.read", "View Curriculum", "View syllabi and lesson plans"),
    def("curriculum.manage", "Manage Curriculum", "Approve syllabi and lesson plans"),
    def("announcements.read", "View Announcements", "Read school announcements"),
    def("announcements.create", "Publish Announcements", "Post school announcements"),
    def("inventory.read", "View Inventory", "View school assets and supplies"),
    def("inventory.manage", "Manage Inventory", "Record, lend and retire school assets"),
    def("finance.read", "View Finance", "View fees, payments and budgets"),
    def("finance.manage", "Manage Finance", "Record payments and approve budgets"),
    def("reports.read", "View Reports", "View aggregated school reports"),
    def("reports.export", "Export Reports", "Export reports to external formats"),
    def("osis.read", "View Student Council", "View student council activities"),
    def("osis.manage", "Manage Student Council", "Plan student council events and budgets"),
];

/// Read-only registry of every permission, in definition order.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    permissions: Vec<Permission>,
    index: HashMap<String, usize>,
}

impl PermissionCatalog {
    /// Build the built-in catalog.
    ///
    /// # Panics
    ///
    /// Panics if [`BUILTIN_PERMISSIONS`] is inconsistent. That is a programming
    /// error caught at startup, never a runtime condition.
    pub fn builtin() -> Self {
        match Self::from_definitions(BUILTIN_PERMISSIONS) {
            Ok(catalog) => catalog,
            Err(e) => panic!("built-in permission catalog is corrupt: {e}"),
        }
    }

    /// Build a catalog from static definitions, rejecting duplicates and malformed ids.
    pub fn from_definitions(definitions: &[PermissionDef]) -> Result<Self> {
        let mut permissions = Vec::with_capacity(definitions.len());
        let mut index = HashMap::with_capacity(definitions.len());

        for definition in definitions {
            if is_forbidden_key(definition.id) {
                return Err(Error::InvalidCatalog(format!(
                    "'{}' contains a forbidden key fragment",
                    definition.id
                )));
            }
            let permission = Permission::new(definition.id, definition.name, definition.description)?;
            if index.insert(permission.id.clone(), permissions.len()).is_some() {
                return Err(Error::InvalidCatalog(format!(
                    "duplicate permission id '{}'",
                    definition.id
                )));
            }
            permissions.push(permission);
        }

        Ok(Self { permissions, index })
    }

    /// Look up a permission by id.
    pub fn get_permission(&self, id: &str) -> Option<&Permission> {
        if is_forbidden_key(id) {
            return None;
        }
        self.index.get(id).map(|&i| &self.permissions[i])
    }

    /// Returns true if the catalog knows the id.
    pub fn contains(&self, id: &str) -> bool {
        self.get_permission(id).is_some()
    }

    /// Every permission, in definition order.
    pub fn list_all_permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Distinct resources, sorted.
    pub fn list_categories(&self) -> Vec<String> {
        self.permissions
            .iter()
            .map(|p| p.resource.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Permissions belonging to one resource, in definition order.
    pub fn list_by_category(&self, resource: &str) -> Vec<&Permission> {
        self.permissions
            .iter()
            .filter(|p| p.resource == resource)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

impl Default for PermissionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Order-preserving de-duplication of permission ids.
pub(crate) fn dedupe_ids<'a, I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}
