//! Role templates: blueprints for quickly creating custom roles.

use crate::role::BaseRole;
use serde::{Deserialize, Serialize};

/// A blueprint used to pre-populate a new custom role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub base_role_id: BaseRole,
    pub permissions: Vec<String>,
    pub is_system: bool,
}

/// Input for an administrator-created template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoleTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_role_id: BaseRole,
    #[serde(default)]
    pub permissions: Vec<String>,
}

struct TemplateDef {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    base_role: BaseRole,
    permissions: &'static [&'static str],
}

const BUILTIN_TEMPLATES: &[TemplateDef] = &[
    TemplateDef {
        id: "template-homeroom-teacher",
        name: "Homeroom Teacher",
        description: "Teacher responsible for a single class roster",
        base_role: BaseRole::Teacher,
        permissions: &["classes.read", "students.read", "attendance.write", "grades.write"],
    },
    TemplateDef {
        id: "template-counselor",
        name: "Counselor",
        description: "Guidance counselor with read access to student records",
        base_role: BaseRole::Teacher,
        permissions: &["students.read", "grades.read", "attendance.read", "reports.read"],
    },
    TemplateDef {
        id: "template-treasurer",
        name: "Treasurer",
        description: "Handles school fees and budget bookkeeping",
        base_role: BaseRole::Teacher,
        permissions: &["finance.read", "finance.manage", "reports.read"],
    },
    TemplateDef {
        id: "template-librarian",
        name: "Librarian",
        description: "Maintains the library collection and lending records",
        base_role: BaseRole::Teacher,
        permissions: &["inventory.read", "inventory.manage"],
    },
    TemplateDef {
        id: "template-class-leader",
        name: "Class Leader",
        description: "Student representing a class in council activities",
        base_role: BaseRole::Student,
        permissions: &["osis.read", "announcements.create"],
    },
];

/// The built-in system templates, in a fixed order.
pub fn builtin_templates() -> Vec<RoleTemplate> {
    BUILTIN_TEMPLATES
        .iter()
        .map(|def| RoleTemplate {
            id: def.id.to_string(),
            name: def.name.to_string(),
            description: def.description.to_string(),
            base_role_id: def.base_role,
            permissions: def.permissions.iter().map(|p| p.to_string()).collect(),
            is_system: true,
        })
        .collect()
}

/// Returns true if `id` names a built-in template.
pub fn is_builtin_template(id: &str) -> bool {
    BUILTIN_TEMPLATES.iter().any(|def| def.id == id)
}
