//! Base roles, extra roles, the role-permission matrix and the combination rules.

use crate::permission::dedupe_ids;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Primary, mutually exclusive identity of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseRole {
    Admin,
    Teacher,
    Student,
    Parent,
}

impl BaseRole {
    /// Every base role.
    pub const ALL: [BaseRole; 4] = [
        BaseRole::Admin,
        BaseRole::Teacher,
        BaseRole::Student,
        BaseRole::Parent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BaseRole::Admin => "admin",
            BaseRole::Teacher => "teacher",
            BaseRole::Student => "student",
            BaseRole::Parent => "parent",
        }
    }

    /// Permission ids granted by the static matrix.
    pub fn permissions(self) -> &'static [&'static str] {
        match self {
            BaseRole::Admin => ADMIN_PERMISSIONS,
            BaseRole::Teacher => TEACHER_PERMISSIONS,
            BaseRole::Student => STUDENT_PERMISSIONS,
            BaseRole::Parent => PARENT_PERMISSIONS,
        }
    }
}

impl fmt::Display for BaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(BaseRole::Admin),
            "teacher" => Ok(BaseRole::Teacher),
            "student" => Ok(BaseRole::Student),
            "parent" => Ok(BaseRole::Parent),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Optional secondary capability layered on a base role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraRole {
    /// Administrative staff.
    Staff,
    /// Student council member.
    Osis,
    /// Vice principal.
    Wakasek,
    /// Principal.
    Kepsek,
}

impl ExtraRole {
    /// Every extra role.
    pub const ALL: [ExtraRole; 4] = [
        ExtraRole::Staff,
        ExtraRole::Osis,
        ExtraRole::Wakasek,
        ExtraRole::Kepsek,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExtraRole::Staff => "staff",
            ExtraRole::Osis => "osis",
            ExtraRole::Wakasek => "wakasek",
            ExtraRole::Kepsek => "kepsek",
        }
    }

    /// Permission ids added on top of the base role.
    pub fn permissions(self) -> &'static [&'static str] {
        match self {
            ExtraRole::Staff => STAFF_PERMISSIONS,
            ExtraRole::Osis => OSIS_PERMISSIONS,
            ExtraRole::Wakasek => WAKASEK_PERMISSIONS,
            ExtraRole::Kepsek => KEPSEK_PERMISSIONS,
        }
    }
}

impl fmt::Display for ExtraRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtraRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(ExtraRole::Staff),
            "osis" => Ok(ExtraRole::Osis),
            "wakasek" => Ok(ExtraRole::Wakasek),
            "kepsek" => Ok(ExtraRole::Kepsek),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A role string that is not part of the closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

const ADMIN_PERMISSIONS: &[&str] = &[
    "system.admin",
    "system.settings",
    "system.audit",
    "users.read",
    "users.create",
    "users.update",
    "users.delete",
    "students.read",
    "students.manage",
    "classes.read",
    "classes.manage",
    "grades.read",
    "grades.write",
    "attendance.read",
    "attendance.write",
    "schedule.read",
    "schedule.manage",
    "curriculum.read",
    "curriculum.manage",
    "announcements.read",
    "announcements.create",
    "inventory.read",
    "inventory.manage",
    "finance.read",
    "finance.manage",
    "reports.read",
    "reports.export",
    "osis.read",
    "osis.manage",
];

const TEACHER_PERMISSIONS: &[&str] = &[
    "users.read",
    "students.read",
    "classes.read",
    "grades.read",
    "grades.write",
    "attendance.read",
    "attendance.write",
    "schedule.read",
    "curriculum.read",
    "announcements.read",
    "announcements.create",
    "reports.read",
];

const STUDENT_PERMISSIONS: &[&str] = &[
    "grades.read",
    "attendance.read",
    "schedule.read",
    "curriculum.read",
    "announcements.read",
    "osis.read",
];

const PARENT_PERMISSIONS: &[&str] = &[
    "students.read",
    "grades.read",
    "attendance.read",
    "schedule.read",
    "announcements.read",
    "finance.read",
];

const STAFF_PERMISSIONS: &[&str] = &[
    "users.read",
    "inventory.read",
    "inventory.manage",
    "finance.read",
    "reports.read",
];

const OSIS_PERMISSIONS: &[&str] = &["osis.read", "osis.manage", "announcements.create"];

const WAKASEK_PERMISSIONS: &[&str] = &[
    "students.manage",
    "classes.manage",
    "schedule.manage",
    "curriculum.manage",
    "reports.read",
    "reports.export",
];

const KEPSEK_PERMISSIONS: &[&str] = &[
    "users.read",
    "students.manage",
    "classes.manage",
    "schedule.manage",
    "curriculum.manage",
    "inventory.read",
    "finance.read",
    "finance.manage",
    "reports.read",
    "reports.export",
    "system.audit",
];

/// Decide whether a typed (base role, extra role) pair is legal.
pub fn is_valid_pair(role: BaseRole, extra_role: Option<ExtraRole>) -> bool {
    match (role, extra_role) {
        (_, None) => true,
        (BaseRole::Admin, Some(_)) => false,
        (BaseRole::Parent, Some(_)) => false,
        (BaseRole::Teacher, Some(ExtraRole::Osis)) => false,
        (BaseRole::Student, Some(ExtraRole::Staff)) => false,
        (role, Some(ExtraRole::Wakasek | ExtraRole::Kepsek)) => role == BaseRole::Teacher,
        _ => true,
    }
}

/// Parse untrusted role strings into a legal typed pair.
///
/// An empty or missing extra role means "absent". Returns `None` for unknown
/// roles and for illegal combinations.
pub fn parse_combination(role: &str, extra_role: Option<&str>) -> Option<(BaseRole, Option<ExtraRole>)> {
    let role = role.parse::<BaseRole>().ok()?;
    let extra_role = match extra_role {
        None | Some("") => None,
        Some(extra) => Some(extra.parse::<ExtraRole>().ok()?),
    };
    is_valid_pair(role, extra_role).then_some((role, extra_role))
}

/// Decide whether a (base role, extra role) pair given as strings is legal.
pub fn is_valid_combination(role: &str, extra_role: Option<&str>) -> bool {
    parse_combination(role, extra_role).is_some()
}

/// The de-duplicated union of the matrix and overlay, in first-seen order.
pub fn effective_permissions(role: BaseRole, extra_role: Option<ExtraRole>) -> Vec<String> {
    let overlay = extra_role.map(ExtraRole::permissions).unwrap_or_default();
    dedupe_ids(role.permissions().iter().chain(overlay).copied())
}

/// Render an optional extra role for diagnostics.
pub(crate) fn display_extra(extra_role: Option<&str>) -> &str {
    match extra_role {
        None | Some("") => "none",
        Some(extra) => extra,
    }
}
